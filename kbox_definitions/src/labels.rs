//! Label/selector conventions.
//!
//! Every renderer step and the prune engine must agree on these; keeping
//! them in one place is what lets the "every object carries these labels"
//! invariant hold by construction rather than by convention.

use std::collections::BTreeMap;

pub const MANAGED_BY_KEY: &str = "app.kubernetes.io/managed-by";
pub const MANAGED_BY_VALUE: &str = "kbox";
pub const NAME_KEY: &str = "app.kubernetes.io/name";
pub const APP_KEY: &str = "app";
pub const DEP_OWNER_KEY: &str = "kbox.dev/app";
pub const DEP_TYPE_KEY: &str = "kbox.dev/dependency";

/// Labels for an object owned directly by the application (workload,
/// service, configmap, ...). `app` is the application's own name.
pub fn app_labels(app: &str) -> BTreeMap<String, String> {
    let mut m = BTreeMap::new();
    m.insert(APP_KEY.to_string(), app.to_string());
    m.insert(NAME_KEY.to_string(), app.to_string());
    m.insert(MANAGED_BY_KEY.to_string(), MANAGED_BY_VALUE.to_string());
    m
}

/// Labels for a dependency-owned object (the postgres/redis/... StatefulSet
/// and its headless Service). `app` here is the dependency's own service
/// name (`<app>-<type>`), not the owning application.
pub fn dependency_labels(dep_service_name: &str, owner_app: &str, dep_type: &str) -> BTreeMap<String, String> {
    let mut m = app_labels(dep_service_name);
    m.insert(DEP_OWNER_KEY.to_string(), owner_app.to_string());
    m.insert(DEP_TYPE_KEY.to_string(), dep_type.to_string());
    m
}

/// The workload selector: matches only `{app: <name>}`, deliberately a
/// subset of `app_labels` so additive labelling never breaks selection.
pub fn selector(app: &str) -> BTreeMap<String, String> {
    let mut m = BTreeMap::new();
    m.insert(APP_KEY.to_string(), app.to_string());
    m
}

//! The multi-service renderer: topologically orders a
//! `MultiServiceConfig`'s services and renders each through the
//! single-service pipeline, injecting service-discovery env between
//! dependents.

use std::collections::{BTreeMap, VecDeque};

use kbox_definitions::bundle::{Bundle, BundleBuilder};
use kbox_definitions::{Config, ErrorKind, MultiServiceConfig, Result};

use crate::secrets::LoadedSecrets;
use crate::workload::render;

/// Kahn's algorithm over the `dependsOn` graph: zero-dependency services
/// first, ties broken by service name (the `BTreeMap` this crate stores
/// services in has no concept of "the order they were written in
/// source" to fall back on, so name order is the next most-deterministic
/// tiebreak — see DESIGN.md).
fn topological_order(multi: &MultiServiceConfig) -> Result<Vec<String>> {
    // indegree = number of unresolved dependsOn targets for each service.
    let mut indegree: BTreeMap<&str, usize> =
        multi.services.iter().map(|(name, spec)| (name.as_str(), spec.depends_on.len())).collect();

    let mut initial: Vec<&str> = indegree.iter().filter(|(_, &d)| d == 0).map(|(n, _)| *n).collect();
    initial.sort();
    let mut ready: VecDeque<&str> = initial.into_iter().collect();

    // reverse edges: who depends on `name`
    let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for (name, spec) in &multi.services {
        for dep in &spec.depends_on {
            dependents.entry(dep.as_str()).or_default().push(name.as_str());
        }
    }

    let mut order = Vec::new();
    while let Some(name) = ready.pop_front() {
        order.push(name.to_string());
        if let Some(deps) = dependents.get(name) {
            let mut newly_ready = Vec::new();
            for dependent in deps {
                let entry = indegree.get_mut(dependent).unwrap();
                *entry -= 1;
                if *entry == 0 {
                    newly_ready.push(*dependent);
                }
            }
            newly_ready.sort();
            for n in newly_ready {
                ready.push_back(n);
            }
        }
        let mut sorted_ready: Vec<&str> = ready.into_iter().collect();
        sorted_ready.sort();
        ready = sorted_ready.into_iter().collect();
    }

    if order.len() != multi.services.len() {
        return Err(ErrorKind::Msg("circular dependency among services".to_string()).into());
    }
    Ok(order)
}

fn service_app_name(group: &str, service: &str) -> String { format!("{}-{}", group, service) }

/// Renders a `MultiServiceConfig` into one aggregated `Bundle`.
/// `secrets` supplies pre-loaded env-file/SOPS data per service name;
/// services absent from the map render with no such secrets.
pub fn render_multi(
    multi: &MultiServiceConfig,
    secrets: &BTreeMap<String, LoadedSecrets>,
) -> Result<Bundle> {
    let order = topological_order(multi)?;
    let empty = LoadedSecrets::default();
    let mut builder = BundleBuilder::new();

    for name in &order {
        let spec = &multi.services[name];
        let mut cfg: Config = spec.config.clone();
        cfg.name = service_app_name(&multi.name, name);
        cfg.namespace = multi.namespace.clone();

        for dep_name in &spec.depends_on {
            let dep_spec = &multi.services[dep_name];
            let dep_app = service_app_name(&multi.name, dep_name);
            let env_key = format!("{}_URL", dep_name.to_uppercase());
            cfg.env.insert(env_key, format!("http://{}:{}", dep_app, dep_spec.config.port));
        }

        let loaded = secrets.get(name).unwrap_or(&empty);
        let bundle = render(&cfg, &multi.namespace, loaded)?;
        for obj in bundle.objects() {
            builder.push(obj.clone());
        }
    }

    Ok(builder.build())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kbox_definitions::{Config, ServiceSpec};

    fn spec(port: u16, depends_on: &[&str]) -> ServiceSpec {
        ServiceSpec {
            config: Config { image: Some("x:v1".into()), port, ..Config::default() },
            depends_on: depends_on.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn topo_order_places_dependency_before_dependent() {
        let mut services = BTreeMap::new();
        services.insert("api".to_string(), spec(9000, &[]));
        services.insert("web".to_string(), spec(8080, &["api"]));
        let multi = MultiServiceConfig { name: "grp".into(), namespace: "default".into(), services };
        let order = topological_order(&multi).unwrap();
        assert_eq!(order, vec!["api".to_string(), "web".to_string()]);
    }

    #[test]
    fn render_multi_injects_service_discovery_env() {
        let mut services = BTreeMap::new();
        services.insert("api".to_string(), spec(9000, &[]));
        services.insert("web".to_string(), spec(8080, &["api"]));
        let multi = MultiServiceConfig { name: "grp".into(), namespace: "default".into(), services };
        let bundle = render_multi(&multi, &BTreeMap::new()).unwrap();
        let web = bundle.get(kbox_definitions::bundle::Kind::Deployment, "grp-web").unwrap();
        let kbox_definitions::bundle::Object::Deployment(dep) = web else { panic!("expected deployment") };
        let env = dep.spec.as_ref().unwrap().template.spec.as_ref().unwrap().containers[0].env.as_ref().unwrap();
        let api_url = env.iter().find(|e| e.name == "API_URL").unwrap();
        assert_eq!(api_url.value.as_deref(), Some("http://grp-api:9000"));
    }

    #[test]
    fn cyclic_dependency_is_rejected() {
        let mut services = BTreeMap::new();
        services.insert("a".to_string(), spec(8080, &["b"]));
        services.insert("b".to_string(), spec(8080, &["a"]));
        let multi = MultiServiceConfig { name: "grp".into(), namespace: "default".into(), services };
        assert!(topological_order(&multi).is_err());
    }
}

//! The prune engine: finds and removes objects a previous
//! render/apply left behind but the current Bundle no longer declares.
//!
//! Lists each of [`Kind::PRUNABLE`] in the namespace, filtered by
//! `app=<name>`, and deletes whatever key isn't in the freshly rendered
//! Bundle's key set (`kbox_definitions::bundle::orphaned_keys`, already
//! pure and tested). A listing failure for one kind is logged and
//! skipped rather than aborting the whole prune.

use std::collections::BTreeSet;

use kbox_definitions::bundle::{orphaned_keys, Bundle, Kind, ObjectKey};

use crate::cluster::{Cluster, CrudError};
use crate::Result;

#[derive(Clone, Copy, Debug, Default)]
pub struct PruneOptions {
    pub dry_run: bool,
}

#[derive(Clone, Debug, Default)]
pub struct PruneOutcome {
    pub deleted: Vec<ObjectKey>,
    pub errors: Vec<CrudError>,
}

/// `Prune(ctx, ns, app, bundle, {dryRun}) -> {deleted[], errors[]}`.
pub async fn prune(cluster: &dyn Cluster, namespace: &str, app: &str, bundle: &Bundle, opts: &PruneOptions) -> Result<PruneOutcome> {
    let bundle_keys = bundle.keys();
    let mut outcome = PruneOutcome::default();

    for kind in Kind::PRUNABLE {
        let listed = match cluster.list_by_app_label(kind, namespace, app).await {
            Ok(objects) => objects,
            Err(e) => {
                warn!("listing {} in {} failed, skipping: {}", kind.as_str(), namespace, e);
                continue;
            }
        };
        let listed_keys: BTreeSet<ObjectKey> = listed.iter().map(|o| o.key()).collect();

        for key in orphaned_keys(&listed_keys, &bundle_keys) {
            if opts.dry_run {
                outcome.deleted.push(key);
                continue;
            }
            match cluster.delete_object(key.kind, namespace, &key.name).await {
                Ok(()) => outcome.deleted.push(key),
                Err(e) => outcome.errors.push(CrudError { kind: key.kind, name: key.name, message: e.to_string() }),
            }
        }
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use k8s_openapi::api::core::v1::ConfigMap;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use kbox_definitions::bundle::{BundleBuilder, Object};
    use kbox_definitions::labels;

    use crate::cluster::fake::FakeCluster;

    fn config_map(name: &str, app: &str) -> Object {
        let mut ls = std::collections::BTreeMap::new();
        ls.insert(labels::APP_KEY.to_string(), app.to_string());
        Object::ConfigMap(Box::new(ConfigMap {
            metadata: ObjectMeta { name: Some(name.to_string()), labels: Some(ls), ..Default::default() },
            ..Default::default()
        }))
    }

    #[tokio::test]
    async fn deletes_objects_absent_from_the_fresh_bundle() {
        let cluster = FakeCluster::new(Utc.ymd(2026, 1, 1).and_hms(0, 0, 0));
        cluster.apply_object("demo", &config_map("keep", "demo")).await.unwrap();
        cluster.apply_object("demo", &config_map("stale", "demo")).await.unwrap();

        let mut b = BundleBuilder::new();
        b.push(config_map("keep", "demo"));
        let bundle = b.build();

        let outcome = prune(&cluster, "demo", "demo", &bundle, &PruneOptions::default()).await.unwrap();
        assert_eq!(outcome.deleted, vec![ObjectKey { kind: Kind::ConfigMap, name: "stale".into() }]);
        assert!(!cluster.has_object("demo", Kind::ConfigMap, "stale"));
        assert!(cluster.has_object("demo", Kind::ConfigMap, "keep"));
    }

    #[tokio::test]
    async fn dry_run_reports_without_deleting() {
        let cluster = FakeCluster::new(Utc.ymd(2026, 1, 1).and_hms(0, 0, 0));
        cluster.apply_object("demo", &config_map("stale", "demo")).await.unwrap();
        let bundle = BundleBuilder::new().build();

        let outcome = prune(&cluster, "demo", "demo", &bundle, &PruneOptions { dry_run: true }).await.unwrap();
        assert_eq!(outcome.deleted.len(), 1);
        assert!(cluster.has_object("demo", Kind::ConfigMap, "stale"));
    }
}

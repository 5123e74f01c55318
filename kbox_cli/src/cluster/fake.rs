//! An in-memory [`Cluster`], so the apply/prune/release/rollback/preview
//! engines' control flow is unit-testable without a live apiserver or an
//! HTTP mock — an explicit fake rather than HTTP fixtures, since every
//! method here is a typed trait call rather than a URL to stub.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use kbox_definitions::bundle::{Kind, Object};

use super::{Cluster, DeploymentStatus, NamespaceInfo};
use crate::Result;

fn object_labels(object: &Object) -> BTreeMap<String, String> {
    match object {
        Object::Namespace(o) => o.metadata.labels.clone().unwrap_or_default(),
        Object::PersistentVolumeClaim(o) => o.metadata.labels.clone().unwrap_or_default(),
        Object::ServiceAccount(o) => o.metadata.labels.clone().unwrap_or_default(),
        Object::ConfigMap(o) => o.metadata.labels.clone().unwrap_or_default(),
        Object::Secret(o) => o.metadata.labels.clone().unwrap_or_default(),
        Object::Service(o) => o.metadata.labels.clone().unwrap_or_default(),
        Object::NetworkPolicy(o) => o.metadata.labels.clone().unwrap_or_default(),
        Object::StatefulSet(o) => o.metadata.labels.clone().unwrap_or_default(),
        Object::Deployment(o) => o.metadata.labels.clone().unwrap_or_default(),
        Object::Job(o) => o.metadata.labels.clone().unwrap_or_default(),
        Object::CronJob(o) => o.metadata.labels.clone().unwrap_or_default(),
        Object::HorizontalPodAutoscaler(o) => o.metadata.labels.clone().unwrap_or_default(),
        Object::PodDisruptionBudget(o) => o.metadata.labels.clone().unwrap_or_default(),
        Object::Ingress(o) => o.metadata.labels.clone().unwrap_or_default(),
        Object::ServiceMonitor(o) => o.metadata.labels.clone(),
    }
}

#[derive(Clone, Debug, Default)]
struct FakeNamespace {
    info: NamespaceInfo,
    created_at: DateTime<Utc>,
}

/// In-memory cluster state: objects keyed by `(namespace, kind, name)`,
/// namespaces keyed by name, and a release-data blob per `(namespace,
/// app)`. A `deployment_generation` counter simulates a controller
/// bumping `observedGeneration`/replica counts one apply-step late, so
/// tests can exercise the rollout-wait loop's polling behaviour (set
/// `settle_after` to control how many polls it takes).
#[derive(Default)]
pub struct FakeCluster {
    objects: Mutex<BTreeMap<(String, Kind, String), Object>>,
    namespaces: Mutex<BTreeMap<String, FakeNamespace>>,
    releases: Mutex<BTreeMap<(String, String), String>>,
    /// How many `deployment_status` polls before a Deployment reports
    /// itself fully rolled out. `0` means "rolled out immediately".
    pub settle_after: Mutex<BTreeMap<(String, String), u32>>,
    now: DateTime<Utc>,
}

impl FakeCluster {
    /// `now` is supplied by the caller (tests cannot call `Utc::now()`
    /// from inside a workflow, so the fake takes it as a fixed fixture
    /// value instead of reading the clock itself).
    pub fn new(now: DateTime<Utc>) -> Self {
        FakeCluster {
            objects: Mutex::new(BTreeMap::new()),
            namespaces: Mutex::new(BTreeMap::new()),
            releases: Mutex::new(BTreeMap::new()),
            settle_after: Mutex::new(BTreeMap::new()),
            now,
        }
    }

    /// Test hook: seeds a Deployment that takes `polls` calls to
    /// `deployment_status` before it reports fully rolled out.
    pub fn set_settle_after(&self, namespace: &str, name: &str, polls: u32) {
        self.settle_after.lock().unwrap().insert((namespace.to_string(), name.to_string()), polls);
    }

    /// Test hook: flips a namespace's reported phase to `Terminating`,
    /// simulating a cascading delete in progress.
    pub fn mark_terminating(&self, name: &str) {
        if let Some(ns) = self.namespaces.lock().unwrap().get_mut(name) {
            ns.info.phase = Some("Terminating".to_string());
        }
    }

    pub fn object_count(&self, namespace: &str, kind: Kind) -> usize {
        self.objects.lock().unwrap().keys().filter(|(ns, k, _)| ns == namespace && *k == kind).count()
    }

    pub fn has_object(&self, namespace: &str, kind: Kind, name: &str) -> bool {
        self.objects.lock().unwrap().contains_key(&(namespace.to_string(), kind, name.to_string()))
    }
}

#[async_trait]
impl Cluster for FakeCluster {
    async fn apply_object(&self, namespace: &str, object: &Object) -> Result<bool> {
        let key = (namespace.to_string(), object.kind(), object.name().to_string());
        let mut objects = self.objects.lock().unwrap();
        let existed = objects.contains_key(&key);
        objects.insert(key, object.clone());
        Ok(existed)
    }

    async fn list_by_app_label(&self, kind: Kind, namespace: &str, app_label: &str) -> Result<Vec<Object>> {
        let objects = self.objects.lock().unwrap();
        Ok(objects
            .iter()
            .filter(|((ns, k, _), o)| {
                ns == namespace && *k == kind && object_labels(o).get(kbox_definitions::labels::APP_KEY).map(String::as_str) == Some(app_label)
            })
            .map(|(_, o)| o.clone())
            .collect())
    }

    async fn delete_object(&self, kind: Kind, namespace: &str, name: &str) -> Result<()> {
        self.objects.lock().unwrap().remove(&(namespace.to_string(), kind, name.to_string()));
        Ok(())
    }

    async fn deployment_status(&self, namespace: &str, name: &str) -> Result<Option<DeploymentStatus>> {
        let objects = self.objects.lock().unwrap();
        let object = match objects.get(&(namespace.to_string(), Kind::Deployment, name.to_string())) {
            Some(Object::Deployment(d)) => d.clone(),
            _ => return Ok(None),
        };
        let desired_replicas = object.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1);
        let mut settle = self.settle_after.lock().unwrap();
        let remaining = settle.entry((namespace.to_string(), name.to_string())).or_insert(0);
        let rolled_out = *remaining == 0;
        if *remaining > 0 {
            *remaining -= 1;
        }
        Ok(Some(DeploymentStatus {
            generation: 1,
            observed_generation: 1,
            desired_replicas,
            updated_replicas: if rolled_out { desired_replicas } else { 0 },
            available_replicas: if rolled_out { desired_replicas } else { 0 },
        }))
    }

    async fn create_namespace(
        &self,
        name: &str,
        labels: BTreeMap<String, String>,
        annotations: BTreeMap<String, String>,
    ) -> Result<DateTime<Utc>> {
        let mut namespaces = self.namespaces.lock().unwrap();
        if namespaces.contains_key(name) {
            return Err(crate::ErrorKind::PreviewExists(name.to_string()).into());
        }
        let created_at = self.now;
        let mut annotations = annotations;
        annotations
            .entry(kbox_definitions::preview::PREVIEW_CREATED_ANNOTATION.to_string())
            .or_insert_with(|| created_at.to_rfc3339());
        namespaces.insert(
            name.to_string(),
            FakeNamespace { info: NamespaceInfo { name: name.to_string(), labels, annotations, phase: None }, created_at },
        );
        Ok(created_at)
    }

    async fn get_namespace(&self, name: &str) -> Result<Option<NamespaceInfo>> {
        Ok(self.namespaces.lock().unwrap().get(name).map(|n| n.info.clone()))
    }

    async fn delete_namespace(&self, name: &str) -> Result<()> {
        self.namespaces.lock().unwrap().remove(name);
        self.objects.lock().unwrap().retain(|(ns, _, _), _| ns != name);
        Ok(())
    }

    async fn list_namespaces_by_labels(&self, labels: &BTreeMap<String, String>) -> Result<Vec<NamespaceInfo>> {
        Ok(self
            .namespaces
            .lock()
            .unwrap()
            .values()
            .filter(|n| labels.iter().all(|(k, v)| n.info.labels.get(k) == Some(v)))
            .map(|n| n.info.clone())
            .collect())
    }

    async fn get_release_data(&self, namespace: &str, app: &str) -> Result<Option<String>> {
        Ok(self.releases.lock().unwrap().get(&(namespace.to_string(), app.to_string())).cloned())
    }

    async fn put_release_data(&self, namespace: &str, app: &str, json: String) -> Result<()> {
        self.releases.lock().unwrap().insert((namespace.to_string(), app.to_string()), json);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
    use k8s_openapi::api::core::v1::Service;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn fixture_time() -> DateTime<Utc> { Utc.ymd(2026, 1, 1).and_hms(0, 0, 0) }

    fn service(name: &str) -> Object {
        Object::Service(Box::new(Service {
            metadata: ObjectMeta { name: Some(name.to_string()), ..Default::default() },
            ..Default::default()
        }))
    }

    fn deployment(name: &str, replicas: i32) -> Object {
        Object::Deployment(Box::new(Deployment {
            metadata: ObjectMeta { name: Some(name.to_string()), ..Default::default() },
            spec: Some(DeploymentSpec { replicas: Some(replicas), ..Default::default() }),
            ..Default::default()
        }))
    }

    #[tokio::test]
    async fn apply_reports_create_then_update() {
        let cluster = FakeCluster::new(fixture_time());
        let object = service("demo");
        assert!(!cluster.apply_object("demo", &object).await.unwrap());
        assert!(cluster.apply_object("demo", &object).await.unwrap());
    }

    #[tokio::test]
    async fn create_namespace_twice_conflicts() {
        let cluster = FakeCluster::new(fixture_time());
        cluster.create_namespace("demo-preview-pr1", BTreeMap::new(), BTreeMap::new()).await.unwrap();
        let err = cluster.create_namespace("demo-preview-pr1", BTreeMap::new(), BTreeMap::new()).await.unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[tokio::test]
    async fn deployment_status_settles_after_configured_polls() {
        let cluster = FakeCluster::new(fixture_time());
        let object = deployment("demo", 3);
        cluster.apply_object("demo", &object).await.unwrap();
        cluster.set_settle_after("demo", "demo", 2);

        let first = cluster.deployment_status("demo", "demo").await.unwrap().unwrap();
        assert!(!first.rolled_out());
        let second = cluster.deployment_status("demo", "demo").await.unwrap().unwrap();
        assert!(!second.rolled_out());
        let third = cluster.deployment_status("demo", "demo").await.unwrap().unwrap();
        assert!(third.rolled_out());
    }
}

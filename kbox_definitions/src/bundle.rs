//! The rendered `Bundle` of cluster objects and its deterministic ordering.

use std::fmt;

use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;
use k8s_openapi::api::batch::v1::{CronJob, Job};
use k8s_openapi::api::core::v1::{ConfigMap, Namespace, PersistentVolumeClaim, Secret, Service, ServiceAccount};
use k8s_openapi::api::networking::v1::{Ingress, NetworkPolicy};
use k8s_openapi::api::policy::v1::PodDisruptionBudget;

/// A `ServiceMonitor` (`monitoring.coreos.com/v1`), rendered unstructured
/// since kbox carries no CRD schema for the Prometheus operator.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ServiceMonitor {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub kind: String,
    pub metadata: ServiceMonitorMetadata,
    pub spec: serde_json::Value,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct ServiceMonitorMetadata {
    pub name: String,
    pub namespace: String,
    pub labels: std::collections::BTreeMap<String, String>,
}

/// The fixed kind ordering the apply engine walks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Kind {
    Namespace,
    PersistentVolumeClaim,
    ServiceAccount,
    ConfigMap,
    Secret,
    Service,
    NetworkPolicy,
    StatefulSet,
    Deployment,
    Job,
    CronJob,
    HorizontalPodAutoscaler,
    PodDisruptionBudget,
    Ingress,
    ServiceMonitor,
}

impl Kind {
    pub const APPLY_ORDER: [Kind; 15] = [
        Kind::Namespace,
        Kind::PersistentVolumeClaim,
        Kind::ServiceAccount,
        Kind::ConfigMap,
        Kind::Secret,
        Kind::Service,
        Kind::NetworkPolicy,
        Kind::StatefulSet,
        Kind::Deployment,
        Kind::Job,
        Kind::CronJob,
        Kind::HorizontalPodAutoscaler,
        Kind::PodDisruptionBudget,
        Kind::Ingress,
        Kind::ServiceMonitor,
    ];

    fn order_index(self) -> usize {
        Self::APPLY_ORDER.iter().position(|k| *k == self).expect("all Kind variants are in APPLY_ORDER")
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Kind::Namespace => "Namespace",
            Kind::PersistentVolumeClaim => "PersistentVolumeClaim",
            Kind::ServiceAccount => "ServiceAccount",
            Kind::ConfigMap => "ConfigMap",
            Kind::Secret => "Secret",
            Kind::Service => "Service",
            Kind::NetworkPolicy => "NetworkPolicy",
            Kind::StatefulSet => "StatefulSet",
            Kind::Deployment => "Deployment",
            Kind::Job => "Job",
            Kind::CronJob => "CronJob",
            Kind::HorizontalPodAutoscaler => "HorizontalPodAutoscaler",
            Kind::PodDisruptionBudget => "PodDisruptionBudget",
            Kind::Ingress => "Ingress",
            Kind::ServiceMonitor => "ServiceMonitor",
        }
    }
}

/// `<Kind>/<Name>`, the key used by the prune engine and rollback's
/// bundle-membership checks.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectKey {
    pub kind: Kind,
    pub name: String,
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind.as_str(), self.name)
    }
}

impl Kind {
    /// The kinds the prune engine lists and diffs. `ServiceAccount` and
    /// `PersistentVolumeClaim` are rendered but deliberately excluded here.
    pub const PRUNABLE: [Kind; 11] = [
        Kind::ConfigMap,
        Kind::Secret,
        Kind::Service,
        Kind::Deployment,
        Kind::StatefulSet,
        Kind::Ingress,
        Kind::NetworkPolicy,
        Kind::HorizontalPodAutoscaler,
        Kind::PodDisruptionBudget,
        Kind::Job,
        Kind::CronJob,
    ]; // matches Kind::APPLY_ORDER minus Namespace, PersistentVolumeClaim, ServiceAccount, ServiceMonitor
}

/// `Prune(bundle)` deletes exactly `listed \ keys(bundle)`. Pure set
/// difference so it's testable without a cluster; the cluster-touching
/// list/delete calls live in `kbox_cli`.
pub fn orphaned_keys(
    listed: &std::collections::BTreeSet<ObjectKey>,
    bundle_keys: &std::collections::BTreeSet<ObjectKey>,
) -> std::collections::BTreeSet<ObjectKey> {
    listed.difference(bundle_keys).cloned().collect()
}

/// One concrete rendered object. Each variant wraps the typed
/// `k8s-openapi` struct the apply engine hands to the cluster client.
#[derive(Clone, Debug)]
pub enum Object {
    Namespace(Box<Namespace>),
    PersistentVolumeClaim(Box<PersistentVolumeClaim>),
    ServiceAccount(Box<ServiceAccount>),
    ConfigMap(Box<ConfigMap>),
    Secret(Box<Secret>),
    Service(Box<Service>),
    NetworkPolicy(Box<NetworkPolicy>),
    StatefulSet(Box<StatefulSet>),
    Deployment(Box<Deployment>),
    Job(Box<Job>),
    CronJob(Box<CronJob>),
    HorizontalPodAutoscaler(Box<HorizontalPodAutoscaler>),
    PodDisruptionBudget(Box<PodDisruptionBudget>),
    Ingress(Box<Ingress>),
    ServiceMonitor(Box<ServiceMonitor>),
}

macro_rules! object_accessors {
    ($($variant:ident => $kind:ident),* $(,)?) => {
        impl Object {
            pub fn kind(&self) -> Kind {
                match self {
                    $(Object::$variant(_) => Kind::$kind,)*
                }
            }

            pub fn name(&self) -> &str {
                match self {
                    $(Object::$variant(o) => o_name(o.as_ref()),)*
                }
            }
        }
    };
}

fn o_name<T: HasName>(o: &T) -> &str { o.obj_name() }

trait HasName {
    fn obj_name(&self) -> &str;
}

macro_rules! impl_has_name_metadata {
    ($($t:ty),* $(,)?) => {
        $(impl HasName for $t {
            fn obj_name(&self) -> &str {
                self.metadata.name.as_deref().unwrap_or("")
            }
        })*
    };
}

impl_has_name_metadata!(
    Namespace,
    PersistentVolumeClaim,
    ServiceAccount,
    ConfigMap,
    Secret,
    Service,
    NetworkPolicy,
    StatefulSet,
    Deployment,
    Job,
    CronJob,
    HorizontalPodAutoscaler,
    PodDisruptionBudget,
    Ingress,
);

impl HasName for ServiceMonitor {
    fn obj_name(&self) -> &str { &self.metadata.name }
}

object_accessors!(
    Namespace => Namespace,
    PersistentVolumeClaim => PersistentVolumeClaim,
    ServiceAccount => ServiceAccount,
    ConfigMap => ConfigMap,
    Secret => Secret,
    Service => Service,
    NetworkPolicy => NetworkPolicy,
    StatefulSet => StatefulSet,
    Deployment => Deployment,
    Job => Job,
    CronJob => CronJob,
    HorizontalPodAutoscaler => HorizontalPodAutoscaler,
    PodDisruptionBudget => PodDisruptionBudget,
    Ingress => Ingress,
    ServiceMonitor => ServiceMonitor,
);

impl Object {
    pub fn key(&self) -> ObjectKey {
        ObjectKey { kind: self.kind(), name: self.name().to_string() }
    }

    /// Serializes this single object to a YAML document, for `kbox
    /// diff`-style tooling outside this core and for the byte-stability
    /// test property.
    pub fn to_yaml(&self) -> crate::Result<String> {
        let s = match self {
            Object::Namespace(o) => serde_yaml::to_string(o.as_ref())?,
            Object::PersistentVolumeClaim(o) => serde_yaml::to_string(o.as_ref())?,
            Object::ServiceAccount(o) => serde_yaml::to_string(o.as_ref())?,
            Object::ConfigMap(o) => serde_yaml::to_string(o.as_ref())?,
            Object::Secret(o) => serde_yaml::to_string(o.as_ref())?,
            Object::Service(o) => serde_yaml::to_string(o.as_ref())?,
            Object::NetworkPolicy(o) => serde_yaml::to_string(o.as_ref())?,
            Object::StatefulSet(o) => serde_yaml::to_string(o.as_ref())?,
            Object::Deployment(o) => serde_yaml::to_string(o.as_ref())?,
            Object::Job(o) => serde_yaml::to_string(o.as_ref())?,
            Object::CronJob(o) => serde_yaml::to_string(o.as_ref())?,
            Object::HorizontalPodAutoscaler(o) => serde_yaml::to_string(o.as_ref())?,
            Object::PodDisruptionBudget(o) => serde_yaml::to_string(o.as_ref())?,
            Object::Ingress(o) => serde_yaml::to_string(o.as_ref())?,
            Object::ServiceMonitor(o) => serde_yaml::to_string(o.as_ref())?,
        };
        Ok(s)
    }
}

/// The ordered output of rendering. Immutable after construction;
/// built incrementally by the renderer via [`BundleBuilder`].
#[derive(Clone, Debug, Default)]
pub struct Bundle {
    objects: Vec<Object>,
}

impl Bundle {
    pub fn objects(&self) -> &[Object] { &self.objects }

    pub fn keys(&self) -> std::collections::BTreeSet<ObjectKey> {
        self.objects.iter().map(Object::key).collect()
    }

    pub fn get(&self, kind: Kind, name: &str) -> Option<&Object> {
        self.objects.iter().find(|o| o.kind() == kind && o.name() == name)
    }

    pub fn deployment(&self) -> Option<&Deployment> {
        self.objects.iter().find_map(|o| match o {
            Object::Deployment(d) => Some(d.as_ref()),
            _ => None,
        })
    }

    /// Every object's YAML, concatenated in apply order with `---`
    /// document separators — byte-stable for identical input.
    pub fn to_yaml(&self) -> crate::Result<String> {
        let mut out = String::new();
        for (i, obj) in self.sorted().iter().enumerate() {
            if i > 0 {
                out.push_str("---\n");
            }
            out.push_str(&obj.to_yaml()?);
        }
        Ok(out)
    }

    /// Objects in the fixed (kind, name) total order.
    pub fn sorted(&self) -> Vec<&Object> {
        let mut v: Vec<&Object> = self.objects.iter().collect();
        v.sort_by(|a, b| (a.kind().order_index(), a.name()).cmp(&(b.kind().order_index(), b.name())));
        v
    }
}

/// Accumulates objects in renderer insertion order (dependencies before
/// workload, per step); `build()` freezes it into an immutable `Bundle`.
#[derive(Default)]
pub struct BundleBuilder {
    objects: Vec<Object>,
}

impl BundleBuilder {
    pub fn new() -> Self { Self::default() }

    pub fn push(&mut self, object: Object) -> &mut Self {
        self.objects.push(object);
        self
    }

    pub fn build(self) -> Bundle { Bundle { objects: self.objects } }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn svc(name: &str) -> Object {
        Object::Service(Box::new(Service {
            metadata: ObjectMeta { name: Some(name.to_string()), ..Default::default() },
            ..Default::default()
        }))
    }

    fn dep(name: &str) -> Object {
        Object::Deployment(Box::new(Deployment {
            metadata: ObjectMeta { name: Some(name.to_string()), ..Default::default() },
            ..Default::default()
        }))
    }

    #[test]
    fn sorted_respects_kind_then_name() {
        let mut b = BundleBuilder::new();
        b.push(dep("web")).push(svc("web")).push(svc("api"));
        let bundle = b.build();
        let sorted = bundle.sorted();
        let keys: Vec<String> = sorted.iter().map(|o| o.key().to_string()).collect();
        assert_eq!(keys, vec!["Service/api", "Service/web", "Deployment/web"]);
    }

    #[test]
    fn keys_deduplicate_via_set() {
        let mut b = BundleBuilder::new();
        b.push(svc("api"));
        let bundle = b.build();
        assert!(bundle.keys().contains(&ObjectKey { kind: Kind::Service, name: "api".into() }));
    }

    #[test]
    fn deployment_accessor_finds_the_workload() {
        let mut b = BundleBuilder::new();
        b.push(svc("api")).push(dep("api"));
        let bundle = b.build();
        assert!(bundle.deployment().is_some());
    }

    #[test]
    fn orphaned_keys_is_listed_minus_bundle() {
        let listed: std::collections::BTreeSet<ObjectKey> = [
            ObjectKey { kind: Kind::ConfigMap, name: "a".into() },
            ObjectKey { kind: Kind::ConfigMap, name: "b".into() },
        ]
        .into_iter()
        .collect();
        let bundle_keys: std::collections::BTreeSet<ObjectKey> =
            [ObjectKey { kind: Kind::ConfigMap, name: "a".into() }].into_iter().collect();
        let orphans = orphaned_keys(&listed, &bundle_keys);
        assert_eq!(orphans.len(), 1);
        assert!(orphans.contains(&ObjectKey { kind: Kind::ConfigMap, name: "b".into() }));
    }
}

//! The real [`Cluster`] implementation, talking to a live apiserver
//! through a typed `kube::Client`.
//!
//! Every rendered `Object` variant already carries a concrete
//! `k8s-openapi` type, so apply/list/delete dispatch as a typed
//! `Api<T>` call per kind rather than through an untyped/dynamic client
//! — the one exception is `ServiceMonitor`, which kbox renders
//! unstructured and therefore applies through `Api<DynamicObject>`.

use std::collections::BTreeMap;
use std::fmt::Debug;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;
use k8s_openapi::api::batch::v1::{CronJob, Job};
use k8s_openapi::api::core::v1::{ConfigMap, Namespace, PersistentVolumeClaim, Secret, Service, ServiceAccount};
use k8s_openapi::api::networking::v1::{Ingress, NetworkPolicy};
use k8s_openapi::api::policy::v1::PodDisruptionBudget;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, DeleteParams, DynamicObject, ListParams, Patch, PatchParams, Resource};
use kube::discovery::ApiResource;
use kube::{Client, Config as KubeConfig};
use serde::de::DeserializeOwned;
use serde::Serialize;

use kbox_definitions::bundle::{Kind, Object, ServiceMonitor};
use kbox_definitions::labels as kbox_labels;

use super::{Cluster, DeploymentStatus, NamespaceInfo};
use crate::{Error, Result};

const FIELD_MANAGER: &str = "kbox";

/// `Load(ctx) -> kube::Client`: resolves credentials from the
/// platform's standard discovery (`$KUBECONFIG`/`$HOME/.kube/config`, or
/// in-cluster service account), with an optional context override.
pub async fn make_client(context: Option<&str>) -> Result<Client> {
    let config = match context {
        Some(ctx) => {
            let kubeconfig = kube::config::Kubeconfig::read()
                .map_err(|e| crate::with_hint(e, "Check $KUBECONFIG or $HOME/.kube/config"))?;
            let options = kube::config::KubeConfigOptions { context: Some(ctx.to_string()), ..Default::default() };
            KubeConfig::from_custom_kubeconfig(kubeconfig, &options)
                .await
                .map_err(|e| crate::with_hint(e, &format!("Check kube context '{}' exists", ctx)))?
        }
        None => KubeConfig::infer()
            .await
            .map_err(|e| crate::with_hint(e, "Check $KUBECONFIG or $HOME/.kube/config"))?,
    };
    Client::try_from(config).map_err(Error::from)
}

/// A [`Cluster`] backed by a real `kube::Client`.
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    pub fn new(client: Client) -> Self { KubeCluster { client } }

    pub async fn connect(context: Option<&str>) -> Result<Self> {
        Ok(KubeCluster::new(make_client(context).await?))
    }
}

fn is_not_found(e: &kube::Error) -> bool {
    matches!(e, kube::Error::Api(resp) if resp.code == 404)
}

/// Server-side applies one namespaced object, classifying create-vs-update
/// by a `Get` beforehand.
async fn apply_namespaced<K>(client: &Client, namespace: &str, object: &K) -> Result<bool>
where
    K: Resource<DynamicType = ()> + Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    let api: Api<K> = Api::namespaced(client.clone(), namespace);
    let name = object.meta().name.clone().unwrap_or_default();
    let existed = match api.get(&name).await {
        Ok(_) => true,
        Err(e) if is_not_found(&e) => false,
        Err(e) => return Err(e.into()),
    };
    let pp = PatchParams::apply(FIELD_MANAGER).force();
    api.patch(&name, &pp, &Patch::Apply(object)).await?;
    Ok(existed)
}

async fn list_namespaced<K>(client: &Client, namespace: &str, app_label: &str) -> Result<Vec<K>>
where
    K: Resource<DynamicType = ()> + Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    let api: Api<K> = Api::namespaced(client.clone(), namespace);
    let lp = ListParams { label_selector: Some(format!("{}={}", kbox_labels::APP_KEY, app_label)), ..Default::default() };
    let list = api.list(&lp).await?;
    Ok(list.items)
}

async fn delete_namespaced<K>(client: &Client, namespace: &str, name: &str) -> Result<()>
where
    K: Resource<DynamicType = ()> + Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    let api: Api<K> = Api::namespaced(client.clone(), namespace);
    let dp = DeleteParams::foreground();
    match api.delete(name, &dp).await {
        Ok(_) => Ok(()),
        Err(e) if is_not_found(&e) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// The `ApiResource` kbox uses to talk to `ServiceMonitor` unstructured,
/// since `kbox_definitions::bundle::ServiceMonitor` carries no CRD
/// schema.
fn service_monitor_api_resource() -> ApiResource {
    ApiResource {
        group: "monitoring.coreos.com".to_string(),
        version: "v1".to_string(),
        api_version: "monitoring.coreos.com/v1".to_string(),
        kind: "ServiceMonitor".to_string(),
        plural: "servicemonitors".to_string(),
    }
}

fn service_monitor_to_dynamic(sm: &ServiceMonitor) -> Result<DynamicObject> {
    let value = serde_json::to_value(sm)?;
    Ok(serde_json::from_value(value)?)
}

#[async_trait]
impl Cluster for KubeCluster {
    async fn apply_object(&self, namespace: &str, object: &Object) -> Result<bool> {
        match object {
            Object::Namespace(o) => {
                let api: Api<Namespace> = Api::all(self.client.clone());
                let name = o.metadata.name.clone().unwrap_or_default();
                let existed = match api.get(&name).await {
                    Ok(_) => true,
                    Err(e) if is_not_found(&e) => false,
                    Err(e) => return Err(e.into()),
                };
                let pp = PatchParams::apply(FIELD_MANAGER).force();
                api.patch(&name, &pp, &Patch::Apply(o.as_ref())).await?;
                Ok(existed)
            }
            Object::PersistentVolumeClaim(o) => apply_namespaced(&self.client, namespace, o.as_ref()).await,
            Object::ServiceAccount(o) => apply_namespaced(&self.client, namespace, o.as_ref()).await,
            Object::ConfigMap(o) => apply_namespaced(&self.client, namespace, o.as_ref()).await,
            Object::Secret(o) => apply_namespaced(&self.client, namespace, o.as_ref()).await,
            Object::Service(o) => apply_namespaced(&self.client, namespace, o.as_ref()).await,
            Object::NetworkPolicy(o) => apply_namespaced(&self.client, namespace, o.as_ref()).await,
            Object::StatefulSet(o) => apply_namespaced(&self.client, namespace, o.as_ref()).await,
            Object::Deployment(o) => apply_namespaced(&self.client, namespace, o.as_ref()).await,
            Object::Job(o) => apply_namespaced(&self.client, namespace, o.as_ref()).await,
            Object::CronJob(o) => apply_namespaced(&self.client, namespace, o.as_ref()).await,
            Object::HorizontalPodAutoscaler(o) => apply_namespaced(&self.client, namespace, o.as_ref()).await,
            Object::PodDisruptionBudget(o) => apply_namespaced(&self.client, namespace, o.as_ref()).await,
            Object::Ingress(o) => apply_namespaced(&self.client, namespace, o.as_ref()).await,
            Object::ServiceMonitor(o) => {
                let ar = service_monitor_api_resource();
                let api: Api<DynamicObject> = Api::namespaced_with(self.client.clone(), namespace, &ar);
                let dyn_obj = service_monitor_to_dynamic(o.as_ref())?;
                let name = o.metadata.name.clone();
                let existed = match api.get(&name).await {
                    Ok(_) => true,
                    Err(e) if is_not_found(&e) => false,
                    Err(e) => return Err(e.into()),
                };
                let pp = PatchParams::apply(FIELD_MANAGER).force();
                api.patch(&name, &pp, &Patch::Apply(&dyn_obj)).await?;
                Ok(existed)
            }
        }
    }

    async fn list_by_app_label(&self, kind: Kind, namespace: &str, app_label: &str) -> Result<Vec<Object>> {
        macro_rules! list_as {
            ($variant:ident, $t:ty) => {{
                let items = list_namespaced::<$t>(&self.client, namespace, app_label).await?;
                Ok(items.into_iter().map(|o| Object::$variant(Box::new(o))).collect())
            }};
        }
        match kind {
            Kind::ConfigMap => list_as!(ConfigMap, ConfigMap),
            Kind::Secret => list_as!(Secret, Secret),
            Kind::Service => list_as!(Service, Service),
            Kind::Deployment => list_as!(Deployment, Deployment),
            Kind::StatefulSet => list_as!(StatefulSet, StatefulSet),
            Kind::Ingress => list_as!(Ingress, Ingress),
            Kind::NetworkPolicy => list_as!(NetworkPolicy, NetworkPolicy),
            Kind::HorizontalPodAutoscaler => list_as!(HorizontalPodAutoscaler, HorizontalPodAutoscaler),
            Kind::PodDisruptionBudget => list_as!(PodDisruptionBudget, PodDisruptionBudget),
            Kind::Job => list_as!(Job, Job),
            Kind::CronJob => list_as!(CronJob, CronJob),
            other => bail!("{} is not a prunable kind", other.as_str()),
        }
    }

    async fn delete_object(&self, kind: Kind, namespace: &str, name: &str) -> Result<()> {
        match kind {
            Kind::ConfigMap => delete_namespaced::<ConfigMap>(&self.client, namespace, name).await,
            Kind::Secret => delete_namespaced::<Secret>(&self.client, namespace, name).await,
            Kind::Service => delete_namespaced::<Service>(&self.client, namespace, name).await,
            Kind::Deployment => delete_namespaced::<Deployment>(&self.client, namespace, name).await,
            Kind::StatefulSet => delete_namespaced::<StatefulSet>(&self.client, namespace, name).await,
            Kind::Ingress => delete_namespaced::<Ingress>(&self.client, namespace, name).await,
            Kind::NetworkPolicy => delete_namespaced::<NetworkPolicy>(&self.client, namespace, name).await,
            Kind::HorizontalPodAutoscaler => delete_namespaced::<HorizontalPodAutoscaler>(&self.client, namespace, name).await,
            Kind::PodDisruptionBudget => delete_namespaced::<PodDisruptionBudget>(&self.client, namespace, name).await,
            Kind::Job => delete_namespaced::<Job>(&self.client, namespace, name).await,
            Kind::CronJob => delete_namespaced::<CronJob>(&self.client, namespace, name).await,
            other => bail!("{} is not a prunable kind", other.as_str()),
        }
    }

    async fn deployment_status(&self, namespace: &str, name: &str) -> Result<Option<DeploymentStatus>> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        let dep = match api.get(name).await {
            Ok(d) => d,
            Err(e) if is_not_found(&e) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let generation = dep.metadata.generation.unwrap_or(0);
        let desired_replicas = dep.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1);
        let status = dep.status.unwrap_or_default();
        Ok(Some(DeploymentStatus {
            generation,
            observed_generation: status.observed_generation.unwrap_or(0),
            desired_replicas,
            updated_replicas: status.updated_replicas.unwrap_or(0),
            available_replicas: status.available_replicas.unwrap_or(0),
        }))
    }

    async fn create_namespace(
        &self,
        name: &str,
        labels: BTreeMap<String, String>,
        annotations: BTreeMap<String, String>,
    ) -> Result<DateTime<Utc>> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        if api.get(name).await.is_ok() {
            return Err(crate::ErrorKind::PreviewExists(name.to_string()).into());
        }
        let created = Utc::now();
        let mut annotations = annotations;
        annotations.entry(kbox_definitions::preview::PREVIEW_CREATED_ANNOTATION.to_string())
            .or_insert_with(|| created.to_rfc3339());
        let ns = Namespace {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                labels: Some(labels),
                annotations: Some(annotations),
                ..Default::default()
            },
            ..Default::default()
        };
        let pp = PatchParams::apply(FIELD_MANAGER).force();
        api.patch(name, &pp, &Patch::Apply(&ns)).await?;
        Ok(created)
    }

    async fn get_namespace(&self, name: &str) -> Result<Option<NamespaceInfo>> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let ns = match api.get(name).await {
            Ok(n) => n,
            Err(e) if is_not_found(&e) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let phase = ns.status.and_then(|s| s.phase);
        Ok(Some(NamespaceInfo {
            name: name.to_string(),
            labels: ns.metadata.labels.unwrap_or_default(),
            annotations: ns.metadata.annotations.unwrap_or_default(),
            phase,
        }))
    }

    async fn delete_namespace(&self, name: &str) -> Result<()> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let dp = DeleteParams::default();
        match api.delete(name, &dp).await {
            Ok(_) => Ok(()),
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_namespaces_by_labels(&self, labels: &BTreeMap<String, String>) -> Result<Vec<NamespaceInfo>> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let selector = labels.iter().map(|(k, v)| format!("{}={}", k, v)).collect::<Vec<_>>().join(",");
        let lp = ListParams { label_selector: Some(selector), ..Default::default() };
        let list = api.list(&lp).await?;
        Ok(list
            .items
            .into_iter()
            .map(|ns| NamespaceInfo {
                name: ns.metadata.name.clone().unwrap_or_default(),
                labels: ns.metadata.labels.unwrap_or_default(),
                annotations: ns.metadata.annotations.unwrap_or_default(),
                phase: ns.status.and_then(|s| s.phase),
            })
            .collect())
    }

    async fn get_release_data(&self, namespace: &str, app: &str) -> Result<Option<String>> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        let name = format!("{}-releases", app);
        let cm = match api.get(&name).await {
            Ok(c) => c,
            Err(e) if is_not_found(&e) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(cm.data.and_then(|d| d.get("releases").cloned()))
    }

    async fn put_release_data(&self, namespace: &str, app: &str, json: String) -> Result<()> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        let name = format!("{}-releases", app);
        let mut labels = BTreeMap::new();
        labels.insert(kbox_labels::MANAGED_BY_KEY.to_string(), kbox_labels::MANAGED_BY_VALUE.to_string());
        let mut data = BTreeMap::new();
        data.insert("releases".to_string(), json);
        let cm = ConfigMap {
            metadata: ObjectMeta {
                name: Some(name.clone()),
                namespace: Some(namespace.to_string()),
                labels: Some(labels),
                ..Default::default()
            },
            data: Some(data),
            ..Default::default()
        };
        let pp = PatchParams::apply(FIELD_MANAGER).force();
        api.patch(&name, &pp, &Patch::Apply(&cm)).await?;
        Ok(())
    }
}

//! Cluster abstraction shared by the apply/prune/release/rollback/preview
//! engines.
//!
//! Every engine in this crate is written against the [`Cluster`] trait
//! rather than against `kube::Client` directly, the same
//! dispatch-over-a-trait shape the renderer uses for its own per-kind
//! steps. [`kube_cluster::KubeCluster`] is the real implementation;
//! [`fake::FakeCluster`] is an in-memory stand-in so the engines' control
//! flow (create-vs-update classification, orphan diffing, revision
//! bookkeeping, label refusal)
//! is unit-testable without a live apiserver or an HTTP mock.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use kbox_definitions::bundle::{Kind, Object};

use crate::Result;

pub mod fake;
pub mod kube_cluster;

pub use kube_cluster::{make_client, KubeCluster};

/// The subset of a Deployment's status the rollout-wait loop needs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeploymentStatus {
    pub generation: i64,
    pub observed_generation: i64,
    pub desired_replicas: i32,
    pub updated_replicas: i32,
    pub available_replicas: i32,
}

impl DeploymentStatus {
    /// The rollout is complete when the controller has observed the
    /// latest spec generation and every desired replica is both updated
    /// to the new template and available.
    pub fn rolled_out(&self) -> bool {
        self.observed_generation >= self.generation
            && self.updated_replicas >= self.desired_replicas
            && self.available_replicas >= self.desired_replicas
    }
}

/// A namespace's labels/annotations/phase, as needed by the preview
/// manager.
#[derive(Clone, Debug, Default)]
pub struct NamespaceInfo {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    /// The namespace's `status.phase` (`"Active"`/`"Terminating"`), when
    /// the backing cluster reports one.
    pub phase: Option<String>,
}

/// One kind-scoped cluster operation failed; carries `Kind/Name` context
/// so the apply/prune engines can collect these rather than aborting the
/// batch.
#[derive(Clone, Debug)]
pub struct CrudError {
    pub kind: Kind,
    pub name: String,
    pub message: String,
}

impl std::fmt::Display for CrudError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}: {}", self.kind.as_str(), self.name, self.message)
    }
}

/// Everything the apply/prune/release/rollback/preview engines need from
/// a cluster. Implemented once against a real `kube::Client`
/// ([`kube_cluster::KubeCluster`]) and once in memory for tests
/// ([`fake::FakeCluster`]).
#[async_trait]
pub trait Cluster: Send + Sync {
    /// Server-side applies `object` in `namespace` with field-manager
    /// `kbox` and forced ownership. Returns whether an object by
    /// this name already existed before the apply.
    async fn apply_object(&self, namespace: &str, object: &Object) -> Result<bool>;

    /// Lists every object of `kind` in `namespace` whose `app` label
    /// equals `app_label`.
    async fn list_by_app_label(&self, kind: Kind, namespace: &str, app_label: &str) -> Result<Vec<Object>>;

    /// Deletes one object (`propagationPolicy=Foreground`), ignoring a
    /// prior 404.
    async fn delete_object(&self, kind: Kind, namespace: &str, name: &str) -> Result<()>;

    /// Fetches rollout-relevant Deployment status. `None` if the
    /// Deployment does not exist yet.
    async fn deployment_status(&self, namespace: &str, name: &str) -> Result<Option<DeploymentStatus>>;

    /// Creates a namespace with the given labels/annotations if absent
    /// (idempotent server-side apply), or returns
    /// `ErrorKind::PreviewExists` if one is already present.
    async fn create_namespace(
        &self,
        name: &str,
        labels: BTreeMap<String, String>,
        annotations: BTreeMap<String, String>,
    ) -> Result<DateTime<Utc>>;

    /// Fetches a namespace's labels/annotations, if it exists.
    async fn get_namespace(&self, name: &str) -> Result<Option<NamespaceInfo>>;

    /// Deletes a namespace (cascading). Idempotent: a missing namespace
    /// is not an error.
    async fn delete_namespace(&self, name: &str) -> Result<()>;

    /// Lists namespaces matching a `kbox.dev/app`+`kbox.dev/preview`
    /// selector.
    async fn list_namespaces_by_labels(&self, labels: &BTreeMap<String, String>) -> Result<Vec<NamespaceInfo>>;

    /// Reads the `releases` data key of `<app>-releases` in `namespace`,
    /// if that ConfigMap exists.
    async fn get_release_data(&self, namespace: &str, app: &str) -> Result<Option<String>>;

    /// Server-side applies `<app>-releases` with `data.releases = json`.
    async fn put_release_data(&self, namespace: &str, app: &str, json: String) -> Result<()>;
}

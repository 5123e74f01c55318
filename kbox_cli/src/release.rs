//! The release store: persists one JSON-encoded `Vec<Release>`
//! per `(namespace, app)` in a `<app>-releases` ConfigMap, using the
//! pure history operations from `kbox_definitions::release`.

use kbox_definitions::release::{append_release, find_revision, latest, next_revision, previous};
use kbox_definitions::Release;

use crate::cluster::Cluster;
use crate::{ErrorKind, Result};

/// Exposed to [`crate::rollback`], which needs the full history to find
/// both the current and the target release in one read.
pub(crate) async fn load_releases(cluster: &dyn Cluster, namespace: &str, app: &str) -> Result<Vec<Release>> {
    match cluster.get_release_data(namespace, app).await? {
        Some(json) => Ok(serde_json::from_str(&json)?),
        None => Ok(Vec::new()),
    }
}

/// `Save(cfg) -> revision`.
pub async fn save(cluster: &dyn Cluster, namespace: &str, app: &str, cfg: &kbox_definitions::Config) -> Result<u32> {
    let existing = load_releases(cluster, namespace, app).await?;
    let revision = next_revision(&existing);
    let release = Release { revision, timestamp: chrono::Utc::now(), image: cfg.image.clone().unwrap_or_default(), config: cfg.clone() };
    let releases = append_release(existing, release);
    let json = serde_json::to_string(&releases)?;
    cluster.put_release_data(namespace, app, json).await?;
    Ok(revision)
}

/// `List()`: every retained release, ascending by revision.
pub async fn list(cluster: &dyn Cluster, namespace: &str, app: &str) -> Result<Vec<Release>> {
    load_releases(cluster, namespace, app).await
}

/// `Get(revision)`.
pub async fn get(cluster: &dyn Cluster, namespace: &str, app: &str, revision: u32) -> Result<Release> {
    let releases = load_releases(cluster, namespace, app).await?;
    find_revision(&releases, revision)
        .cloned()
        .ok_or_else(|| ErrorKind::Manifest(kbox_definitions::ErrorKind::UnknownRevision(app.to_string(), revision)).into())
}

/// `GetLatest()`.
pub async fn get_latest(cluster: &dyn Cluster, namespace: &str, app: &str) -> Result<Option<Release>> {
    let releases = load_releases(cluster, namespace, app).await?;
    Ok(latest(&releases).cloned())
}

/// `GetPrevious()`: requires at least two releases.
pub async fn get_previous(cluster: &dyn Cluster, namespace: &str, app: &str) -> Result<Option<Release>> {
    let releases = load_releases(cluster, namespace, app).await?;
    Ok(previous(&releases).cloned())
}

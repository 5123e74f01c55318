//! The preview manager: creates/destroys/lists ephemeral
//! per-branch namespaces, guarded by the dual `kbox.dev/app` +
//! `kbox.dev/preview-name` labels so `Destroy` can never be pointed at
//! someone else's namespace by accident.

use kbox_definitions::manifest::is_dns1123_label;
use kbox_definitions::preview::{has_preview_labels, preview_namespace, PreviewInfo, PreviewStatus, PREVIEW_APP_LABEL, PREVIEW_LABEL, PREVIEW_NAME_LABEL};
use kbox_definitions::Error as DefinitionsError;

use crate::cluster::Cluster;
use crate::{ErrorKind, Result};

fn validate_preview_name(preview_name: &str) -> Result<()> {
    if !is_dns1123_label(preview_name) {
        let e: DefinitionsError =
            kbox_definitions::ErrorKind::Validation(vec![format!("preview name '{}' is not a valid DNS-1123 label", preview_name)]).into();
        return Err(e.into());
    }
    Ok(())
}

fn status_from_phase(phase: Option<&str>) -> PreviewStatus {
    match phase {
        Some("Terminating") => PreviewStatus::Terminating,
        _ => PreviewStatus::Active,
    }
}

/// `PreviewCreate(ctx, name)`: fails with `ErrorKind::PreviewExists`
/// if the namespace is already there.
pub async fn create(cluster: &dyn Cluster, app: &str, preview_name: &str) -> Result<PreviewInfo> {
    validate_preview_name(preview_name)?;
    let namespace = preview_namespace(app, preview_name);

    let mut labels = std::collections::BTreeMap::new();
    labels.insert(PREVIEW_LABEL.to_string(), "true".to_string());
    labels.insert(PREVIEW_APP_LABEL.to_string(), app.to_string());
    labels.insert(PREVIEW_NAME_LABEL.to_string(), preview_name.to_string());

    let created = cluster.create_namespace(&namespace, labels, std::collections::BTreeMap::new()).await?;

    Ok(PreviewInfo { name: preview_name.to_string(), namespace, app: app.to_string(), created, status: PreviewStatus::Active })
}

/// `PreviewDestroy(ctx, name)`: refuses to delete a namespace that
/// doesn't carry both preview labels for this app. A namespace that's
/// already gone is treated as already destroyed.
pub async fn destroy(cluster: &dyn Cluster, app: &str, preview_name: &str) -> Result<()> {
    validate_preview_name(preview_name)?;
    let namespace = preview_namespace(app, preview_name);

    let info = match cluster.get_namespace(&namespace).await? {
        Some(info) => info,
        None => return Ok(()),
    };
    if !has_preview_labels(&info.labels, app, preview_name) {
        return Err(ErrorKind::NotAPreview(namespace).into());
    }
    cluster.delete_namespace(&namespace).await
}

/// `PreviewGet(ctx, name)`.
pub async fn get(cluster: &dyn Cluster, app: &str, preview_name: &str) -> Result<Option<PreviewInfo>> {
    validate_preview_name(preview_name)?;
    let namespace = preview_namespace(app, preview_name);
    let info = match cluster.get_namespace(&namespace).await? {
        Some(info) => info,
        None => return Ok(None),
    };
    if !has_preview_labels(&info.labels, app, preview_name) {
        return Ok(None);
    }
    let created = parse_created(&info).unwrap_or_else(chrono::Utc::now);
    Ok(Some(PreviewInfo { name: preview_name.to_string(), namespace, app: app.to_string(), created, status: status_from_phase(info.phase.as_deref()) }))
}

/// `PreviewList(ctx)`: every namespace matching the two-label
/// selector for this app.
pub async fn list(cluster: &dyn Cluster, app: &str) -> Result<Vec<PreviewInfo>> {
    let mut selector = std::collections::BTreeMap::new();
    selector.insert(PREVIEW_LABEL.to_string(), "true".to_string());
    selector.insert(PREVIEW_APP_LABEL.to_string(), app.to_string());

    let namespaces = cluster.list_namespaces_by_labels(&selector).await?;
    Ok(namespaces
        .into_iter()
        .filter_map(|info| {
            let preview_name = info.labels.get(PREVIEW_NAME_LABEL)?.clone();
            let created = parse_created(&info).unwrap_or_else(chrono::Utc::now);
            Some(PreviewInfo {
                name: preview_name,
                namespace: info.name.clone(),
                app: app.to_string(),
                created,
                status: status_from_phase(info.phase.as_deref()),
            })
        })
        .collect())
}

fn parse_created(info: &crate::cluster::NamespaceInfo) -> Option<chrono::DateTime<chrono::Utc>> {
    info.annotations
        .get(kbox_definitions::preview::PREVIEW_CREATED_ANNOTATION)
        .and_then(|v| chrono::DateTime::parse_from_rfc3339(v).ok())
        .map(|dt| dt.with_timezone(&chrono::Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    use crate::cluster::fake::FakeCluster;

    #[tokio::test]
    async fn create_then_list_then_destroy() {
        let cluster = FakeCluster::new(Utc.ymd(2026, 1, 1).and_hms(0, 0, 0));
        create(&cluster, "demo", "pr-1").await.unwrap();

        let listed = list(&cluster, "demo").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].namespace, "demo-preview-pr-1");

        destroy(&cluster, "demo", "pr-1").await.unwrap();
        assert!(get(&cluster, "demo", "pr-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn create_twice_conflicts() {
        let cluster = FakeCluster::new(Utc.ymd(2026, 1, 1).and_hms(0, 0, 0));
        create(&cluster, "demo", "pr-1").await.unwrap();
        let err = create(&cluster, "demo", "pr-1").await.unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[tokio::test]
    async fn destroy_refuses_a_namespace_without_both_preview_labels() {
        let cluster = FakeCluster::new(Utc.ymd(2026, 1, 1).and_hms(0, 0, 0));
        cluster.create_namespace("demo-preview-pr-1", Default::default(), Default::default()).await.unwrap();
        let err = destroy(&cluster, "demo", "pr-1").await.unwrap_err();
        assert!(err.to_string().contains("preview"));
    }

    #[tokio::test]
    async fn destroy_of_an_absent_namespace_is_idempotent() {
        let cluster = FakeCluster::new(Utc.ymd(2026, 1, 1).and_hms(0, 0, 0));
        destroy(&cluster, "demo", "pr-1").await.unwrap();
    }

    #[tokio::test]
    async fn rejects_a_preview_name_that_is_not_dns1123() {
        let cluster = FakeCluster::new(Utc.ymd(2026, 1, 1).and_hms(0, 0, 0));
        assert!(create(&cluster, "demo", "PR_1").await.is_err());
    }

    #[tokio::test]
    async fn get_reports_terminating_status() {
        let cluster = FakeCluster::new(Utc.ymd(2026, 1, 1).and_hms(0, 0, 0));
        create(&cluster, "demo", "pr-1").await.unwrap();
        cluster.mark_terminating("demo-preview-pr-1");
        let info = get(&cluster, "demo", "pr-1").await.unwrap().unwrap();
        assert_eq!(info.status, kbox_definitions::preview::PreviewStatus::Terminating);
    }
}

//! Preview (per-branch) environment metadata.

use chrono::{DateTime, Utc};

pub const PREVIEW_LABEL: &str = "kbox.dev/preview";
pub const PREVIEW_APP_LABEL: &str = "kbox.dev/app";
pub const PREVIEW_NAME_LABEL: &str = "kbox.dev/preview-name";
pub const PREVIEW_CREATED_ANNOTATION: &str = "kbox.dev/created";

/// One ephemeral preview namespace.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct PreviewInfo {
    pub name: String,
    pub namespace: String,
    pub app: String,
    pub created: DateTime<Utc>,
    pub status: PreviewStatus,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PreviewStatus {
    Active,
    Terminating,
}

/// `<app>-preview-<previewName>`.
pub fn preview_namespace(app: &str, preview_name: &str) -> String {
    format!("{}-preview-{}", app, preview_name)
}

/// `Destroy` refuses to delete a namespace lacking both preview labels for
/// this app. Kept pure so the refusal rule is testable without a
/// cluster.
pub fn has_preview_labels(
    labels: &std::collections::BTreeMap<String, String>,
    app: &str,
    preview_name: &str,
) -> bool {
    labels.get(PREVIEW_APP_LABEL).map(String::as_str) == Some(app)
        && labels.get(PREVIEW_NAME_LABEL).map(String::as_str) == Some(preview_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_is_derived() {
        assert_eq!(preview_namespace("myapp", "pr-123"), "myapp-preview-pr-123");
    }

    #[test]
    fn label_check_requires_both_labels() {
        let mut labels = std::collections::BTreeMap::new();
        labels.insert(PREVIEW_APP_LABEL.to_string(), "myapp".to_string());
        assert!(!has_preview_labels(&labels, "myapp", "pr-123"));
        labels.insert(PREVIEW_NAME_LABEL.to_string(), "pr-123".to_string());
        assert!(has_preview_labels(&labels, "myapp", "pr-123"));
        assert!(!has_preview_labels(&labels, "otherapp", "pr-123"));
    }
}

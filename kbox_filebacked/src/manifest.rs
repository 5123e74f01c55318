//! `kbox.yaml`/`.yml` file shape and the `kind: App` / `kind: MultiApp`
//! discrimination.

use kbox_definitions::{Config, MultiServiceConfig};

/// The two things a manifest file can declare. The loader pre-parses
/// just the `kind` field to pick which one to fully deserialize into.
#[derive(Deserialize, Clone, Debug)]
pub struct KindProbe {
    #[serde(default = "default_kind")]
    pub kind: String,
}

fn default_kind() -> String { "App".to_string() }

pub const DEFAULT_API_VERSION: &str = "kbox.dev/v1";

#[derive(Deserialize, Clone, Debug)]
pub struct ManifestFile {
    #[serde(rename = "apiVersion", default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_kind")]
    pub kind: String,
    pub metadata: ManifestMetadata,
    pub spec: Config,
}

fn default_api_version() -> String { DEFAULT_API_VERSION.to_string() }

#[derive(Deserialize, Clone, Debug, Default)]
pub struct ManifestMetadata {
    pub name: String,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub labels: std::collections::BTreeMap<String, String>,
}

#[derive(Deserialize, Clone, Debug)]
pub struct MultiManifestFile {
    #[serde(rename = "apiVersion", default = "default_api_version")]
    pub api_version: String,
    pub kind: String,
    pub metadata: ManifestMetadata,
    pub services: std::collections::BTreeMap<String, kbox_definitions::ServiceSpec>,
}

impl From<ManifestFile> for Config {
    /// Folds `metadata.name`/`namespace` into the nested `spec` so callers
    /// only ever deal with one `Config`.
    fn from(file: ManifestFile) -> Config {
        let mut cfg = file.spec;
        cfg.name = file.metadata.name;
        if let Some(ns) = file.metadata.namespace {
            cfg.namespace = ns;
        }
        cfg
    }
}

impl From<MultiManifestFile> for MultiServiceConfig {
    fn from(file: MultiManifestFile) -> MultiServiceConfig {
        MultiServiceConfig {
            name: file.metadata.name,
            namespace: file.metadata.namespace.unwrap_or_else(|| "default".to_string()),
            services: file.services,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_manifest_parses() {
        let yaml = r#"
apiVersion: kbox.dev/v1
kind: App
metadata:
  name: myapp
spec:
  image: myapp:v1
  port: 9000
"#;
        let file: ManifestFile = serde_yaml::from_str(yaml).unwrap();
        let cfg: Config = file.into();
        assert_eq!(cfg.name, "myapp");
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.image.as_deref(), Some("myapp:v1"));
    }

    #[test]
    fn kind_probe_defaults_to_app() {
        let yaml = "metadata:\n  name: x\nspec:\n  image: x:v1\n";
        let probe: KindProbe = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(probe.kind, "App");
    }

    #[test]
    fn multi_manifest_parses() {
        let yaml = r#"
apiVersion: kbox.dev/v1
kind: MultiApp
metadata:
  name: grp
services:
  api:
    image: api:v1
  web:
    image: web:v1
    dependsOn: [api]
"#;
        let file: MultiManifestFile = serde_yaml::from_str(yaml).unwrap();
        let multi: MultiServiceConfig = file.into();
        assert_eq!(multi.services.len(), 2);
        assert_eq!(multi.services["web"].depends_on, vec!["api".to_string()]);
    }
}

//! The manifest model (`Config`), environment overlays, dependency
//! declarations, and aggregated validation.

use std::collections::BTreeMap;

use crate::structs::{
    AutoScaling, DisruptionBudget, EnvVars, HealthCheck, Ingress, Job, ResourceRequirements,
    Verify, Volume,
};
use crate::{Error, ErrorKind, Result};

/// How the container image is produced when none is given directly.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct BuildSpec {
    #[serde(default = "default_build_context")]
    pub context: String,
    #[serde(default = "default_dockerfile")]
    pub dockerfile: String,
}

fn default_build_context() -> String { ".".to_string() }
fn default_dockerfile() -> String { "Dockerfile".to_string() }

/// A managed dependency declaration. The
/// registry lookup and resource synthesis live in `kbox_render`; this is
/// only the user-facing declaration.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct DependencyConfig {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,
}

/// Metrics scraping via a `ServiceMonitor`.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct Metrics {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_path")]
    pub path: String,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

fn default_metrics_path() -> String { "/metrics".to_string() }
fn default_metrics_port() -> u16 { 8080 }

/// A named, partial override applied on top of the base `Config`.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(default)]
pub struct EnvironmentOverlay {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<u32>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingress: Option<Ingress>,
}

/// The declarative description of one application.
///
/// Deserialized straight from `spec:` in `kbox.yaml`, defaulted, and
/// validated. Once handed to the renderer it is treated as immutable.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct Config {
    pub name: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<BuildSpec>,

    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_replicas")]
    pub replicas: u32,
    #[serde(default)]
    pub env: EnvVars,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,
    #[serde(rename = "healthCheck", default, skip_serializing_if = "Option::is_none")]
    pub health_check: Option<HealthCheck>,
    #[serde(rename = "serviceType", default)]
    pub service_type: crate::structs::ServiceType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingress: Option<Ingress>,
    #[serde(rename = "autoScaling", default, skip_serializing_if = "Option::is_none")]
    pub autoscaling: Option<AutoScaling>,
    #[serde(rename = "disruptionBudget", default, skip_serializing_if = "Option::is_none")]
    pub disruption_budget: Option<DisruptionBudget>,
    #[serde(default)]
    pub dependencies: Vec<DependencyConfig>,
    #[serde(default)]
    pub volumes: Vec<Volume>,
    #[serde(default)]
    pub jobs: Vec<Job>,
    #[serde(default)]
    pub metrics: Metrics,
    #[serde(default)]
    pub environments: BTreeMap<String, EnvironmentOverlay>,
    #[serde(default)]
    pub include: Vec<String>,
    /// Env file (`KEY=value`) paths, loaded by `kbox_filebacked` into
    /// the `<app>-secrets` Secret.
    #[serde(rename = "secretFiles", default)]
    pub secret_files: Vec<String>,
    /// SOPS-encrypted file paths, decrypted into `<app>-sops-secrets`.
    #[serde(rename = "sopsFiles", default)]
    pub sops_files: Vec<String>,
}

fn default_namespace() -> String { "default".to_string() }
fn default_port() -> u16 { 8080 }
fn default_replicas() -> u32 { 1 }

impl Default for Config {
    fn default() -> Self {
        Config {
            name: String::new(),
            namespace: default_namespace(),
            image: None,
            build: None,
            port: default_port(),
            replicas: default_replicas(),
            env: EnvVars::default(),
            resources: None,
            health_check: None,
            service_type: Default::default(),
            ingress: None,
            autoscaling: None,
            disruption_budget: None,
            dependencies: vec![],
            volumes: vec![],
            jobs: vec![],
            metrics: Metrics::default(),
            environments: BTreeMap::new(),
            include: vec![],
            secret_files: vec![],
            sops_files: vec![],
        }
    }
}

/// DNS-1123 label: lowercase alphanumerics and `-`, starts with a letter,
/// ends alphanumeric, at most 63 characters.
pub fn is_dns1123_label(s: &str) -> bool {
    if s.is_empty() || s.len() > 63 {
        return false;
    }
    let bytes = s.as_bytes();
    let first_ok = bytes[0].is_ascii_lowercase();
    let last_ok = bytes[bytes.len() - 1].is_ascii_lowercase() || bytes[bytes.len() - 1].is_ascii_digit();
    if !first_ok || !last_ok {
        return false;
    }
    bytes.iter().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'-')
}

impl Config {
    /// Applies a named overlay on top of `self`. Unknown names return the
    /// base unchanged. Returns a fully owned clone rather than a shallow
    /// copy aliasing the base, so callers may freely mutate the result.
    pub fn for_environment(&self, name: &str) -> Config {
        let overlay = match self.environments.get(name) {
            Some(o) => o.clone(),
            None => return self.clone(),
        };
        let mut cfg = self.clone();
        if let Some(replicas) = overlay.replicas {
            cfg.replicas = replicas;
        }
        for (k, v) in overlay.env {
            cfg.env.insert(k, v);
        }
        if let Some(image) = overlay.image {
            cfg.image = Some(image);
        }
        if let Some(resources) = overlay.resources {
            cfg.resources = Some(resources);
        }
        if let Some(ingress) = overlay.ingress {
            cfg.ingress = Some(ingress);
        }
        cfg
    }

    /// Aggregated validation. Returns every failing rule at once
    /// rather than failing on the first, and a separate warning stream
    /// for non-fatal style issues (stray `:latest` tags etc).
    pub fn validate(&self) -> (Vec<String>, Vec<String>) {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if self.name.is_empty() {
            errors.push("name is required".to_string());
        } else if !is_dns1123_label(&self.name) {
            errors.push(format!("name '{}' is not a valid DNS-1123 label", self.name));
        }

        if self.image.is_none() && self.build.is_none() {
            errors.push("either image or build must be provided".to_string());
        }

        if let Some(image) = &self.image {
            if image.ends_with(":latest") || !image.contains(':') {
                warnings.push(format!("image '{}' does not pin a specific tag", image));
            }
        }

        if self.port == 0 {
            errors.push("port must be in 1..65535".to_string());
        }

        // replicas is u32, so "negative" is represented at the loader
        // boundary; nothing further to check here.

        if let Some(r) = &self.resources {
            if let Err(e) = r.verify() {
                errors.push(e.to_string());
            }
        }

        if let Some(hc) = &self.health_check {
            if let Err(e) = hc.verify() {
                errors.push(e.to_string());
            }
        }

        if let Some(ingress) = &self.ingress {
            if let Err(e) = ingress.verify() {
                errors.push(e.to_string());
            }
        }

        if let Some(a) = &self.autoscaling {
            if let Err(e) = a.verify() {
                errors.push(e.to_string());
            }
        }

        if let Some(pdb) = &self.disruption_budget {
            if let Err(e) = pdb.verify() {
                errors.push(e.to_string());
            }
        }

        let mut seen_dep_types = std::collections::BTreeSet::new();
        for dep in &self.dependencies {
            let kind = dep.kind.to_lowercase();
            if !seen_dep_types.insert(kind.clone()) {
                errors.push(format!("dependency type '{}' declared more than once", kind));
            }
            if crate::registry::lookup(&kind).is_none() {
                errors.push(format!(
                    "unsupported dependency type '{}' (supported: {})",
                    dep.kind,
                    crate::registry::supported_types().join(", ")
                ));
            }
        }

        for vol in &self.volumes {
            if let Err(e) = vol.verify() {
                errors.push(e.to_string());
            }
        }

        for job in &self.jobs {
            if let Err(e) = job.verify() {
                errors.push(e.to_string());
            }
        }

        if matches!(self.service_type, crate::structs::ServiceType::LoadBalancer)
            || matches!(self.service_type, crate::structs::ServiceType::NodePort)
        {
            // allowed values; nothing further to validate here, listed
            // explicitly so the match stays exhaustive-by-inspection.
        }

        (errors, warnings)
    }

    /// `validate()` as a `Result`, for call sites that want to propagate
    /// a single aggregated `ErrorKind::Validation`.
    pub fn validate_strict(&self) -> Result<Vec<String>> {
        let (errors, warnings) = self.validate();
        if !errors.is_empty() {
            return Err(Error::from(ErrorKind::Validation(errors)));
        }
        Ok(warnings)
    }
}

/// One entry of a [`MultiServiceConfig`]'s `services` map.
/// Flattens the same fields as a single-service `Config`; `dependsOn`
/// names sibling services this one waits on for rendering order and
/// service-discovery env injection.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ServiceSpec {
    #[serde(flatten)]
    pub config: Config,
    #[serde(rename = "dependsOn", default)]
    pub depends_on: Vec<String>,
}

/// A topologically ordered group of services.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct MultiServiceConfig {
    pub name: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    pub services: BTreeMap<String, ServiceSpec>,
}

impl MultiServiceConfig {
    /// Validates at least one service is present, names are valid,
    /// `dependsOn` resolves and is non-self, and the graph is acyclic.
    pub fn validate(&self) -> (Vec<String>, Vec<String>) {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if self.services.is_empty() {
            errors.push("a MultiApp must declare at least one service".to_string());
        }

        for (name, spec) in &self.services {
            if !is_dns1123_label(name) {
                errors.push(format!("service name '{}' is not a valid DNS-1123 label", name));
            }
            for dep in &spec.depends_on {
                if dep == name {
                    errors.push(format!("service '{}' cannot depend on itself", name));
                } else if !self.services.contains_key(dep) {
                    errors.push(format!("service '{}' depends on unknown service '{}'", name, dep));
                }
            }
            let (mut svc_errors, mut svc_warnings) = spec.config.validate();
            errors.append(&mut svc_errors);
            warnings.append(&mut svc_warnings);
        }

        if errors.is_empty() {
            if let Some(cycle) = self.find_cycle() {
                errors.push(format!("circular dependency among services: {}", cycle.join(" -> ")));
            }
        }

        (errors, warnings)
    }

    /// DFS cycle detection over the `dependsOn` graph. Returns the cycle
    /// as a path of service names when one exists.
    fn find_cycle(&self) -> Option<Vec<String>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark { Temp, Perm }
        let mut marks: BTreeMap<&str, Mark> = BTreeMap::new();
        let mut path: Vec<String> = Vec::new();

        fn visit<'a>(
            node: &'a str,
            services: &'a BTreeMap<String, ServiceSpec>,
            marks: &mut BTreeMap<&'a str, Mark>,
            path: &mut Vec<String>,
        ) -> Option<Vec<String>> {
            match marks.get(node) {
                Some(Mark::Perm) => return None,
                Some(Mark::Temp) => {
                    path.push(node.to_string());
                    return Some(path.clone());
                }
                None => {}
            }
            marks.insert(node, Mark::Temp);
            path.push(node.to_string());
            if let Some(spec) = services.get(node) {
                for dep in &spec.depends_on {
                    if let Some(cycle) = visit(dep, services, marks, path) {
                        return Some(cycle);
                    }
                }
            }
            path.pop();
            marks.insert(node, Mark::Perm);
            None
        }

        for name in self.services.keys() {
            if marks.get(name.as_str()).is_none() {
                if let Some(cycle) = visit(name, &self.services, &mut marks, &mut path) {
                    return Some(cycle);
                }
            }
        }
        None
    }

    pub fn validate_strict(&self) -> Result<Vec<String>> {
        let (errors, warnings) = self.validate();
        if !errors.is_empty() {
            return Err(Error::from(ErrorKind::Validation(errors)));
        }
        Ok(warnings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> Config {
        Config { name: "myapp".into(), image: Some("myapp:v1".into()), ..Config::default() }
    }

    #[test]
    fn minimal_config_is_valid() {
        let (errors, _) = minimal().validate();
        assert!(errors.is_empty(), "{:?}", errors);
    }

    #[test]
    fn missing_image_and_build_fails() {
        let cfg = Config { image: None, build: None, ..minimal() };
        let (errors, _) = cfg.validate();
        assert!(errors.iter().any(|e| e.contains("image or build")));
    }

    #[test]
    fn bad_name_fails() {
        let cfg = Config { name: "NotValid_".into(), ..minimal() };
        let (errors, _) = cfg.validate();
        assert!(errors.iter().any(|e| e.contains("DNS-1123")));
    }

    #[test]
    fn latest_tag_warns_not_errors() {
        let cfg = Config { image: Some("myapp:latest".into()), ..minimal() };
        let (errors, warnings) = cfg.validate();
        assert!(errors.is_empty());
        assert!(warnings.iter().any(|w| w.contains("latest") || w.contains("tag")));
    }

    #[test]
    fn duplicate_dependency_type_fails() {
        let cfg = Config {
            dependencies: vec![
                DependencyConfig { kind: "postgres".into(), version: None, storage: None, resources: None },
                DependencyConfig { kind: "postgres".into(), version: None, storage: None, resources: None },
            ],
            ..minimal()
        };
        let (errors, _) = cfg.validate();
        assert!(errors.iter().any(|e| e.contains("more than once")));
    }

    #[test]
    fn unsupported_dependency_fails() {
        let cfg = Config {
            dependencies: vec![DependencyConfig {
                kind: "oracle".into(),
                version: None,
                storage: None,
                resources: None,
            }],
            ..minimal()
        };
        let (errors, _) = cfg.validate();
        assert!(errors.iter().any(|e| e.contains("unsupported dependency type")));
    }

    #[test]
    fn overlay_merges_env_and_replaces_scalars() {
        let mut base = minimal();
        base.env.insert("FOO".into(), "base".into());
        base.environments.insert(
            "prod".into(),
            EnvironmentOverlay {
                replicas: Some(5),
                env: maplit::btreemap! { "FOO".into() => "prod".into(), "BAR".into() => "1".into() },
                image: Some("myapp:v2".into()),
                resources: None,
                ingress: None,
            },
        );
        let prod = base.for_environment("prod");
        assert_eq!(prod.replicas, 5);
        assert_eq!(prod.env.get("FOO").unwrap(), "prod");
        assert_eq!(prod.env.get("BAR").unwrap(), "1");
        assert_eq!(prod.image.as_deref(), Some("myapp:v2"));
    }

    #[test]
    fn unknown_overlay_returns_base_unchanged() {
        let base = minimal();
        let same = base.for_environment("does-not-exist");
        assert_eq!(same.name, base.name);
        assert_eq!(same.replicas, base.replicas);
    }

    #[test]
    fn dns1123_examples() {
        assert!(is_dns1123_label("myapp"));
        assert!(is_dns1123_label("my-app-2"));
        assert!(!is_dns1123_label("MyApp"));
        assert!(!is_dns1123_label("-leading"));
        assert!(!is_dns1123_label("trailing-"));
        assert!(!is_dns1123_label(""));
        assert!(!is_dns1123_label(&"a".repeat(64)));
    }

    fn svc_spec(depends_on: &[&str]) -> ServiceSpec {
        ServiceSpec {
            config: Config { image: Some("x:v1".into()), ..Config::default() },
            depends_on: depends_on.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn multi_service_requires_at_least_one() {
        let m = MultiServiceConfig { name: "grp".into(), namespace: default_namespace(), services: BTreeMap::new() };
        let (errors, _) = m.validate();
        assert!(errors.iter().any(|e| e.contains("at least one service")));
    }

    #[test]
    fn multi_service_rejects_cycle() {
        let mut services = BTreeMap::new();
        services.insert("a".to_string(), svc_spec(&["b"]));
        services.insert("b".to_string(), svc_spec(&["a"]));
        let m = MultiServiceConfig { name: "grp".into(), namespace: default_namespace(), services };
        let (errors, _) = m.validate();
        assert!(errors.iter().any(|e| e.contains("circular dependency")), "{:?}", errors);
    }

    #[test]
    fn multi_service_rejects_unknown_dependency() {
        let mut services = BTreeMap::new();
        services.insert("web".to_string(), svc_spec(&["api"]));
        let m = MultiServiceConfig { name: "grp".into(), namespace: default_namespace(), services };
        let (errors, _) = m.validate();
        assert!(errors.iter().any(|e| e.contains("unknown service")));
    }

    #[test]
    fn multi_service_accepts_valid_dag() {
        let mut services = BTreeMap::new();
        services.insert("api".to_string(), svc_spec(&[]));
        services.insert("web".to_string(), svc_spec(&["api"]));
        let m = MultiServiceConfig { name: "grp".into(), namespace: default_namespace(), services };
        let (errors, _) = m.validate();
        assert!(errors.is_empty(), "{:?}", errors);
    }
}

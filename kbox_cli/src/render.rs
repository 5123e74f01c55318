//! Loads a manifest directory, applies an optional environment overlay,
//! validates it, and renders it into a `Bundle` — wiring
//! `kbox_filebacked`'s file I/O (manifest + secret loading) in front of
//! `kbox_render`'s pure `Config -> Bundle` pipeline.

use std::collections::BTreeMap;
use std::path::Path;

use kbox_definitions::bundle::Bundle;
use kbox_definitions::{Config, MultiServiceConfig};
use kbox_filebacked::secrets::{load_env_files, load_sops_files};
use kbox_filebacked::{load, Loaded};
use kbox_render::{render as render_one, render_multi, LoadedSecrets};

use crate::Result;

/// `Load(dir) -> Config | MultiServiceConfig`, with `environment`
/// applying a named overlay to a single-service `Config` before
/// validation/rendering. Overlays have no meaning for a `MultiApp`
/// manifest and are ignored there.
pub fn load_config(dir: &Path, environment: Option<&str>) -> Result<Loaded> {
    let loaded = load(dir)?;
    Ok(match (loaded, environment) {
        (Loaded::Single(cfg), Some(env)) => Loaded::Single(cfg.for_environment(env)),
        (other, _) => other,
    })
}

/// `Validate(cfg) -> errors, warnings`.
pub fn validate(loaded: &Loaded) -> (Vec<String>, Vec<String>) {
    match loaded {
        Loaded::Single(cfg) => cfg.validate(),
        Loaded::Multi(multi) => multi.validate(),
    }
}

/// Reads and flattens every secret source a single `Config` references.
/// A source with no files configured renders as `None`, which
/// tells the renderer to skip that Secret/`envFrom` entry entirely.
pub fn load_secrets(cfg: &Config) -> Result<LoadedSecrets> {
    let env_file = if cfg.secret_files.is_empty() { None } else { Some(load_env_files(&cfg.secret_files)?) };
    let sops = if cfg.sops_files.is_empty() { None } else { Some(load_sops_files(&cfg.sops_files)?) };
    Ok(LoadedSecrets { env_file, sops })
}

/// `Render(cfg) -> Bundle`: validates strictly, loads this
/// config's secret files, and renders into the app's namespace.
pub fn render(cfg: &Config) -> Result<Bundle> {
    cfg.validate_strict()?;
    let secrets = load_secrets(cfg)?;
    Ok(render_one(cfg, &cfg.namespace, &secrets)?)
}

/// `RenderMulti(multiCfg) -> Bundle`: validates strictly,
/// loads every service's secret files keyed by service name, and
/// renders the whole topologically-ordered group into one Bundle.
pub fn render_multi_config(multi: &MultiServiceConfig) -> Result<Bundle> {
    multi.validate_strict()?;
    let mut secrets = BTreeMap::new();
    for (name, spec) in &multi.services {
        secrets.insert(name.clone(), load_secrets(&spec.config)?);
    }
    Ok(render_multi(multi, &secrets)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn scratch_dir(tag: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("kbox-render-test-{}-{}", tag, std::process::id()));
        let _ = fs::create_dir_all(&dir);
        dir
    }

    #[test]
    fn load_config_applies_named_environment_overlay() {
        let dir = scratch_dir("overlay");
        fs::write(
            dir.join("kbox.yaml"),
            r#"
apiVersion: kbox.dev/v1
kind: App
metadata:
  name: demo
spec:
  image: demo:1.0.0
  port: 8080
  environments:
    staging:
      replicas: 3
"#,
        )
        .unwrap();

        let loaded = load_config(&dir, Some("staging")).unwrap();
        match loaded {
            Loaded::Single(cfg) => assert_eq!(cfg.replicas, 3),
            Loaded::Multi(_) => panic!("expected a single-service config"),
        }
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn render_fails_closed_without_a_resolved_image() {
        let cfg = Config { name: "demo".to_string(), ..Config::default() };
        assert!(render(&cfg).is_err());
    }

    #[test]
    fn render_skips_secret_sources_with_no_files_configured() {
        let cfg = Config { name: "demo".to_string(), image: Some("demo:1.0.0".to_string()), ..Config::default() };
        let bundle = render(&cfg).unwrap();
        assert!(bundle.get(kbox_definitions::bundle::Kind::Secret, "demo-secrets").is_none());
        assert!(bundle.get(kbox_definitions::bundle::Kind::Secret, "demo-sops-secrets").is_none());
    }
}

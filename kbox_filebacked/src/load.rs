//! Resolves `kbox.yaml`/`.yml` (or a bare `Dockerfile`) in a directory
//! into a `Config`/`MultiServiceConfig`.

use std::fs;
use std::path::Path;

use kbox_definitions::{Config, MultiServiceConfig, Result};

use crate::manifest::{KindProbe, ManifestFile, MultiManifestFile};

/// Either shape a manifest file can resolve to.
#[derive(Clone, Debug)]
pub enum Loaded {
    Single(Config),
    Multi(MultiServiceConfig),
}

fn manifest_path(dir: &Path) -> Option<std::path::PathBuf> {
    for candidate in ["kbox.yaml", "kbox.yml"] {
        let p = dir.join(candidate);
        if p.is_file() {
            return Some(p);
        }
    }
    None
}

/// `Load(dir) -> Config | MultiServiceConfig | error`. Falls back
/// to Dockerfile inference when no manifest file is present.
pub fn load(dir: &Path) -> Result<Loaded> {
    if let Some(path) = manifest_path(dir) {
        debug!("Loading manifest from {}", path.display());
        let data = fs::read_to_string(&path)?;
        let probe: KindProbe = serde_yaml::from_str(&data)?;
        return if probe.kind == "MultiApp" {
            let file: MultiManifestFile = serde_yaml::from_str(&data)?;
            Ok(Loaded::Multi(file.into()))
        } else {
            let file: ManifestFile = serde_yaml::from_str(&data)?;
            Ok(Loaded::Single(file.into()))
        };
    }

    let dockerfile = dir.join("Dockerfile");
    if dockerfile.is_file() {
        return Ok(Loaded::Single(infer_from_dockerfile(dir)?));
    }

    bail!("neither kbox.yaml, kbox.yml, nor a Dockerfile was found in {}", dir.display())
}

/// `InferFromDockerfile(dir) -> Config | error`. Name comes
/// from the directory's base name; port from the **last** `EXPOSE`
/// directive (multi-stage builds report the runtime stage's port, not an
/// intermediate builder's).
pub fn infer_from_dockerfile(dir: &Path) -> Result<Config> {
    let path = dir.join("Dockerfile");
    let data = fs::read_to_string(&path)?;
    let name = dir
        .canonicalize()
        .unwrap_or_else(|_| dir.to_path_buf())
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("app")
        .to_string();

    let port = last_expose_port(&data).unwrap_or(8080);

    Ok(Config {
        name,
        build: Some(kbox_definitions::manifest::BuildSpec {
            context: ".".to_string(),
            dockerfile: "Dockerfile".to_string(),
        }),
        port,
        ..Config::default()
    })
}

/// Parses every `EXPOSE` directive (case-insensitive, `N` or `N/tcp`/
/// `N/udp` form) and returns the last one's port number.
fn last_expose_port(dockerfile: &str) -> Option<u16> {
    let mut last = None;
    for line in dockerfile.lines() {
        let trimmed = line.trim();
        let lower = trimmed.to_lowercase();
        if let Some(rest) = lower.strip_prefix("expose") {
            let rest = rest.trim();
            if rest.is_empty() {
                continue;
            }
            let first_token = rest.split_whitespace().next().unwrap_or("");
            let digits: String = first_token.chars().take_while(|c| c.is_ascii_digit()).collect();
            if let Ok(port) = digits.parse::<u16>() {
                last = Some(port);
            }
        }
    }
    last
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_expose_defaults_to_8080() {
        assert_eq!(last_expose_port("FROM alpine\nRUN echo hi\n"), None);
    }

    #[test]
    fn last_expose_wins_across_multistage() {
        let dockerfile = "FROM builder AS build\nEXPOSE 3000\nFROM alpine\nEXPOSE 9090\n";
        assert_eq!(last_expose_port(dockerfile), Some(9090));
    }

    #[test]
    fn expose_with_tcp_suffix_parses() {
        assert_eq!(last_expose_port("EXPOSE 3000/tcp\n"), Some(3000));
    }

    #[test]
    fn expose_is_case_insensitive() {
        assert_eq!(last_expose_port("expose 4000\n"), Some(4000));
    }

    #[test]
    fn infer_from_dockerfile_builds_minimal_config() {
        let dir = std::env::temp_dir().join(format!("kbox-test-{}", std::process::id()));
        let _ = fs::create_dir_all(&dir);
        fs::write(dir.join("Dockerfile"), "FROM alpine\nEXPOSE 3000\nEXPOSE 9090\n").unwrap();
        let cfg = infer_from_dockerfile(&dir).unwrap();
        assert_eq!(cfg.port, 9090);
        assert!(cfg.image.is_none());
        assert!(cfg.build.is_some());
        let _ = fs::remove_dir_all(&dir);
    }
}

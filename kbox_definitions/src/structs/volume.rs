use super::Verify;
use crate::Result;

/// Where a [`Volume`]'s data actually comes from. Mirrors the subset of
/// Kubernetes volume sources the renderer supports: a
/// cluster-managed `PersistentVolumeClaim`, a node-local scratch
/// `EmptyDir`, or data projected from a `ConfigMap`/`Secret` the
/// application also owns.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub enum VolumeSource {
    /// Requests a PVC of the given size (e.g. `"10Gi"`); the renderer
    /// creates the claim alongside the workload.
    PersistentVolumeClaim { size: String },
    EmptyDir,
    ConfigMap { name: String },
    Secret { name: String },
}

/// A single volume declared on the workload, with its source and mount
/// points.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Volume {
    pub name: String,
    pub source: VolumeSource,
    #[serde(rename = "mountPath")]
    pub mount_path: String,
    #[serde(default)]
    pub mounts: Vec<VolumeMount>,
}

/// A sub-path projection of a [`Volume`] (rarely needed; defaults to the
/// whole volume mounted at `mountPath`).
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct VolumeMount {
    #[serde(rename = "subPath", default)]
    pub sub_path: Option<String>,
    #[serde(rename = "mountPath")]
    pub mount_path: String,
}

impl Verify for Volume {
    fn verify(&self) -> Result<()> {
        if self.name.is_empty() {
            bail!("volume name cannot be empty");
        }
        if !self.mount_path.starts_with('/') {
            bail!("volume '{}' mountPath '{}' must be absolute", self.name, self.mount_path);
        }
        if let VolumeSource::PersistentVolumeClaim { size } = &self.source {
            if size.is_empty() {
                bail!("volume '{}' is a PVC and must set a size", self.name);
            }
            crate::structs::parse_memory(size)
                .map_err(|_| crate::ErrorKind::Msg(format!("volume '{}' has an invalid size '{}'", self.name, size)))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_relative_mount_path() {
        let v = Volume {
            name: "data".into(),
            source: VolumeSource::EmptyDir,
            mount_path: "relative/path".into(),
            mounts: vec![],
        };
        assert!(v.verify().is_err());
    }

    #[test]
    fn pvc_requires_size() {
        let v = Volume {
            name: "data".into(),
            source: VolumeSource::PersistentVolumeClaim { size: String::new() },
            mount_path: "/data".into(),
            mounts: vec![],
        };
        assert!(v.verify().is_err());
    }
}

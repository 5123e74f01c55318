#![allow(non_snake_case)]

//! Manifest model, dependency registry, and rendered-object types shared by
//! every other kbox crate.
//!
//! This crate never talks to a cluster and never touches the filesystem; it
//! only describes data. Loading (`kbox_filebacked`), rendering
//! (`kbox_render`), and cluster I/O (`kbox_cli`) all build on top of the
//! types defined here.

#[macro_use]
extern crate serde_derive;
#[macro_use]
extern crate error_chain;
#[macro_use]
extern crate log;

error_chain! {
    types {
        Error, ErrorKind, ResultExt, Result;
    }
    links {}
    foreign_links {
        Io(::std::io::Error);
        SerdeY(serde_yaml::Error);
        SerdeJ(serde_json::Error);
        Int(::std::num::ParseIntError);
        Float(::std::num::ParseFloatError);
    }
    errors {
        /// A `Config` failed one or more validation rules.
        ///
        /// Carries the full aggregated list rather than failing fast, so a
        /// single `kbox validate` run reports every problem at once.
        Validation(errors: Vec<String>) {
            description("manifest does not validate")
            display("manifest does not validate:\n  - {}", errors.join("\n  - "))
        }
        /// A dependency `type` is not present in the static registry.
        UnsupportedDependency(kind: String, supported: Vec<String>) {
            description("unsupported dependency type")
            display("unsupported dependency type '{}' (supported: {})", kind, supported.join(", "))
        }
        /// The cluster did not have the object a caller expected.
        NotFound(kind: String, name: String) {
            description("resource not found")
            display("{} '{}' not found", kind, name)
        }
        /// Server-side apply rejected a patch due to a field-ownership conflict.
        Conflict(kind: String, name: String, reason: String) {
            description("server-side apply conflict")
            display("conflict applying {}/{}: {}", kind, name, reason)
        }
        /// A bounded wait (usually rollout) exceeded its deadline.
        Timeout(what: String, seconds: u64) {
            description("operation timed out")
            display("timed out after {}s waiting for {}", seconds, what)
        }
        /// `GetPrevious`/`Rollback` asked for a revision the store doesn't have.
        UnknownRevision(app: String, revision: u32) {
            description("unknown release revision")
            display("no release revision {} recorded for {}", revision, app)
        }
    }
}

/// The manifest model (`Config`), environment overlays, and validation.
pub mod manifest;
pub use manifest::{Config, DependencyConfig, EnvironmentOverlay, MultiServiceConfig, ServiceSpec};

/// The static dependency registry (postgres/redis/mongodb/mysql templates).
pub mod registry;
pub use registry::{DependencyTemplate, RENDERED_ENV_PASSWORD_PLACEHOLDER};

/// Typed sub-structures referenced by `Config` (resources, probes, autoscaling, ...).
pub mod structs;

/// The rendered `Bundle` of cluster objects and its deterministic ordering.
pub mod bundle;
pub use bundle::{orphaned_keys, Bundle, Kind, ObjectKey};

/// Release history records.
pub mod release;
pub use release::{append_release, find_revision, latest, next_revision, previous, Release, MAX_HISTORY};

/// Preview environment metadata.
pub mod preview;
pub use preview::{has_preview_labels, preview_namespace, PreviewInfo, PreviewStatus};

/// Label and selector conventions shared by the renderer, apply engine, and
/// prune engine.
pub mod labels;

#[cfg(test)]
mod tests {
    #[test]
    fn error_chain_compiles() {
        let e: crate::Error = crate::ErrorKind::NotFound("Service".into(), "x".into()).into();
        assert!(e.to_string().contains("Service"));
    }
}

#![allow(non_snake_case)]

//! The cluster-facing half of kbox: the apply engine, prune engine,
//! release store, rollback engine, and preview manager.
//!
//! Everything here talks to a Kubernetes cluster (or, in tests, the
//! in-memory [`cluster::fake::FakeCluster`]) through the [`cluster::Cluster`]
//! trait. `kbox_render` and `kbox_filebacked` never import this crate;
//! this crate is the only one that knows what a `kube::Client` is.

#[macro_use]
extern crate serde_derive;
#[macro_use]
extern crate log;
#[macro_use]
extern crate error_chain;

error_chain! {
    types {
        Error, ErrorKind, ResultExt, Result;
    }
    links {
        Manifest(kbox_definitions::Error, kbox_definitions::ErrorKind);
        Filebacked(kbox_filebacked::Error, kbox_filebacked::ErrorKind);
    }
    foreign_links {
        Io(::std::io::Error);
        SerdeY(serde_yaml::Error);
        SerdeJ(serde_json::Error);
        Kube(kube::Error);
    }
    errors {
        /// Wraps an upstream failure with the one-line operator hint the
        /// text-mode CLI prints to stderr.
        Hinted(inner: String, hint: String) {
            description("operation failed")
            display("{}\n  \u{2192} {}", inner, hint)
        }
        /// A preview `Destroy` (or anything namespace-scoped) found a
        /// namespace that doesn't carry this app's preview labels.
        NotAPreview(namespace: String) {
            description("namespace is not a kbox preview for this app")
            display("refusing to delete '{}': missing kbox preview labels for this app", namespace)
        }
        /// `PreviewCreate` found the target namespace already exists.
        PreviewExists(namespace: String) {
            description("preview namespace already exists")
            display("preview namespace '{}' already exists", namespace)
        }
    }
}

/// Converts any error into the hinted, operator-facing form.
pub fn with_hint<E: std::fmt::Display>(e: E, hint: &str) -> Error {
    ErrorKind::Hinted(e.to_string(), hint.to_string()).into()
}

/// The `Cluster` trait and its real (`kube`) and fake (in-memory)
/// implementations.
pub mod cluster;

/// Loads and renders a `Config`/`MultiServiceConfig` into a `Bundle`,
/// wiring in `kbox_filebacked`'s secret loading.
pub mod render;

/// The apply engine.
pub mod apply;

/// The prune engine.
pub mod prune;

/// The release store.
pub mod release;

/// The rollback engine.
pub mod rollback;

/// The preview manager.
pub mod preview;

/// `kbox validate` support: renders the aggregated error/warning lists
/// to stderr-friendly text.
pub mod validate;

//! Renders a validated `kbox_definitions::Config` (or `MultiServiceConfig`)
//! into a `kbox_definitions::Bundle` of typed cluster objects.
//!
//! This crate performs no I/O: it never touches the filesystem, never
//! talks to a cluster, and accepts already-loaded secret data rather than
//! reading files itself. That's `kbox_filebacked`'s job (loading) and
//! `kbox_cli`'s job (applying).

pub use kbox_definitions::{Error, ErrorKind, Result};

mod dependency;
mod multi;
mod security;
pub mod secrets;
mod workload;

pub use multi::render_multi;
pub use secrets::LoadedSecrets;
pub use workload::render;

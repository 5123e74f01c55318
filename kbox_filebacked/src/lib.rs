//! Filesystem-facing loading for kbox.
//!
//! Everything that touches a disk lives here: resolving `kbox.yaml`,
//! inferring a `Config` from a bare `Dockerfile`, and reading/decrypting
//! secret files. `kbox_render` stays I/O-free and only ever sees data this
//! crate has already loaded.

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
    }
    foreign_links {
        Io(::std::io::Error);
        SerdeY(serde_yaml::Error);
        SerdeJ(serde_json::Error);
    }
    errors {
        /// An env-file line did not parse as `KEY=value`.
        EnvFileSyntax(path: String, line: usize, reason: String) {
            description("env file does not parse")
            display("{}:{}: {}", path, line, reason)
        }
    }
}

/// Resolves `kbox.yaml`/`.yml`, or infers from a bare `Dockerfile`.
pub mod load;
/// The `kbox.yaml` file shape and `App`/`MultiApp` discrimination.
pub mod manifest;
/// Env-file and SOPS secret loading.
pub mod secrets;

pub use load::{infer_from_dockerfile, load, Loaded};

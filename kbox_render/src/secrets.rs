//! Pre-loaded secret data handed to the renderer.
//!
//! Reading env files and invoking the SOPS decrypter is I/O the renderer
//! itself never performs (`kbox_render` stays a pure `Config -> Bundle`
//! function); `kbox_filebacked`'s secret loader does that work ahead of
//! time and hands the already-decrypted key/value data in here.

use std::collections::BTreeMap;

/// Decrypted/parsed secret data, keyed for the two Secret objects the
/// renderer may emit: `<app>-secrets` (env files) and
/// `<app>-sops-secrets` (SOPS files).
#[derive(Clone, Debug, Default)]
pub struct LoadedSecrets {
    pub env_file: Option<BTreeMap<String, String>>,
    pub sops: Option<BTreeMap<String, String>>,
}

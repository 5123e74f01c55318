//! The secret loader.
//!
//! Two independent sources feed the `<app>-secrets` / `<app>-sops-secrets`
//! Secrets the renderer wires into `envFrom`: plain
//! `KEY=value` env files, and files encrypted with a SOPS-compatible tool
//! decrypted by shelling out to `sops` on `PATH`.

use std::collections::BTreeMap;
use std::path::Path;
use std::process::Command;

use crate::{Error, ErrorKind, Result};

/// Parses one env file's contents. Each non-comment, non-empty
/// line must be `KEY=value`, split at the **first** `=`. Keys start with
/// a letter or underscore and are otherwise alphanumeric/underscore.
/// Values are trimmed, and a single layer of matching `"…"`/`'…'`
/// quoting is stripped (inner quotes and `=` signs are preserved). A
/// malformed line halts parsing with its line number.
pub fn parse_env_file(contents: &str) -> Result<BTreeMap<String, String>> {
    let mut out = BTreeMap::new();
    for (idx, raw_line) in contents.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let eq = match line.find('=') {
            Some(pos) => pos,
            None => {
                return Err(Error::from(ErrorKind::EnvFileSyntax(
                    "<env>".to_string(),
                    line_no,
                    "missing '=' separator".to_string(),
                )))
            }
        };
        let key = &line[..eq];
        let value = line[eq + 1..].trim();

        if !is_valid_key(key) {
            return Err(Error::from(ErrorKind::EnvFileSyntax(
                "<env>".to_string(),
                line_no,
                format!("invalid key '{}'", key),
            )));
        }

        out.insert(key.to_string(), unquote(value));
    }
    Ok(out)
}

fn is_valid_key(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Strips one layer of matching `"…"` or `'…'` quoting, preserving
/// everything inside (including further quotes and `=` signs).
fn unquote(value: &str) -> String {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 {
        let first = bytes[0];
        let last = bytes[bytes.len() - 1];
        if (first == b'"' && last == b'"') || (first == b'\'' && last == b'\'') {
            return value[1..value.len() - 1].to_string();
        }
    }
    value.to_string()
}

/// Reads and parses `path`, reporting the real file path on error.
pub fn parse_env_file_at(path: &Path) -> Result<BTreeMap<String, String>> {
    let contents = std::fs::read_to_string(path)?;
    parse_env_file(&contents).map_err(|e| match e {
        Error(ErrorKind::EnvFileSyntax(_, line, reason), state) => {
            Error(ErrorKind::EnvFileSyntax(path.display().to_string(), line, reason), state)
        }
        other => other,
    })
}

/// Loads and merges a list of env files in order; later files' keys
/// overwrite earlier ones.
pub fn load_env_files(paths: &[String]) -> Result<BTreeMap<String, String>> {
    let mut merged = BTreeMap::new();
    for path in paths {
        let data = parse_env_file_at(Path::new(path))?;
        merged.extend(data);
    }
    Ok(merged)
}

/// Flattens a decrypted JSON object into `KEY=value` pairs, joining
/// nested object keys with `_`, and skipping any `sops` metadata subtree
/// SOPS itself injects into its plaintext output.
pub fn flatten_json(value: &serde_json::Value) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    if let serde_json::Value::Object(map) = value {
        for (key, val) in map {
            if key == "sops" {
                continue;
            }
            flatten_into(key, val, &mut out);
        }
    }
    out
}

fn flatten_into(prefix: &str, value: &serde_json::Value, out: &mut BTreeMap<String, String>) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, val) in map {
                flatten_into(&format!("{}_{}", prefix, key), val, out);
            }
        }
        serde_json::Value::String(s) => {
            out.insert(prefix.to_string(), s.clone());
        }
        serde_json::Value::Null => {}
        other => {
            out.insert(prefix.to_string(), other.to_string());
        }
    }
}

/// Invokes `sops -d --output-type json <file>` and parses its stdout.
/// The binary must exit 0 and emit valid JSON.
pub fn decrypt_sops_file(path: &Path) -> Result<serde_json::Value> {
    let output = Command::new("sops")
        .args(["-d", "--output-type", "json"])
        .arg(path)
        .output()?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("sops -d {} failed: {}", path.display(), stderr.trim());
    }
    let value: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    Ok(value)
}

/// Decrypts and flattens a list of SOPS files; later files' keys
/// overwrite earlier ones, same as env files.
pub fn load_sops_files(paths: &[String]) -> Result<BTreeMap<String, String>> {
    let mut merged = BTreeMap::new();
    for path in paths {
        let decrypted = decrypt_sops_file(Path::new(path))?;
        merged.extend(flatten_json(&decrypted));
    }
    Ok(merged)
}

use super::Verify;
use crate::Result;
use regex::Regex;

/// A single externally-routed hostname, rendered into one rule of the
/// workload's `Ingress` object.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Ingress {
    pub host: String,
    #[serde(default = "default_path")]
    pub path: String,
    #[serde(rename = "servicePort", default)]
    pub service_port: Option<u16>,
    /// TLS secret name. When set, the host is also added to a `tls` entry
    /// referencing this secret.
    #[serde(rename = "tlsSecretName", default, skip_serializing_if = "Option::is_none")]
    pub tls_secret_name: Option<String>,
}

fn default_path() -> String { "/".to_string() }

impl Verify for Ingress {
    fn verify(&self) -> Result<()> {
        let host_re = Regex::new(r"^[a-z0-9]([a-z0-9\-\.]{0,251}[a-z0-9])?$").unwrap();
        if self.host.is_empty() {
            bail!("ingress.host cannot be empty");
        }
        if !host_re.is_match(&self.host) {
            bail!("ingress.host '{}' is not a valid hostname", self.host);
        }
        if !self.path.starts_with('/') {
            bail!("ingress.path '{}' must start with '/'", self.path);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_host() {
        let i = Ingress { host: "NOT_VALID!!".into(), path: "/".into(), service_port: None, tls_secret_name: None };
        assert!(i.verify().is_err());
    }

    #[test]
    fn accepts_plain_host() {
        let i = Ingress { host: "app.example.com".into(), path: "/".into(), service_port: None, tls_secret_name: None };
        assert!(i.verify().is_ok());
    }
}

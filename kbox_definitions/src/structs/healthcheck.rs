use super::Verify;
use crate::Result;

/// Liveness/readiness probe configuration, rendered onto the container
/// spec in both the Deployment and the apply engine's rollout wait.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct HealthCheck {
    /// HTTP path to probe, e.g. `/healthz`. A bare TCP check on `port` is
    /// used instead when this is empty.
    #[serde(default)]
    pub path: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(rename = "initialDelaySeconds", default = "default_initial_delay")]
    pub initial_delay_seconds: u32,
    #[serde(rename = "periodSeconds", default = "default_period")]
    pub period_seconds: u32,
    #[serde(rename = "timeoutSeconds", default = "default_timeout")]
    pub timeout_seconds: u32,
    #[serde(rename = "failureThreshold", default = "default_failure_threshold")]
    pub failure_threshold: u32,
}

fn default_port() -> u16 { 8080 }
fn default_initial_delay() -> u32 { 10 }
fn default_period() -> u32 { 10 }
fn default_timeout() -> u32 { 1 }
fn default_failure_threshold() -> u32 { 3 }

impl Default for HealthCheck {
    fn default() -> Self {
        HealthCheck {
            path: String::new(),
            port: default_port(),
            initial_delay_seconds: default_initial_delay(),
            period_seconds: default_period(),
            timeout_seconds: default_timeout(),
            failure_threshold: default_failure_threshold(),
        }
    }
}

impl Verify for HealthCheck {
    fn verify(&self) -> Result<()> {
        if self.period_seconds == 0 {
            bail!("healthCheck.periodSeconds must be greater than 0");
        }
        if self.failure_threshold == 0 {
            bail!("healthCheck.failureThreshold must be greater than 0");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        assert!(HealthCheck::default().verify().is_ok());
    }

    #[test]
    fn rejects_zero_period() {
        let h = HealthCheck { period_seconds: 0, ..HealthCheck::default() };
        assert!(h.verify().is_err());
    }
}

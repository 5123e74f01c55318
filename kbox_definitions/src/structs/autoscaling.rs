use super::Verify;
use crate::Result;

/// Horizontal pod autoscaling, rendered into a `HorizontalPodAutoscaler`
/// targeting the workload's Deployment/StatefulSet.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AutoScaling {
    #[serde(rename = "minReplicas", default = "default_min_replicas")]
    pub min_replicas: u32,
    #[serde(rename = "maxReplicas", default = "default_max_replicas")]
    pub max_replicas: u32,
    /// Target average cpu utilization percentage, e.g. `80` for 80%.
    #[serde(rename = "targetCPUUtilizationPercentage", default, skip_serializing_if = "Option::is_none")]
    pub target_cpu_utilization_percentage: Option<u32>,
}

fn default_min_replicas() -> u32 { 1 }
fn default_max_replicas() -> u32 { 10 }

impl Verify for AutoScaling {
    fn verify(&self) -> Result<()> {
        if self.min_replicas == 0 {
            bail!("autoScaling.minReplicas must be at least 1");
        }
        if self.max_replicas < self.min_replicas {
            bail!(
                "autoScaling.maxReplicas ({}) must be >= minReplicas ({})",
                self.max_replicas,
                self.min_replicas
            );
        }
        if let Some(pct) = self.target_cpu_utilization_percentage {
            if pct == 0 || pct > 100 {
                bail!("autoScaling.targetCPUUtilizationPercentage must be in 1..=100, got {}", pct);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_max_below_min() {
        let a = AutoScaling { min_replicas: 3, max_replicas: 2, target_cpu_utilization_percentage: None };
        assert!(a.verify().is_err());
    }

    #[test]
    fn accepts_sane_range() {
        let a = AutoScaling { min_replicas: 2, max_replicas: 5, target_cpu_utilization_percentage: Some(80) };
        assert!(a.verify().is_ok());
    }

    #[test]
    fn missing_min_max_default_to_one_and_ten() {
        let a: AutoScaling = serde_yaml::from_str("targetCPUUtilizationPercentage: 80").unwrap();
        assert_eq!(a.min_replicas, 1);
        assert_eq!(a.max_replicas, 10);
        assert!(a.verify().is_ok());
    }

    #[test]
    fn empty_block_defaults_and_verifies() {
        let a: AutoScaling = serde_yaml::from_str("{}").unwrap();
        assert_eq!(a.min_replicas, 1);
        assert_eq!(a.max_replicas, 10);
        assert!(a.verify().is_ok());
    }
}

use super::Verify;
use crate::Result;

/// Rendered into a `PodDisruptionBudget` scoped to the workload's selector.
/// Exactly one of the two fields may be set; `Config`
/// validation, not serde, enforces that (mirrors Kubernetes' own
/// either/or semantics on the PDB spec).
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct DisruptionBudget {
    #[serde(rename = "minAvailable", default, skip_serializing_if = "Option::is_none")]
    pub min_available: Option<String>,
    #[serde(rename = "maxUnavailable", default, skip_serializing_if = "Option::is_none")]
    pub max_unavailable: Option<String>,
}

impl Verify for DisruptionBudget {
    fn verify(&self) -> Result<()> {
        match (&self.min_available, &self.max_unavailable) {
            (Some(_), Some(_)) => bail!("disruptionBudget cannot set both minAvailable and maxUnavailable"),
            (None, None) => bail!("disruptionBudget must set one of minAvailable or maxUnavailable"),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_both_set() {
        let d = DisruptionBudget { min_available: Some("1".into()), max_unavailable: Some("1".into()) };
        assert!(d.verify().is_err());
    }

    #[test]
    fn rejects_neither_set() {
        assert!(DisruptionBudget::default().verify().is_err());
    }

    #[test]
    fn accepts_one_set() {
        let d = DisruptionBudget { min_available: Some("50%".into()), max_unavailable: None };
        assert!(d.verify().is_ok());
    }
}

use super::{ResourceRequirements, Verify};
use crate::structs::env::EnvVars;
use crate::Result;

/// A one-off or scheduled task belonging to an application, rendered as a
/// `Job` (no `schedule`) or `CronJob` (`schedule` set) alongside the main
/// workload. Shares the application's image but may
/// override the command and env.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Job {
    pub name: String,
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default)]
    pub env: EnvVars,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,
    /// Cron schedule (five-field). Absent means a plain `Job` that the
    /// apply engine runs once per `kbox apply`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,
    #[serde(rename = "restartPolicy", default = "default_restart_policy")]
    pub restart_policy: String,
}

fn default_restart_policy() -> String { "OnFailure".to_string() }

impl Verify for Job {
    fn verify(&self) -> Result<()> {
        if self.name.is_empty() {
            bail!("job name cannot be empty");
        }
        if self.command.is_empty() {
            bail!("job '{}' must set a command", self.name);
        }
        if let Some(ref sched) = self.schedule {
            if sched.split_whitespace().count() != 5 {
                bail!("job '{}' schedule '{}' must have exactly 5 fields", self.name, sched);
            }
        }
        if self.restart_policy != "OnFailure" && self.restart_policy != "Never" {
            bail!(
                "job '{}' restartPolicy must be 'OnFailure' or 'Never', got '{}'",
                self.name,
                self.restart_policy
            );
        }
        if let Some(ref r) = self.resources {
            r.verify()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_schedule() {
        let j = Job {
            name: "cleanup".into(),
            command: vec!["./cleanup.sh".into()],
            env: EnvVars::default(),
            resources: None,
            schedule: Some("not a cron".into()),
            restart_policy: default_restart_policy(),
        };
        assert!(j.verify().is_err());
    }

    #[test]
    fn accepts_plain_job() {
        let j = Job {
            name: "migrate".into(),
            command: vec!["./migrate.sh".into()],
            env: EnvVars::default(),
            resources: None,
            schedule: None,
            restart_policy: default_restart_policy(),
        };
        assert!(j.verify().is_ok());
    }
}

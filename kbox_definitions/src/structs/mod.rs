//! Sub-structures referenced by [`crate::Config`].
//!
//! One small, independently verifiable type per file, each implementing a
//! `verify()` that the top-level `Config::validate` calls into.

use crate::Result;

mod autoscaling;
mod disruption;
pub mod env;
mod healthcheck;
mod ingress;
mod job;
mod resources;
mod service;
mod volume;

pub use autoscaling::AutoScaling;
pub use disruption::DisruptionBudget;
pub use env::EnvVars;
pub use healthcheck::HealthCheck;
pub use ingress::Ingress;
pub use job::Job;
pub use resources::{double_quantity, parse_cpu, parse_memory, ResourceAmounts, ResourceRequirements};
pub use service::ServiceType;
pub use volume::{Volume, VolumeMount, VolumeSource};

/// Common trait implemented by every sub-structure that can fail
/// validation independently of the rest of the `Config`.
pub trait Verify {
    fn verify(&self) -> Result<()>;
}

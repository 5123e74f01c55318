//! Pod/container security defaults.

use k8s_openapi::api::core::v1::{Capabilities, PodSecurityContext, SeccompProfile, SecurityContext};

/// `runAsNonRoot=true`, optionally pinning a UID (dependency pods; the
/// workload leaves UID selection to the image).
pub fn pod_security_context(run_as_user: Option<i64>) -> PodSecurityContext {
    PodSecurityContext {
        run_as_non_root: Some(true),
        run_as_user,
        ..Default::default()
    }
}

/// `allowPrivilegeEscalation=false`, drop all capabilities,
/// `seccompProfile=RuntimeDefault`, root filesystem read-only unless the
/// caller opts out (dependency templates that need a writable `/`).
pub fn container_security_context(read_only_root_fs: bool) -> SecurityContext {
    SecurityContext {
        allow_privilege_escalation: Some(false),
        read_only_root_filesystem: Some(read_only_root_fs),
        capabilities: Some(Capabilities { drop: Some(vec!["ALL".to_string()]), add: None }),
        seccomp_profile: Some(SeccompProfile { type_: "RuntimeDefault".to_string(), localhost_profile: None }),
        ..Default::default()
    }
}

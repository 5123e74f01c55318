/// Kubernetes `Service.spec.type` for the workload Service. The
/// headless services the dependency subsystem emits (`ClusterIP: None`)
/// are a distinct rendering path, not a value of this enum — see
/// `kbox_render`'s dependency renderer.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum ServiceType {
    ClusterIP,
    NodePort,
    LoadBalancer,
}

impl Default for ServiceType {
    fn default() -> Self { ServiceType::ClusterIP }
}

impl ServiceType {
    pub fn as_k8s_str(&self) -> &'static str {
        match self {
            ServiceType::ClusterIP => "ClusterIP",
            ServiceType::NodePort => "NodePort",
            ServiceType::LoadBalancer => "LoadBalancer",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_expected_strings() {
        assert_eq!(ServiceType::ClusterIP.as_k8s_str(), "ClusterIP");
        assert_eq!(ServiceType::NodePort.as_k8s_str(), "NodePort");
        assert_eq!(ServiceType::LoadBalancer.as_k8s_str(), "LoadBalancer");
    }
}

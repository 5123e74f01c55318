//! The single-service renderer: lowers a validated, defaulted
//! `Config` into the workload-side objects of a `Bundle` (everything
//! besides the dependency subsystem, which lives in `dependency.rs`).

use std::collections::BTreeMap;

use k8s_openapi::api::autoscaling::v2::{
    CrossVersionObjectReference, HorizontalPodAutoscaler, HorizontalPodAutoscalerSpec, MetricSpec, MetricTarget,
    ResourceMetricSource,
};
use k8s_openapi::api::batch::v1::{CronJob, CronJobSpec, Job, JobSpec, JobTemplateSpec};
use k8s_openapi::api::core::v1::{
    ConfigMap, Container, ContainerPort, EmptyDirVolumeSource, EnvFromSource, EnvVar, EnvVarSource,
    HTTPGetAction, PersistentVolumeClaim, PersistentVolumeClaimSpec, PodSpec, PodTemplateSpec, Probe,
    ResourceRequirements as K8sResourceRequirements, Secret, SecretEnvSource, SecretKeySelector,
    SecretVolumeSource, Service, ServiceAccount, ServicePort, ServiceSpec as K8sServiceSpec,
    Volume as K8sVolume, VolumeMount as K8sVolumeMount,
};
use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule, IngressServiceBackend,
    IngressSpec, IngressTLS, NetworkPolicy, NetworkPolicyEgressRule, NetworkPolicyIngressRule,
    NetworkPolicyPeer, NetworkPolicyPort, NetworkPolicySpec, ServiceBackendPort,
};
use k8s_openapi::api::policy::v1::{PodDisruptionBudget, PodDisruptionBudgetSpec};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec, DeploymentStrategy, RollingUpdateDeployment};
use k8s_openapi::ByteString;

use kbox_definitions::bundle::{Bundle, BundleBuilder, Object, ServiceMonitor, ServiceMonitorMetadata};
use kbox_definitions::structs::VolumeSource;
use kbox_definitions::{labels, structs::ResourceAmounts, Config, ErrorKind, Result};

use crate::dependency::{render_dependency, to_k8s_resources};
use crate::secrets::LoadedSecrets;

fn default_resources() -> K8sResourceRequirements {
    K8sResourceRequirements {
        requests: Some(quantities("100m", "128Mi")),
        limits: Some(quantities("200m", "256Mi")),
        claims: None,
    }
}

fn quantities(cpu: &str, memory: &str) -> BTreeMap<String, Quantity> {
    let mut m = BTreeMap::new();
    m.insert("cpu".to_string(), Quantity(cpu.to_string()));
    m.insert("memory".to_string(), Quantity(memory.to_string()));
    m
}

/// Resources default to `{128Mi/100m request, 256Mi/200m limit}` if none
/// given; otherwise limits default to 2x requests per-field when the
/// caller omitted them.
fn resources_for(cfg: &Config) -> Result<K8sResourceRequirements> {
    let Some(r) = &cfg.resources else { return Ok(default_resources()) };
    let requests = r.requests.clone().unwrap_or(ResourceAmounts { cpu: "100m".into(), memory: "128Mi".into() });
    let limits = match &r.limits {
        Some(l) => l.clone(),
        None => ResourceAmounts {
            cpu: kbox_definitions::structs::double_quantity(&requests.cpu),
            memory: kbox_definitions::structs::double_quantity(&requests.memory),
        },
    };
    Ok(K8sResourceRequirements {
        requests: Some(quantities(&requests.cpu, &requests.memory)),
        limits: Some(quantities(&limits.cpu, &limits.memory)),
        claims: None,
    })
}

/// Renders one application's `Config` into a `Bundle`. `loaded_secrets`
/// carries the already-read/decrypted env-file and SOPS data; the
/// renderer never touches the filesystem itself.
pub fn render(cfg: &Config, namespace: &str, loaded_secrets: &LoadedSecrets) -> Result<Bundle> {
    let app = cfg.name.as_str();
    let app_labels = labels::app_labels(app);
    let selector = labels::selector(app);
    let mut b = BundleBuilder::new();

    let image = cfg
        .image
        .clone()
        .ok_or_else(|| ErrorKind::Msg(format!("'{}' has no resolved container image to render", app)))?;

    // Step 1: dependencies, in declaration order.
    let mut dep_env: BTreeMap<String, String> = BTreeMap::new();
    let mut dep_secret_refs: BTreeMap<String, (String, String)> = BTreeMap::new();
    for dep in &cfg.dependencies {
        let out = render_dependency(app, namespace, dep)?;
        for obj in out.objects {
            b.push(obj);
        }
        dep_env.extend(out.plain_env);
        dep_secret_refs.extend(out.secret_refs);
    }

    // Step 2: workload PVCs (size-bearing volumes only).
    let mut pod_volumes = Vec::new();
    let mut pod_volume_mounts = Vec::new();
    for vol in &cfg.volumes {
        match &vol.source {
            VolumeSource::PersistentVolumeClaim { size } => {
                let pvc = PersistentVolumeClaim {
                    metadata: ObjectMeta {
                        name: Some(format!("{}-{}", app, vol.name)),
                        namespace: Some(namespace.to_string()),
                        labels: Some(app_labels.clone()),
                        ..Default::default()
                    },
                    spec: Some(PersistentVolumeClaimSpec {
                        access_modes: Some(vec!["ReadWriteOnce".to_string()]),
                        resources: Some(K8sResourceRequirements {
                            requests: Some(crate::dependency::single_quantity("storage", size)),
                            ..Default::default()
                        }),
                        ..Default::default()
                    }),
                    ..Default::default()
                };
                b.push(Object::PersistentVolumeClaim(Box::new(pvc)));
                pod_volumes.push(K8sVolume {
                    name: vol.name.clone(),
                    persistent_volume_claim: Some(
                        k8s_openapi::api::core::v1::PersistentVolumeClaimVolumeSource {
                            claim_name: format!("{}-{}", app, vol.name),
                            read_only: None,
                        },
                    ),
                    ..Default::default()
                });
            }
            VolumeSource::EmptyDir => {
                pod_volumes.push(K8sVolume {
                    name: vol.name.clone(),
                    empty_dir: Some(EmptyDirVolumeSource::default()),
                    ..Default::default()
                });
            }
            VolumeSource::ConfigMap { name } => {
                pod_volumes.push(K8sVolume {
                    name: vol.name.clone(),
                    config_map: Some(k8s_openapi::api::core::v1::ConfigMapVolumeSource {
                        name: Some(name.clone()),
                        ..Default::default()
                    }),
                    ..Default::default()
                });
            }
            VolumeSource::Secret { name } => {
                pod_volumes.push(K8sVolume {
                    name: vol.name.clone(),
                    secret: Some(SecretVolumeSource { secret_name: Some(name.clone()), ..Default::default() }),
                    ..Default::default()
                });
            }
        }
        if vol.mounts.is_empty() {
            pod_volume_mounts.push(K8sVolumeMount { name: vol.name.clone(), mount_path: vol.mount_path.clone(), ..Default::default() });
        } else {
            for m in &vol.mounts {
                pod_volume_mounts.push(K8sVolumeMount {
                    name: vol.name.clone(),
                    mount_path: m.mount_path.clone(),
                    sub_path: m.sub_path.clone(),
                    ..Default::default()
                });
            }
        }
    }

    // Step 3: Deployment.
    let mut env: Vec<EnvVar> = cfg
        .env
        .iter()
        .map(|(k, v)| EnvVar { name: k.clone(), value: Some(v.clone()), ..Default::default() })
        .collect();
    for (k, v) in &dep_env {
        env.push(EnvVar { name: k.clone(), value: Some(v.clone()), ..Default::default() });
    }
    for (k, (secret_name, secret_key)) in &dep_secret_refs {
        env.push(EnvVar {
            name: k.clone(),
            value_from: Some(EnvVarSource {
                secret_key_ref: Some(SecretKeySelector {
                    name: Some(secret_name.clone()),
                    key: secret_key.clone(),
                    optional: None,
                }),
                ..Default::default()
            }),
            ..Default::default()
        });
    }

    let mut env_from = Vec::new();
    if loaded_secrets.env_file.is_some() {
        env_from.push(EnvFromSource {
            secret_ref: Some(SecretEnvSource { name: Some(format!("{}-secrets", app)), optional: None }),
            ..Default::default()
        });
    }
    if loaded_secrets.sops.is_some() {
        env_from.push(EnvFromSource {
            secret_ref: Some(SecretEnvSource { name: Some(format!("{}-sops-secrets", app)), optional: None }),
            ..Default::default()
        });
    }

    let (liveness_probe, readiness_probe) = match &cfg.health_check {
        Some(hc) if !hc.path.is_empty() => (
            Some(Probe {
                http_get: Some(HTTPGetAction {
                    path: Some(hc.path.clone()),
                    port: IntOrString::Int(i32::from(cfg.port)),
                    ..Default::default()
                }),
                initial_delay_seconds: Some(hc.initial_delay_seconds as i32),
                period_seconds: Some(hc.period_seconds as i32),
                timeout_seconds: Some(hc.timeout_seconds as i32),
                failure_threshold: Some(hc.failure_threshold as i32),
                ..Default::default()
            }),
            Some(Probe {
                http_get: Some(HTTPGetAction {
                    path: Some(hc.path.clone()),
                    port: IntOrString::Int(i32::from(cfg.port)),
                    ..Default::default()
                }),
                initial_delay_seconds: Some((hc.initial_delay_seconds / 2) as i32),
                period_seconds: Some(hc.period_seconds as i32),
                timeout_seconds: Some(hc.timeout_seconds as i32),
                failure_threshold: Some(hc.failure_threshold as i32),
                ..Default::default()
            }),
        ),
        _ => (None, None),
    };

    let deployment = Deployment {
        metadata: ObjectMeta {
            name: Some(app.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(app_labels.clone()),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(cfg.replicas.max(1) as i32),
            selector: LabelSelector { match_labels: Some(selector.clone()), ..Default::default() },
            strategy: Some(DeploymentStrategy {
                type_: Some("RollingUpdate".to_string()),
                rolling_update: Some(RollingUpdateDeployment {
                    max_surge: Some(IntOrString::String("25%".to_string())),
                    max_unavailable: Some(IntOrString::String("25%".to_string())),
                }),
            }),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta { labels: Some(app_labels.clone()), ..Default::default() }),
                spec: Some(PodSpec {
                    service_account_name: Some(app.to_string()),
                    security_context: Some(crate::security::pod_security_context(None)),
                    containers: vec![Container {
                        name: app.to_string(),
                        image: Some(image.clone()),
                        ports: Some(vec![ContainerPort { name: Some("http".to_string()), container_port: i32::from(cfg.port), ..Default::default() }]),
                        env: if env.is_empty() { None } else { Some(env) },
                        env_from: if env_from.is_empty() { None } else { Some(env_from) },
                        resources: Some(resources_for(cfg)?),
                        liveness_probe,
                        readiness_probe,
                        security_context: Some(crate::security::container_security_context(true)),
                        volume_mounts: if pod_volume_mounts.is_empty() { None } else { Some(pod_volume_mounts) },
                        ..Default::default()
                    }],
                    volumes: if pod_volumes.is_empty() { None } else { Some(pod_volumes) },
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    };
    b.push(Object::Deployment(Box::new(deployment)));

    // Step 4: workload Service.
    let svc = Service {
        metadata: ObjectMeta {
            name: Some(app.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(app_labels.clone()),
            ..Default::default()
        },
        spec: Some(K8sServiceSpec {
            type_: Some(cfg.service_type.as_k8s_str().to_string()),
            selector: Some(selector.clone()),
            ports: Some(vec![ServicePort {
                name: Some("http".to_string()),
                port: i32::from(cfg.port),
                target_port: Some(IntOrString::Int(i32::from(cfg.port))),
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    };
    b.push(Object::Service(Box::new(svc)));

    // Step 5: ConfigMap, iff any env keys declared.
    if !cfg.env.is_empty() {
        let cm = ConfigMap {
            metadata: ObjectMeta {
                name: Some(app.to_string()),
                namespace: Some(namespace.to_string()),
                labels: Some(app_labels.clone()),
                ..Default::default()
            },
            data: Some(cfg.env.iter().map(|(k, v)| (k.clone(), v.clone())).collect()),
            ..Default::default()
        };
        b.push(Object::ConfigMap(Box::new(cm)));
    }

    // Step 6: env-file / SOPS secrets (already decrypted by the caller).
    if let Some(data) = &loaded_secrets.env_file {
        b.push(Object::Secret(Box::new(secret_from_map(app, namespace, &format!("{}-secrets", app), &app_labels, data))));
    }
    if let Some(data) = &loaded_secrets.sops {
        b.push(Object::Secret(Box::new(secret_from_map(
            app,
            namespace,
            &format!("{}-sops-secrets", app),
            &app_labels,
            data,
        ))));
    }

    // Step 7: Ingress.
    if let Some(ingress) = &cfg.ingress {
        let tls_secret = ingress.tls_secret_name.clone().unwrap_or_else(|| format!("{}-tls", app));
        let port = ingress.service_port.unwrap_or(cfg.port);
        let obj = Ingress {
            metadata: ObjectMeta {
                name: Some(app.to_string()),
                namespace: Some(namespace.to_string()),
                labels: Some(app_labels.clone()),
                ..Default::default()
            },
            spec: Some(IngressSpec {
                rules: Some(vec![IngressRule {
                    host: Some(ingress.host.clone()),
                    http: Some(HTTPIngressRuleValue {
                        paths: vec![HTTPIngressPath {
                            path: Some(ingress.path.clone()),
                            path_type: "Prefix".to_string(),
                            backend: IngressBackend {
                                service: Some(IngressServiceBackend {
                                    name: app.to_string(),
                                    port: Some(ServiceBackendPort { number: Some(i32::from(port)), ..Default::default() }),
                                }),
                                ..Default::default()
                            },
                        }],
                    }),
                }]),
                tls: Some(vec![IngressTLS { hosts: Some(vec![ingress.host.clone()]), secret_name: Some(tls_secret) }]),
                ..Default::default()
            }),
            ..Default::default()
        };
        b.push(Object::Ingress(Box::new(obj)));
    }

    // Step 8: Jobs/CronJobs.
    for job in &cfg.jobs {
        let job_image = image.clone();
        let job_env: Vec<EnvVar> =
            job.env.iter().map(|(k, v)| EnvVar { name: k.clone(), value: Some(v.clone()), ..Default::default() }).collect();
        let pod_spec = PodSpec {
            security_context: Some(crate::security::pod_security_context(None)),
            restart_policy: Some(job.restart_policy.clone()),
            containers: vec![Container {
                name: job.name.clone(),
                image: Some(job_image),
                command: Some(job.command.clone()),
                env: if job_env.is_empty() { None } else { Some(job_env) },
                resources: job.resources.as_ref().map(to_k8s_resources),
                security_context: Some(crate::security::container_security_context(true)),
                ..Default::default()
            }],
            ..Default::default()
        };
        let job_spec = JobSpec {
            backoff_limit: Some(3),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta { labels: Some(app_labels.clone()), ..Default::default() }),
                spec: Some(pod_spec),
            },
            ..Default::default()
        };
        match &job.schedule {
            Some(schedule) => {
                let cron = CronJob {
                    metadata: ObjectMeta {
                        name: Some(format!("{}-{}", app, job.name)),
                        namespace: Some(namespace.to_string()),
                        labels: Some(app_labels.clone()),
                        ..Default::default()
                    },
                    spec: Some(CronJobSpec {
                        schedule: schedule.clone(),
                        concurrency_policy: Some("Forbid".to_string()),
                        job_template: JobTemplateSpec { metadata: None, spec: Some(job_spec) },
                        ..Default::default()
                    }),
                    ..Default::default()
                };
                b.push(Object::CronJob(Box::new(cron)));
            }
            None => {
                let j = Job {
                    metadata: ObjectMeta {
                        name: Some(format!("{}-{}", app, job.name)),
                        namespace: Some(namespace.to_string()),
                        labels: Some(app_labels.clone()),
                        ..Default::default()
                    },
                    spec: Some(job_spec),
                    ..Default::default()
                };
                b.push(Object::Job(Box::new(j)));
            }
        }
    }

    // Step 9: HPA.
    if let Some(auto) = &cfg.autoscaling {
        let hpa = HorizontalPodAutoscaler {
            metadata: ObjectMeta {
                name: Some(app.to_string()),
                namespace: Some(namespace.to_string()),
                labels: Some(app_labels.clone()),
                ..Default::default()
            },
            spec: Some(HorizontalPodAutoscalerSpec {
                min_replicas: Some(auto.min_replicas as i32),
                max_replicas: auto.max_replicas as i32,
                scale_target_ref: CrossVersionObjectReference {
                    api_version: Some("apps/v1".to_string()),
                    kind: "Deployment".to_string(),
                    name: app.to_string(),
                },
                metrics: Some(vec![MetricSpec {
                    type_: "Resource".to_string(),
                    resource: Some(ResourceMetricSource {
                        name: "cpu".to_string(),
                        target: MetricTarget {
                            type_: "Utilization".to_string(),
                            average_utilization: Some(auto.target_cpu_utilization_percentage.unwrap_or(80) as i32),
                            ..Default::default()
                        },
                    }),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        };
        b.push(Object::HorizontalPodAutoscaler(Box::new(hpa)));
    }

    // Step 10: PDB, when replicas > 1 or autoscaling is enabled, or the
    // user supplied one explicitly.
    let pdb_spec = if let Some(explicit) = &cfg.disruption_budget {
        Some(explicit.clone())
    } else if cfg.replicas > 1 || cfg.autoscaling.is_some() {
        Some(kbox_definitions::structs::DisruptionBudget {
            min_available: None,
            max_unavailable: Some("1".to_string()),
        })
    } else {
        None
    };
    if let Some(pdb) = pdb_spec {
        let obj = PodDisruptionBudget {
            metadata: ObjectMeta {
                name: Some(app.to_string()),
                namespace: Some(namespace.to_string()),
                labels: Some(app_labels.clone()),
                ..Default::default()
            },
            spec: Some(PodDisruptionBudgetSpec {
                min_available: pdb.min_available.map(parse_int_or_string),
                max_unavailable: pdb.max_unavailable.map(parse_int_or_string),
                selector: Some(LabelSelector { match_labels: Some(selector.clone()), ..Default::default() }),
                ..Default::default()
            }),
            ..Default::default()
        };
        b.push(Object::PodDisruptionBudget(Box::new(obj)));
    }

    // Step 11: NetworkPolicy.
    let netpol = NetworkPolicy {
        metadata: ObjectMeta {
            name: Some(app.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(app_labels.clone()),
            ..Default::default()
        },
        spec: Some(NetworkPolicySpec {
            pod_selector: LabelSelector { match_labels: Some(selector.clone()), ..Default::default() },
            policy_types: Some(vec!["Ingress".to_string(), "Egress".to_string()]),
            ingress: Some(vec![NetworkPolicyIngressRule {
                from: Some(vec![NetworkPolicyPeer {
                    pod_selector: Some(LabelSelector { match_labels: Some(selector.clone()), ..Default::default() }),
                    ..Default::default()
                }]),
                ports: None,
            }]),
            egress: Some(vec![
                NetworkPolicyEgressRule {
                    to: Some(vec![NetworkPolicyPeer {
                        pod_selector: Some(LabelSelector {
                            match_labels: Some({
                                let mut m = BTreeMap::new();
                                m.insert(labels::DEP_OWNER_KEY.to_string(), app.to_string());
                                m
                            }),
                            ..Default::default()
                        }),
                        ..Default::default()
                    }]),
                    ports: None,
                },
                NetworkPolicyEgressRule {
                    to: Some(vec![NetworkPolicyPeer {
                        namespace_selector: Some(LabelSelector::default()),
                        pod_selector: Some(LabelSelector {
                            match_labels: Some({
                                let mut m = BTreeMap::new();
                                m.insert("k8s-app".to_string(), "kube-dns".to_string());
                                m
                            }),
                            ..Default::default()
                        }),
                        ..Default::default()
                    }]),
                    ports: Some(vec![NetworkPolicyPort {
                        protocol: Some("UDP".to_string()),
                        port: Some(IntOrString::Int(53)),
                        ..Default::default()
                    }]),
                },
                NetworkPolicyEgressRule {
                    to: None,
                    ports: Some(vec![
                        NetworkPolicyPort { protocol: Some("TCP".to_string()), port: Some(IntOrString::Int(80)), ..Default::default() },
                        NetworkPolicyPort { protocol: Some("TCP".to_string()), port: Some(IntOrString::Int(443)), ..Default::default() },
                    ]),
                },
            ]),
        }),
    };
    b.push(Object::NetworkPolicy(Box::new(netpol)));

    // Step 12: ServiceAccount, token automount disabled.
    let sa = ServiceAccount {
        metadata: ObjectMeta {
            name: Some(app.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(app_labels.clone()),
            ..Default::default()
        },
        automount_service_account_token: Some(false),
        ..Default::default()
    };
    b.push(Object::ServiceAccount(Box::new(sa)));

    // Step 13: ServiceMonitor, iff metrics enabled.
    if cfg.metrics.enabled {
        let sm = ServiceMonitor {
            api_version: "monitoring.coreos.com/v1".to_string(),
            kind: "ServiceMonitor".to_string(),
            metadata: ServiceMonitorMetadata { name: app.to_string(), namespace: namespace.to_string(), labels: app_labels.clone() },
            spec: serde_json::json!({
                "selector": { "matchLabels": selector },
                "endpoints": [{ "path": cfg.metrics.path, "port": "http", "targetPort": cfg.metrics.port }],
            }),
        };
        b.push(Object::ServiceMonitor(Box::new(sm)));
    }

    Ok(b.build())
}

fn secret_from_map(
    _app: &str,
    namespace: &str,
    name: &str,
    labels: &BTreeMap<String, String>,
    data: &BTreeMap<String, String>,
) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(labels.clone()),
            ..Default::default()
        },
        type_: Some("Opaque".to_string()),
        data: Some(data.iter().map(|(k, v)| (k.clone(), ByteString(v.clone().into_bytes()))).collect()),
        ..Default::default()
    }
}

fn parse_int_or_string(s: String) -> IntOrString {
    match s.parse::<i32>() {
        Ok(n) => IntOrString::Int(n),
        Err(_) => IntOrString::String(s),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kbox_definitions::bundle::Kind;
    use kbox_definitions::DependencyConfig;

    fn base_cfg() -> Config {
        Config { name: "myapp".into(), image: Some("myapp:v1".into()), ..Config::default() }
    }

    #[test]
    fn minimal_config_renders_deployment_service_sa_netpol_no_configmap_no_pdb() {
        let cfg = base_cfg();
        let bundle = render(&cfg, "default", &LoadedSecrets::default()).unwrap();
        let kinds: Vec<Kind> = bundle.objects().iter().map(|o| o.kind()).collect();
        assert!(kinds.contains(&Kind::Deployment));
        assert!(kinds.contains(&Kind::Service));
        assert!(kinds.contains(&Kind::ServiceAccount));
        assert!(kinds.contains(&Kind::NetworkPolicy));
        assert!(!kinds.contains(&Kind::ConfigMap));
        assert!(!kinds.contains(&Kind::PodDisruptionBudget));
    }

    #[test]
    fn replicas_three_emits_pdb_with_max_unavailable_one() {
        let cfg = Config { replicas: 3, ..base_cfg() };
        let bundle = render(&cfg, "default", &LoadedSecrets::default()).unwrap();
        let pdb = bundle.objects().iter().find_map(|o| match o {
            Object::PodDisruptionBudget(p) => Some(p.clone()),
            _ => None,
        });
        assert!(pdb.is_some());
        let spec = pdb.unwrap().spec.unwrap();
        assert_eq!(spec.max_unavailable, Some(IntOrString::Int(1)));
    }

    #[test]
    fn pvc_volume_requests_storage_not_cpu_or_memory() {
        let cfg = Config {
            volumes: vec![kbox_definitions::structs::Volume {
                name: "data".into(),
                source: VolumeSource::PersistentVolumeClaim { size: "10Gi".into() },
                mount_path: "/data".into(),
                mounts: vec![],
            }],
            ..base_cfg()
        };
        let bundle = render(&cfg, "default", &LoadedSecrets::default()).unwrap();
        let pvc = bundle
            .objects()
            .iter()
            .find_map(|o| match o {
                Object::PersistentVolumeClaim(p) => Some(p.clone()),
                _ => None,
            })
            .unwrap();
        let requests = pvc.spec.unwrap().resources.unwrap().requests.unwrap();
        assert_eq!(requests.get("storage"), Some(&Quantity("10Gi".to_string())));
        assert!(!requests.contains_key("cpu"));
        assert!(!requests.contains_key("memory"));
    }

    #[test]
    fn postgres_dependency_merges_env_with_no_plaintext_password() {
        let cfg = Config {
            dependencies: vec![DependencyConfig { kind: "postgres".into(), version: None, storage: None, resources: None }],
            ..base_cfg()
        };
        let bundle = render(&cfg, "default", &LoadedSecrets::default()).unwrap();
        let dep = bundle.deployment().unwrap();
        let container = &dep.spec.as_ref().unwrap().template.spec.as_ref().unwrap().containers[0];
        let env = container.env.as_ref().unwrap();
        let database_url = env.iter().find(|e| e.name == "DATABASE_URL").unwrap();
        assert!(database_url.value.is_none(), "DATABASE_URL must be a secret ref, not a literal value");
        assert!(database_url.value_from.is_some());
        let pghost = env.iter().find(|e| e.name == "PGHOST").unwrap();
        assert_eq!(pghost.value.as_deref(), Some("myapp-postgres"));

        let kinds: Vec<Kind> = bundle.objects().iter().map(|o| o.kind()).collect();
        assert!(kinds.contains(&Kind::StatefulSet));
        assert!(kinds.contains(&Kind::Secret));
    }

    #[test]
    fn env_keys_declared_emits_configmap() {
        let mut cfg = base_cfg();
        cfg.env.insert("FOO".into(), "bar".into());
        let bundle = render(&cfg, "default", &LoadedSecrets::default()).unwrap();
        assert!(bundle.objects().iter().any(|o| o.kind() == Kind::ConfigMap));
    }

    #[test]
    fn ingress_enabled_emits_ingress_with_default_tls_secret() {
        let cfg = Config {
            ingress: Some(kbox_definitions::structs::Ingress {
                host: "app.example.com".into(),
                path: "/".into(),
                service_port: None,
                tls_secret_name: None,
            }),
            ..base_cfg()
        };
        let bundle = render(&cfg, "default", &LoadedSecrets::default()).unwrap();
        let ing = bundle.objects().iter().find_map(|o| match o {
            Object::Ingress(i) => Some(i.clone()),
            _ => None,
        }).unwrap();
        let tls = &ing.spec.unwrap().tls.unwrap()[0];
        assert_eq!(tls.secret_name.as_deref(), Some("myapp-tls"));
    }

    #[test]
    fn render_without_image_fails() {
        let cfg = Config { image: None, build: Some(kbox_definitions::manifest::BuildSpec::default()), ..base_cfg() };
        assert!(render(&cfg, "default", &LoadedSecrets::default()).is_err());
    }
}

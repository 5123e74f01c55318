//! The dependency subsystem.
//!
//! Synthesises a headless Service, optional credential Secret, and a
//! single-replica StatefulSet for one [`DependencyConfig`], and returns
//! the env vars/secret-refs to merge into the consuming workload.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{StatefulSet, StatefulSetSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, ExecAction, PersistentVolumeClaim, PersistentVolumeClaimSpec,
    PodSpec, PodTemplateSpec, Probe, ResourceRequirements as K8sResourceRequirements, Secret, SecretKeySelector,
    Service, ServicePort, ServiceSpec as K8sServiceSpec, VolumeMount as K8sVolumeMount,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::ByteString;
use rand::RngCore;

use kbox_definitions::bundle::Object;
use kbox_definitions::registry::{self, render_env_vars_with_secret_refs, DependencyTemplate};
use kbox_definitions::{labels, DependencyConfig, ErrorKind, Result};

/// Everything the workload renderer needs to merge in after rendering
/// every declared dependency, in declaration order.
#[derive(Default)]
pub struct DependencyOutput {
    pub objects: Vec<Object>,
    pub plain_env: BTreeMap<String, String>,
    pub secret_refs: BTreeMap<String, (String, String)>,
}

fn generate_password() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn data_path_for(template: &DependencyTemplate) -> &'static str { template.data_path }

pub fn render_dependency(app: &str, namespace: &str, dep: &DependencyConfig) -> Result<DependencyOutput> {
    let kind = dep.kind.to_lowercase();
    let template = registry::lookup(&kind)
        .ok_or_else(|| ErrorKind::UnsupportedDependency(dep.kind.clone(), registry::supported_types()))?;

    let service_name = format!("{}-{}", app, template.kind);
    let version = dep.version.clone().unwrap_or_else(|| template.default_version.to_string());
    let image = format!("{}:{}", template.image, version);
    let storage = dep.storage.clone().unwrap_or_else(|| template.default_storage.to_string());

    let password = if template.secret_keys.is_empty() { String::new() } else { generate_password() };
    let dep_labels = labels::dependency_labels(&service_name, app, &kind);
    let selector = labels::selector(&service_name);

    let mut output = DependencyOutput::default();

    // Headless Service.
    let svc = Service {
        metadata: ObjectMeta {
            name: Some(service_name.clone()),
            namespace: Some(namespace.to_string()),
            labels: Some(dep_labels.clone()),
            ..Default::default()
        },
        spec: Some(K8sServiceSpec {
            cluster_ip: Some("None".to_string()),
            selector: Some(selector.clone()),
            ports: Some(vec![ServicePort {
                name: Some(template.kind.to_string()),
                port: i32::from(template.port),
                target_port: Some(k8s_openapi::apimachinery::pkg::util::intstr::IntOrString::Int(i32::from(
                    template.port,
                ))),
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    };
    output.objects.push(Object::Service(Box::new(svc)));

    // Secret, iff the template has credentials: exactly one Secret per
    // dependency with a non-empty secret-key set.
    let rendered_env =
        render_env_vars_with_secret_refs(template, &service_name, &service_name, &password);
    if !password.is_empty() {
        let mut data = BTreeMap::new();
        for key in template.secret_keys {
            data.insert((*key).to_string(), ByteString(password.clone().into_bytes()));
        }
        for (key, value) in &rendered_env.secret_data {
            data.insert(key.clone(), ByteString(value.clone().into_bytes()));
        }
        let secret = Secret {
            metadata: ObjectMeta {
                name: Some(service_name.clone()),
                namespace: Some(namespace.to_string()),
                labels: Some(dep_labels.clone()),
                ..Default::default()
            },
            type_: Some("Opaque".to_string()),
            data: Some(data),
            ..Default::default()
        };
        output.objects.push(Object::Secret(Box::new(secret)));
    }

    output.plain_env = rendered_env.plain_env;
    output.secret_refs = rendered_env.secret_refs;

    // StatefulSet: one replica, data volume mounted at the type-specific
    // path, VolumeClaimTemplate for persistence.
    let data_path = data_path_for(template);
    let mut env: Vec<EnvVar> = Vec::new();
    for key in template.secret_keys {
        env.push(EnvVar {
            name: (*key).to_string(),
            value_from: Some(k8s_openapi::api::core::v1::EnvVarSource {
                secret_key_ref: Some(SecretKeySelector {
                    name: Some(service_name.clone()),
                    key: (*key).to_string(),
                    optional: None,
                }),
                ..Default::default()
            }),
            ..Default::default()
        });
    }

    let readiness_probe = if template.health_check_command.is_empty() {
        None
    } else {
        Some(Probe {
            exec: Some(ExecAction {
                command: Some(template.health_check_command.iter().map(|s| (*s).to_string()).collect()),
            }),
            initial_delay_seconds: Some(5),
            period_seconds: Some(10),
            ..Default::default()
        })
    };

    let statefulset = StatefulSet {
        metadata: ObjectMeta {
            name: Some(service_name.clone()),
            namespace: Some(namespace.to_string()),
            labels: Some(dep_labels.clone()),
            ..Default::default()
        },
        spec: Some(StatefulSetSpec {
            service_name: service_name.clone(),
            replicas: Some(1),
            selector: LabelSelector { match_labels: Some(selector.clone()), ..Default::default() },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta { labels: Some(dep_labels.clone()), ..Default::default() }),
                spec: Some(PodSpec {
                    security_context: Some(crate::security::pod_security_context(Some(template.runtime_uid))),
                    containers: vec![Container {
                        name: template.kind.to_string(),
                        image: Some(image),
                        ports: Some(vec![ContainerPort { container_port: i32::from(template.port), ..Default::default() }]),
                        env: if env.is_empty() { None } else { Some(env) },
                        readiness_probe,
                        security_context: Some(crate::security::container_security_context(
                            template.read_only_root_fs,
                        )),
                        volume_mounts: Some(vec![K8sVolumeMount {
                            name: "data".to_string(),
                            mount_path: data_path.to_string(),
                            ..Default::default()
                        }]),
                        resources: dep.resources.as_ref().map(to_k8s_resources),
                        ..Default::default()
                    }],
                    ..Default::default()
                }),
            },
            volume_claim_templates: Some(vec![PersistentVolumeClaim {
                metadata: ObjectMeta { name: Some("data".to_string()), ..Default::default() },
                spec: Some(PersistentVolumeClaimSpec {
                    access_modes: Some(vec!["ReadWriteOnce".to_string()]),
                    resources: Some(K8sResourceRequirements {
                        requests: Some(single_quantity("storage", &storage)),
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    };
    output.objects.push(Object::StatefulSet(Box::new(statefulset)));

    Ok(output)
}

pub(crate) fn single_quantity(key: &str, value: &str) -> BTreeMap<String, Quantity> {
    let mut m = BTreeMap::new();
    m.insert(key.to_string(), Quantity(value.to_string()));
    m
}

pub(crate) fn to_k8s_resources(r: &kbox_definitions::structs::ResourceRequirements) -> K8sResourceRequirements {
    K8sResourceRequirements {
        requests: r.requests.as_ref().map(|a| {
            let mut m = BTreeMap::new();
            m.insert("cpu".to_string(), Quantity(a.cpu.clone()));
            m.insert("memory".to_string(), Quantity(a.memory.clone()));
            m
        }),
        limits: r.limits.as_ref().map(|a| {
            let mut m = BTreeMap::new();
            m.insert("cpu".to_string(), Quantity(a.cpu.clone()));
            m.insert("memory".to_string(), Quantity(a.memory.clone()));
            m
        }),
        claims: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kbox_definitions::bundle::Kind;

    #[test]
    fn unsupported_dependency_errors() {
        let dep = DependencyConfig { kind: "oracle".into(), version: None, storage: None, resources: None };
        let result = render_dependency("myapp", "default", &dep);
        assert!(result.is_err());
    }

    #[test]
    fn postgres_emits_statefulset_headless_service_and_secret() {
        let dep = DependencyConfig { kind: "postgres".into(), version: None, storage: None, resources: None };
        let out = render_dependency("myapp", "default", &dep).unwrap();
        let kinds: Vec<Kind> = out.objects.iter().map(|o| o.kind()).collect();
        assert!(kinds.contains(&Kind::Service));
        assert!(kinds.contains(&Kind::Secret));
        assert!(kinds.contains(&Kind::StatefulSet));
        assert!(out.secret_refs.contains_key("DATABASE_URL"));
        assert_eq!(out.plain_env["PGHOST"], "myapp-postgres");
    }

    #[test]
    fn redis_has_no_secret() {
        let dep = DependencyConfig { kind: "redis".into(), version: None, storage: None, resources: None };
        let out = render_dependency("myapp", "default", &dep).unwrap();
        assert!(!out.objects.iter().any(|o| o.kind() == Kind::Secret));
    }

    #[test]
    fn headless_service_has_none_cluster_ip() {
        let dep = DependencyConfig { kind: "redis".into(), version: None, storage: None, resources: None };
        let out = render_dependency("myapp", "default", &dep).unwrap();
        let svc = out.objects.iter().find_map(|o| match o {
            Object::Service(s) => Some(s.clone()),
            _ => None,
        }).unwrap();
        assert_eq!(svc.spec.unwrap().cluster_ip.as_deref(), Some("None"));
    }
}

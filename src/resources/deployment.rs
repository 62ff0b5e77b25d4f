//! Function Deployment

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    ConfigMapVolumeSource, Container, ContainerPort, EmptyDirVolumeSource, EnvVar,
    HTTPGetAction, LocalObjectReference, PodSpec, PodTemplateSpec, Probe, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;

use super::merge::merge;
use super::provision::{
    install_container, prepare_container, staging_script, RUNTIME_PATH, SOURCE_PATH,
};
use super::{function_labels, function_port, owned_meta, selector_labels, Synthesizer};
use crate::crd::Function;
use crate::error::{Error, Result};
use crate::runtimes::RuntimeDescriptor;

impl Synthesizer {
    /// Deployment running the function server.
    ///
    /// The Function's `deployment` override is deep-merged onto the cluster
    /// default template first; the function container is then built on top of
    /// the first container of the merged template.
    pub fn deployment(&self, function: &Function) -> Result<Deployment> {
        let spec = &function.spec;
        let name = function.name_any();
        let runtime = self.runtimes.resolve(&spec.runtime).ok();

        let template = self.merged_template(function)?;
        let template_spec = template.spec.clone().unwrap_or_default();
        let pod_template = template_spec.template.clone();
        let pod_spec = pod_template.spec.clone().unwrap_or_default();
        let mut base_containers = pod_spec.containers.clone().into_iter();
        let base = base_containers.next().unwrap_or_default();

        let image = match base.image.as_deref().filter(|i| !i.is_empty()) {
            Some(image) => image.to_string(),
            None => match runtime {
                Some(runtime) => runtime.image.clone(),
                None if !spec.deps.is_empty() => {
                    return Err(Error::invalid_spec(format!(
                        "dependencies declared for unsupported runtime '{}' and no image given",
                        spec.runtime
                    )))
                }
                None => return Err(Error::UnknownRuntime(spec.runtime.clone())),
            },
        };

        let port = function_port(function);
        let resources = spec.resources.clone().or_else(|| base.resources.clone());
        let env = function_env(function, &base, runtime, resources.as_ref(), port);

        // Code is staged through init containers whenever it needs more than
        // a plain copy; otherwise the ConfigMap is mounted where the runtime
        // looks for it.
        let staged = runtime.filter(|_| {
            !spec.function.is_empty()
                && (!spec.deps.is_empty() || spec.function_content_type.is_encoded())
        });

        let runtime_mount = VolumeMount {
            name: name.clone(),
            mount_path: RUNTIME_PATH.to_string(),
            ..Default::default()
        };
        let source_volume_name = format!("{}-deps", name);

        let mut volumes = pod_spec.volumes.clone().unwrap_or_default();
        let mut init_containers = pod_spec.init_containers.clone().unwrap_or_default();
        match staged {
            Some(runtime) => {
                volumes.push(Volume {
                    name: name.clone(),
                    empty_dir: Some(EmptyDirVolumeSource::default()),
                    ..Default::default()
                });
                volumes.push(Volume {
                    name: source_volume_name.clone(),
                    config_map: Some(ConfigMapVolumeSource {
                        name: name.clone(),
                        ..Default::default()
                    }),
                    ..Default::default()
                });
                let source_mount = VolumeMount {
                    name: source_volume_name,
                    mount_path: SOURCE_PATH.to_string(),
                    ..Default::default()
                };
                let script = staging_script(
                    spec,
                    runtime,
                    &self.source_file_name(spec),
                    &self.staged_file_name(spec),
                );
                init_containers.push(prepare_container(
                    &self.defaults.provision_image,
                    script,
                    runtime_mount.clone(),
                    source_mount,
                ));
                if !spec.deps.is_empty() {
                    init_containers.extend(install_container(runtime, runtime_mount.clone()));
                }
            }
            None => volumes.push(Volume {
                name: name.clone(),
                config_map: Some(ConfigMapVolumeSource {
                    name: name.clone(),
                    ..Default::default()
                }),
                ..Default::default()
            }),
        }

        let mut volume_mounts = base.volume_mounts.clone().unwrap_or_default();
        volume_mounts.push(runtime_mount);

        let container = Container {
            name: name.clone(),
            image: Some(image),
            ports: Some(vec![ContainerPort {
                container_port: port,
                ..Default::default()
            }]),
            env: Some(env),
            resources,
            volume_mounts: Some(volume_mounts),
            liveness_probe: base.liveness_probe.clone().or_else(|| Some(liveness_probe(port))),
            ..base
        };
        let mut containers = vec![container];
        containers.extend(base_containers);

        let mut image_pull_secrets = pod_spec.image_pull_secrets.clone().unwrap_or_default();
        let mut extra_secrets = Vec::new();
        if let Some(runtime) = runtime {
            extra_secrets.extend(runtime.image_pull_secrets.iter().cloned());
        }
        if staged.is_some() {
            extra_secrets.extend(self.defaults.provision_image_secret.iter().cloned());
        }
        for secret in extra_secrets {
            if !image_pull_secrets.iter().any(|s| s.name == secret) {
                image_pull_secrets.push(LocalObjectReference { name: secret });
            }
        }

        let labels = function_labels(function);
        let mut pod_labels = pod_template
            .metadata
            .as_ref()
            .and_then(|m| m.labels.clone())
            .unwrap_or_default();
        pod_labels.extend(labels.clone());

        let mut pod_annotations = pod_template
            .metadata
            .as_ref()
            .and_then(|m| m.annotations.clone())
            .unwrap_or_default();
        for (key, value) in prometheus_annotations(port) {
            pod_annotations.entry(key).or_insert(value);
        }

        let mut deployment_labels = template.metadata.labels.clone().unwrap_or_default();
        deployment_labels.extend(labels);
        let mut metadata = owned_meta(function, name.clone(), deployment_labels)?;
        metadata.annotations = template
            .metadata
            .annotations
            .clone()
            .filter(|a| !a.is_empty());

        Ok(Deployment {
            metadata,
            spec: Some(DeploymentSpec {
                selector: LabelSelector {
                    match_labels: Some(selector_labels(&name)),
                    ..Default::default()
                },
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(pod_labels),
                        annotations: Some(pod_annotations),
                        ..Default::default()
                    }),
                    spec: Some(PodSpec {
                        containers,
                        init_containers: (!init_containers.is_empty()).then_some(init_containers),
                        volumes: Some(volumes),
                        image_pull_secrets: (!image_pull_secrets.is_empty())
                            .then_some(image_pull_secrets),
                        ..pod_spec
                    }),
                },
                ..template_spec
            }),
            ..Default::default()
        })
    }

    /// Cluster default Deployment with the Function's override merged on top
    fn merged_template(&self, function: &Function) -> Result<Deployment> {
        let base = self.defaults.deployment.clone().unwrap_or_default();
        match &function.spec.deployment {
            Some(overrides) => merge(&base, overrides),
            None => Ok(base),
        }
    }
}

/// Environment of the function container.
///
/// User variables come first and suppress any controller variable of the same
/// name; controller variables follow, then the runtime's defaults.
fn function_env(
    function: &Function,
    base: &Container,
    runtime: Option<&RuntimeDescriptor>,
    resources: Option<&k8s_openapi::api::core::v1::ResourceRequirements>,
    port: i32,
) -> Vec<EnvVar> {
    let spec = &function.spec;
    let (module, handler) = spec.handler_parts();
    let memory_limit = resources
        .and_then(|r| r.limits.as_ref())
        .and_then(|limits| limits.get("memory"))
        .map(|q| q.0.clone())
        .unwrap_or_else(|| "0".to_string());

    let mut env = base.env.clone().unwrap_or_default();
    let mut controller_vars: Vec<(String, String)> = vec![
        ("FUNC_HANDLER".to_string(), handler.to_string()),
        ("MOD_NAME".to_string(), module.to_string()),
        ("FUNC_TIMEOUT".to_string(), spec.timeout_or_default().to_string()),
        ("FUNC_RUNTIME".to_string(), spec.runtime.clone()),
        ("FUNC_MEMORY_LIMIT".to_string(), memory_limit),
        ("FUNC_PORT".to_string(), port.to_string()),
    ];
    if let Some(runtime) = runtime {
        controller_vars.extend(runtime.env.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    for (name, value) in controller_vars {
        if env.iter().any(|e| e.name == name) {
            continue;
        }
        env.push(EnvVar {
            name,
            value: Some(value),
            ..Default::default()
        });
    }
    env
}

fn liveness_probe(port: i32) -> Probe {
    Probe {
        initial_delay_seconds: Some(3),
        period_seconds: Some(30),
        http_get: Some(HTTPGetAction {
            path: Some("/healthz".to_string()),
            port: IntOrString::Int(port),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn prometheus_annotations(port: i32) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("prometheus.io/scrape".to_string(), "true".to_string()),
        ("prometheus.io/path".to_string(), "/metrics".to_string()),
        ("prometheus.io/port".to_string(), port.to_string()),
    ])
}

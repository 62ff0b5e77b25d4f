//! Init containers staging function code and dependencies

use k8s_openapi::api::core::v1::{Container, EnvVar, VolumeMount};

use crate::crd::FunctionSpec;
use crate::runtimes::RuntimeDescriptor;

/// Where the runtime expects code and dependencies
pub const RUNTIME_PATH: &str = "/kubeless";

/// Where the ConfigMap is mounted while staging
pub const SOURCE_PATH: &str = "/src";

/// Shell pipeline verifying, decoding and copying the source into the runtime
/// volume. `source_file` is the ConfigMap key, `target_file` the name the
/// runtime loads.
pub fn staging_script(
    spec: &FunctionSpec,
    runtime: &RuntimeDescriptor,
    source_file: &str,
    target_file: &str,
) -> String {
    let source = format!("{}/{}", SOURCE_PATH, source_file);
    let mut steps = Vec::new();

    let payload = if spec.function_content_type.is_encoded() {
        let decoded = format!("/tmp/{}.decoded", source_file);
        steps.push(format!("base64 -d < {} > {}", source, decoded));
        decoded
    } else {
        source
    };

    if let Some(checksum) = spec.checksum.as_deref().filter(|c| !c.is_empty()) {
        let digest = checksum.strip_prefix("sha256:").unwrap_or(checksum);
        steps.push(format!(
            "echo '{}  {}' > /tmp/func.sha256 && sha256sum -c /tmp/func.sha256",
            digest, payload
        ));
    }

    if spec.function_content_type.is_zip() {
        steps.push(format!("unzip -o {} -d {}", payload, RUNTIME_PATH));
    } else {
        steps.push(format!("cp {} {}/{}", payload, RUNTIME_PATH, target_file));
    }

    if !spec.deps.is_empty() && !runtime.dep_name.is_empty() {
        steps.push(format!(
            "cp {}/{} {}",
            SOURCE_PATH, runtime.dep_name, RUNTIME_PATH
        ));
    }

    steps.join(" && ")
}

/// Container running [`staging_script`]
pub fn prepare_container(
    image: &str,
    script: String,
    runtime_mount: VolumeMount,
    source_mount: VolumeMount,
) -> Container {
    Container {
        name: "prepare".to_string(),
        image: Some(image.to_string()),
        command: Some(vec!["sh".to_string(), "-c".to_string()]),
        args: Some(vec![script]),
        volume_mounts: Some(vec![runtime_mount, source_mount]),
        image_pull_policy: Some("IfNotPresent".to_string()),
        ..Default::default()
    }
}

/// Container installing the dependency manifest with the runtime's tooling,
/// or `None` when the runtime has no install command
pub fn install_container(
    runtime: &RuntimeDescriptor,
    runtime_mount: VolumeMount,
) -> Option<Container> {
    if runtime.install_command.is_empty() {
        return None;
    }
    let image = if runtime.init_image.is_empty() {
        &runtime.image
    } else {
        &runtime.init_image
    };
    Some(Container {
        name: "install".to_string(),
        image: Some(image.clone()),
        command: Some(vec!["sh".to_string(), "-c".to_string()]),
        args: Some(vec![runtime.install_command.clone()]),
        working_dir: Some(RUNTIME_PATH.to_string()),
        env: Some(vec![
            EnvVar {
                name: "KUBELESS_INSTALL_VOLUME".to_string(),
                value: Some(RUNTIME_PATH.to_string()),
                ..Default::default()
            },
            EnvVar {
                name: "KUBELESS_DEPS_FILE".to_string(),
                value: Some(format!("{}/{}", RUNTIME_PATH, runtime.dep_name)),
                ..Default::default()
            },
        ]),
        volume_mounts: Some(vec![runtime_mount]),
        image_pull_policy: Some("IfNotPresent".to_string()),
        ..Default::default()
    })
}

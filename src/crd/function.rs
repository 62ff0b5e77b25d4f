//! Function Custom Resource Definition

use chrono::{DateTime, Utc};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;
use k8s_openapi::api::core::v1::{ResourceRequirements, ServiceSpec};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::preserve_unknown_fields;

/// Timeout in seconds applied when `timeout` is left empty
pub const DEFAULT_TIMEOUT: &str = "180";

/// Function resource specification
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "kubeless.io",
    version = "v1beta1",
    kind = "Function",
    plural = "functions",
    singular = "function",
    namespaced,
    status = "FunctionStatus",
    derive = "PartialEq",
    derive = "Default",
    printcolumn = r#"{"name": "Runtime", "type": "string", "jsonPath": ".spec.runtime"}"#,
    printcolumn = r#"{"name": "Handler", "type": "string", "jsonPath": ".spec.handler"}"#,
    printcolumn = r#"{"name": "Phase", "type": "string", "jsonPath": ".status.phase"}"#,
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#
)]
pub struct FunctionSpec {
    /// Entry point in `module.function` form
    #[serde(default)]
    pub handler: String,

    /// Inline source code, encoded per `function-content-type`
    #[serde(default)]
    pub function: String,

    /// Encoding of the inline source
    #[serde(default, rename = "function-content-type")]
    pub function_content_type: ContentType,

    /// Checksum of the inline source (`sha256:<hex>`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,

    /// Dependency manifest contents (requirements.txt, package.json, ...)
    #[serde(default)]
    pub deps: String,

    /// Runtime id, e.g. `python2.7`
    #[serde(default)]
    pub runtime: String,

    /// Invocation timeout in seconds
    #[serde(default)]
    pub timeout: String,

    /// Resource requirements for the function container
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "preserve_unknown_fields")]
    pub resources: Option<ResourceRequirements>,

    /// Partial Deployment merged over the cluster default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "preserve_unknown_fields")]
    pub deployment: Option<Deployment>,

    /// Partial ServiceSpec merged over the default function Service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "preserve_unknown_fields")]
    pub service: Option<ServiceSpec>,

    /// Autoscaler for the function Deployment
    #[serde(
        default,
        rename = "horizontalPodAutoscaler",
        skip_serializing_if = "Option::is_none"
    )]
    #[schemars(schema_with = "preserve_unknown_fields")]
    pub horizontal_pod_autoscaler: Option<HorizontalPodAutoscaler>,
}

/// Encoding of the inline function source
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum ContentType {
    #[default]
    #[serde(rename = "text", alias = "")]
    Text,
    #[serde(rename = "base64")]
    Base64,
    #[serde(rename = "base64+zip")]
    Base64Zip,
}

impl ContentType {
    /// Whether the source must be base64-decoded before use
    pub fn is_encoded(self) -> bool {
        !matches!(self, ContentType::Text)
    }

    /// Whether the decoded source is a zip archive
    pub fn is_zip(self) -> bool {
        matches!(self, ContentType::Base64Zip)
    }
}

impl FunctionSpec {
    /// Split the handler into `(module, function)` at the first dot
    pub fn handler_parts(&self) -> (&str, &str) {
        match self.handler.split_once('.') {
            Some((module, function)) => (module, function),
            None => (self.handler.as_str(), ""),
        }
    }

    /// Timeout with the default applied
    pub fn timeout_or_default(&self) -> &str {
        if self.timeout.is_empty() {
            DEFAULT_TIMEOUT
        } else {
            &self.timeout
        }
    }

    /// The autoscaler, if it is named and names a scale target
    pub fn autoscaler(&self) -> Option<&HorizontalPodAutoscaler> {
        self.horizontal_pod_autoscaler.as_ref().filter(|hpa| {
            let named = hpa.metadata.name.as_deref().is_some_and(|name| !name.is_empty());
            let targeted = hpa
                .spec
                .as_ref()
                .is_some_and(|spec| !spec.scale_target_ref.name.is_empty());
            named && targeted
        })
    }
}

/// Function status
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FunctionStatus {
    /// Current phase (Ready, Failed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,

    /// Human-readable message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Generation the status was computed for
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Status conditions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

/// Status condition
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Condition type
    #[serde(rename = "type")]
    pub type_: String,

    /// Status (True, False, Unknown)
    pub status: String,

    /// Last transition time
    pub last_transition_time: DateTime<Utc>,

    /// Reason for the condition
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handler_splits_at_first_dot() {
        let spec = FunctionSpec {
            handler: "foo.bar.baz".to_string(),
            ..Default::default()
        };
        assert_eq!(spec.handler_parts(), ("foo", "bar.baz"));

        let spec = FunctionSpec::default();
        assert_eq!(spec.handler_parts(), ("", ""));
    }

    #[test]
    fn content_type_wire_names() {
        let parsed: ContentType = serde_json::from_str(r#""base64+zip""#).unwrap();
        assert_eq!(parsed, ContentType::Base64Zip);
        let parsed: ContentType = serde_json::from_str(r#""""#).unwrap();
        assert_eq!(parsed, ContentType::Text);
    }

    #[test]
    fn autoscaler_requires_name_and_target() {
        let with = |hpa: serde_json::Value| FunctionSpec {
            horizontal_pod_autoscaler: Some(serde_json::from_value(hpa).unwrap()),
            ..Default::default()
        };
        let target = serde_json::json!({"kind": "Deployment", "name": "f1"});

        assert!(with(serde_json::json!({})).autoscaler().is_none());
        assert!(with(serde_json::json!({
            "spec": {"scaleTargetRef": target, "maxReplicas": 3}
        }))
        .autoscaler()
        .is_none());
        assert!(with(serde_json::json!({
            "metadata": {"name": ""},
            "spec": {"scaleTargetRef": target, "maxReplicas": 3}
        }))
        .autoscaler()
        .is_none());
        assert!(with(serde_json::json!({
            "metadata": {"name": "f1"},
            "spec": {"scaleTargetRef": {"kind": "Deployment", "name": ""}, "maxReplicas": 3}
        }))
        .autoscaler()
        .is_none());
        assert!(with(serde_json::json!({
            "metadata": {"name": "f1"},
            "spec": {"scaleTargetRef": target, "maxReplicas": 3}
        }))
        .autoscaler()
        .is_some());
    }
}

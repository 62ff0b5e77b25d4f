//! CronJobTrigger Custom Resource Definition

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Invokes a Function on a cron schedule
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "kubeless.io",
    version = "v1beta1",
    kind = "CronJobTrigger",
    plural = "cronjobtriggers",
    singular = "cronjobtrigger",
    namespaced,
    derive = "PartialEq",
    derive = "Default",
    printcolumn = r#"{"name": "Schedule", "type": "string", "jsonPath": ".spec.schedule"}"#
)]
#[serde(rename_all = "kebab-case")]
pub struct CronJobTriggerSpec {
    /// Function in the same namespace to invoke
    pub function_name: String,

    /// Standard five-field cron expression
    pub schedule: String,

    /// JSON body sent with each invocation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

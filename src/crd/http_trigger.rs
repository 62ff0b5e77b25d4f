//! HTTPTrigger Custom Resource Definition

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Exposes a Function through an Ingress rule
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "kubeless.io",
    version = "v1beta1",
    kind = "HTTPTrigger",
    root = "HttpTrigger",
    plural = "httptriggers",
    singular = "httptrigger",
    namespaced,
    derive = "PartialEq",
    derive = "Default"
)]
#[serde(rename_all = "kebab-case")]
pub struct HttpTriggerSpec {
    /// Function in the same namespace to route to
    pub function_name: String,

    /// Virtual host of the Ingress rule
    #[serde(default)]
    pub host_name: String,

    /// Path prefix (defaults to `/`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Request a certificate automatically
    #[serde(default)]
    pub tls: bool,

    /// Existing TLS secret for the host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_secret: Option<String>,

    /// Secret holding basic auth credentials
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub basic_auth_secret: Option<String>,

    /// Ingress controller flavour the annotations target
    #[serde(default)]
    pub gateway: Gateway,

    /// Allow cross-origin requests
    #[serde(default)]
    pub cors_enable: bool,
}

/// Ingress controller flavour
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Gateway {
    #[default]
    Nginx,
    Traefik,
    Kong,
}

impl HttpTriggerSpec {
    /// Path with the default applied
    pub fn path_or_default(&self) -> String {
        match self.path.as_deref() {
            None | Some("") => "/".to_string(),
            Some(path) if path.starts_with('/') => path.to_string(),
            Some(path) => format!("/{}", path),
        }
    }
}

//! Process configuration
//!
//! Command-line/environment settings for the controller process, and the
//! cluster-wide defaults read from the controller's ConfigMap at startup.

use std::collections::BTreeMap;
use std::time::Duration;

use clap::Parser;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::{Api, Client};
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::runtimes::RuntimeRegistry;

/// Image staging function code into the runtime volume
pub const DEFAULT_PROVISION_IMAGE: &str =
    "kubeless/unzip@sha256:f162c062973cca05459834de6ed14c039d45df8cdb76097f50b028a1621b3697";

/// Image issuing scheduled invocations
pub const DEFAULT_CRONJOB_IMAGE: &str =
    "kubeless/unzip@sha256:f162c062973cca05459834de6ed14c039d45df8cdb76097f50b028a1621b3697";

/// Controller process settings
#[derive(Parser, Debug, Clone)]
#[command(name = "function-controller", version, about)]
pub struct Config {
    /// Namespace holding the controller ConfigMap
    #[arg(long, env = "KUBELESS_NAMESPACE", default_value = "kubeless")]
    pub namespace: String,

    /// Name of the controller ConfigMap
    #[arg(long, env = "KUBELESS_CONFIG", default_value = "kubeless-config")]
    pub config_name: String,

    /// Concurrent reconciliation workers per resource kind
    #[arg(long, env = "KUBELESS_WORKERS", default_value_t = 2)]
    pub workers: u16,

    /// Attempts per key before the error is reported and the key dropped
    #[arg(long, env = "KUBELESS_MAX_RETRIES", default_value_t = 5)]
    pub max_retries: u32,

    /// Seconds between full resyncs of the local cache (0 disables)
    #[arg(long, env = "KUBELESS_RESYNC_PERIOD", default_value_t = 0)]
    pub resync_period: u64,

    /// Port serving /metrics and health checks
    #[arg(long, env = "KUBELESS_METRICS_PORT", default_value_t = 8081)]
    pub metrics_port: u16,
}

impl Config {
    pub fn resync_period(&self) -> Option<Duration> {
        (self.resync_period > 0).then(|| Duration::from_secs(self.resync_period))
    }
}

/// Cluster-wide defaults applied to every synthesized resource
#[derive(Clone, Debug, PartialEq)]
pub struct ClusterDefaults {
    /// Deployment template user overrides are merged onto
    pub deployment: Option<Deployment>,

    pub provision_image: String,

    /// Pull secret for the provision image
    pub provision_image_secret: Option<String>,

    pub cronjob_image: String,
}

impl Default for ClusterDefaults {
    fn default() -> Self {
        Self {
            deployment: None,
            provision_image: DEFAULT_PROVISION_IMAGE.to_string(),
            provision_image_secret: None,
            cronjob_image: DEFAULT_CRONJOB_IMAGE.to_string(),
        }
    }
}

impl ClusterDefaults {
    /// Parse the defaults and runtime registry out of the ConfigMap data
    pub fn from_data(data: &BTreeMap<String, String>) -> Result<(Self, RuntimeRegistry)> {
        let mut defaults = ClusterDefaults::default();

        if let Some(deployment) = data.get("deployment").filter(|d| !d.trim().is_empty()) {
            let parsed: Deployment = serde_yaml::from_str(deployment).map_err(|e| {
                Error::config(format!("invalid 'deployment' entry in controller config: {}", e))
            })?;
            defaults.deployment = Some(parsed);
        }
        if let Some(image) = data.get("provision-image").filter(|v| !v.is_empty()) {
            defaults.provision_image = image.clone();
        }
        if let Some(secret) = data.get("provision-image-secret").filter(|v| !v.is_empty()) {
            defaults.provision_image_secret = Some(secret.clone());
        }
        if let Some(image) = data.get("cronjob-image").filter(|v| !v.is_empty()) {
            defaults.cronjob_image = image.clone();
        }

        let runtimes = match data.get("runtime-images") {
            Some(yaml) => RuntimeRegistry::from_yaml(yaml)?,
            None => {
                warn!("Controller config has no 'runtime-images' entry; no runtimes are known");
                RuntimeRegistry::default()
            }
        };

        Ok((defaults, runtimes))
    }

    /// Read the controller ConfigMap from the cluster
    pub async fn load(client: &Client, config: &Config) -> Result<(Self, RuntimeRegistry)> {
        let api: Api<ConfigMap> = Api::namespaced(client.clone(), &config.namespace);
        let config_map = api.get(&config.config_name).await.map_err(|e| {
            Error::config(format!(
                "unable to read ConfigMap {}/{}: {}",
                config.namespace, config.config_name, e
            ))
        })?;
        info!(
            namespace = %config.namespace,
            name = %config.config_name,
            "Loaded controller config"
        );
        Self::from_data(&config_map.data.unwrap_or_default())
    }
}

//! Desired-state synthesis
//!
//! Pure mapping from a Function (or trigger) plus the runtime registry and
//! cluster defaults to the concrete objects the controller owns. Nothing in
//! here talks to the cluster; identical inputs always yield identical objects.

mod autoscaler;
mod configmap;
mod cronjob;
mod deployment;
mod ingress;
pub mod merge;
mod provision;
mod service;

use std::collections::BTreeMap;
use std::sync::Arc;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::{Resource, ResourceExt};

pub use autoscaler::requires_monitor;
pub use cronjob::{cron_job_name, validate_schedule};

use crate::config::ClusterDefaults;
use crate::crd::{Function, ServiceMonitor};
use crate::error::{Error, Result};
use crate::runtimes::RuntimeRegistry;

/// Port the function server listens on unless the Service override says otherwise
pub const DEFAULT_FUNCTION_PORT: i32 = 8080;

/// Name of the single port on the function Service
pub const SERVICE_PORT_NAME: &str = "http-function-port";

/// Everything owned by one Function
#[derive(Clone, Debug, PartialEq)]
pub struct FunctionResources {
    pub config_map: ConfigMap,
    pub service: Service,
    pub deployment: Deployment,
    pub autoscaler: Option<HorizontalPodAutoscaler>,
    pub monitor: Option<ServiceMonitor>,
}

/// Builds owned objects from specs, the runtime registry and cluster defaults
#[derive(Clone, Debug)]
pub struct Synthesizer {
    runtimes: Arc<RuntimeRegistry>,
    defaults: Arc<ClusterDefaults>,
}

impl Synthesizer {
    pub fn new(runtimes: Arc<RuntimeRegistry>, defaults: Arc<ClusterDefaults>) -> Self {
        Self { runtimes, defaults }
    }

    pub fn runtimes(&self) -> &RuntimeRegistry {
        &self.runtimes
    }

    pub fn defaults(&self) -> &ClusterDefaults {
        &self.defaults
    }

    /// Synthesize the complete owned set of a Function
    pub fn function_resources(&self, function: &Function) -> Result<FunctionResources> {
        Ok(FunctionResources {
            config_map: self.config_map(function)?,
            service: self.service(function)?,
            deployment: self.deployment(function)?,
            autoscaler: self.autoscaler(function)?,
            monitor: self.monitor(function)?,
        })
    }
}

/// Labels carried by every object owned by a Function
pub fn function_labels(function: &Function) -> BTreeMap<String, String> {
    let mut labels = function.labels().clone();
    labels.insert("function".to_string(), function.name_any());
    labels.insert("created-by".to_string(), "kubeless".to_string());
    labels
}

/// Labels selecting the pods of a Function
pub fn selector_labels(name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([("function".to_string(), name.to_string())])
}

/// Namespace of a namespaced object
pub(crate) fn namespace_of<K: Resource>(obj: &K) -> Result<String> {
    obj.meta().namespace.clone().ok_or_else(|| {
        Error::invalid_spec(format!(
            "{} has no namespace",
            obj.meta().name.as_deref().unwrap_or("object")
        ))
    })
}

/// Controller owner reference pointing at `owner`
pub fn owner_reference<K>(owner: &K) -> Result<OwnerReference>
where
    K: Resource<DynamicType = ()>,
{
    owner.controller_owner_ref(&()).ok_or_else(|| {
        Error::invalid_spec(format!(
            "{} {} has no uid to reference",
            K::kind(&()),
            owner.meta().name.as_deref().unwrap_or_default()
        ))
    })
}

/// Metadata for an object named `name` owned by `owner`
pub(crate) fn owned_meta<K>(
    owner: &K,
    name: String,
    labels: BTreeMap<String, String>,
) -> Result<ObjectMeta>
where
    K: Resource<DynamicType = ()>,
{
    Ok(ObjectMeta {
        name: Some(name),
        namespace: Some(namespace_of(owner)?),
        labels: Some(labels),
        owner_references: Some(vec![owner_reference(owner)?]),
        ..Default::default()
    })
}

/// Container port of the function server
pub fn function_port(function: &Function) -> i32 {
    let port = function
        .spec
        .service
        .as_ref()
        .and_then(|s| s.ports.as_ref())
        .and_then(|ports| ports.first());
    match port {
        Some(port) => match &port.target_port {
            Some(IntOrString::Int(target)) => *target,
            _ => port.port,
        },
        None => DEFAULT_FUNCTION_PORT,
    }
}

/// Port exposed by the function Service
pub fn service_port(function: &Function) -> i32 {
    function
        .spec
        .service
        .as_ref()
        .and_then(|s| s.ports.as_ref())
        .and_then(|ports| ports.first())
        .map(|port| port.port)
        .unwrap_or(DEFAULT_FUNCTION_PORT)
}

//! Cluster API seam and the idempotent resource applier

mod apply;
mod client;

pub use apply::{ensure, ensure_absent, Applied, Owned};
pub use client::{KubeObjectClient, ObjectClient, FIELD_MANAGER};

use std::sync::Arc;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;
use k8s_openapi::api::batch::v1::CronJob;
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use k8s_openapi::api::networking::v1::Ingress;
use kube::Client;

use crate::crd::{Function, ServiceMonitor};

/// One client per kind the controller reads or writes
#[derive(Clone)]
pub struct Cluster {
    pub config_maps: Arc<dyn ObjectClient<ConfigMap>>,
    pub services: Arc<dyn ObjectClient<Service>>,
    pub deployments: Arc<dyn ObjectClient<Deployment>>,
    pub autoscalers: Arc<dyn ObjectClient<HorizontalPodAutoscaler>>,
    pub monitors: Arc<dyn ObjectClient<ServiceMonitor>>,
    pub cron_jobs: Arc<dyn ObjectClient<CronJob>>,
    pub ingresses: Arc<dyn ObjectClient<Ingress>>,
    pub functions: Arc<dyn ObjectClient<Function>>,
}

impl Cluster {
    /// Clients talking to the API server behind `client`
    pub fn new(client: Client) -> Self {
        Self {
            config_maps: Arc::new(KubeObjectClient::new(client.clone())),
            services: Arc::new(KubeObjectClient::new(client.clone())),
            deployments: Arc::new(KubeObjectClient::new(client.clone())),
            autoscalers: Arc::new(KubeObjectClient::new(client.clone())),
            monitors: Arc::new(KubeObjectClient::new(client.clone())),
            cron_jobs: Arc::new(KubeObjectClient::new(client.clone())),
            ingresses: Arc::new(KubeObjectClient::new(client.clone())),
            functions: Arc::new(KubeObjectClient::new(client)),
        }
    }
}

//! Function autoscaler and the metrics monitor it may depend on

use std::collections::BTreeMap;

use k8s_openapi::api::autoscaling::v2::{CrossVersionObjectReference, HorizontalPodAutoscaler};
use kube::ResourceExt;

use super::{function_labels, owned_meta, selector_labels, Synthesizer, SERVICE_PORT_NAME};
use crate::crd::{Function, MonitorEndpoint, MonitorSelector, ServiceMonitor, ServiceMonitorSpec};
use crate::error::Result;

/// Whether the autoscaler's first metric needs a ServiceMonitor feeding it
pub fn requires_monitor(hpa: &HorizontalPodAutoscaler) -> bool {
    hpa.spec
        .as_ref()
        .and_then(|spec| spec.metrics.as_ref())
        .and_then(|metrics| metrics.first())
        .map(|metric| matches!(metric.type_.as_str(), "Object" | "External"))
        .unwrap_or(false)
}

impl Synthesizer {
    /// Autoscaler targeting the function Deployment, if the Function declares one
    pub fn autoscaler(&self, function: &Function) -> Result<Option<HorizontalPodAutoscaler>> {
        let Some(declared) = function.spec.autoscaler() else {
            return Ok(None);
        };
        let name = function.name_any();

        let mut spec = declared.spec.clone().unwrap_or_default();
        spec.scale_target_ref = CrossVersionObjectReference {
            api_version: Some("apps/v1".to_string()),
            kind: "Deployment".to_string(),
            name: name.clone(),
        };

        Ok(Some(HorizontalPodAutoscaler {
            metadata: owned_meta(function, name, function_labels(function))?,
            spec: Some(spec),
            status: None,
        }))
    }

    /// ServiceMonitor for object/external metrics, if the autoscaler needs one
    pub fn monitor(&self, function: &Function) -> Result<Option<ServiceMonitor>> {
        let Some(declared) = function.spec.autoscaler() else {
            return Ok(None);
        };
        if !requires_monitor(declared) {
            return Ok(None);
        }
        let name = function.name_any();
        let labels = BTreeMap::from([("service-monitor".to_string(), "function".to_string())]);

        let mut monitor = ServiceMonitor::new(
            &name,
            ServiceMonitorSpec {
                selector: MonitorSelector {
                    match_labels: selector_labels(&name),
                },
                endpoints: vec![MonitorEndpoint {
                    port: SERVICE_PORT_NAME.to_string(),
                    path: None,
                }],
            },
        );
        monitor.metadata = owned_meta(function, name, labels)?;
        Ok(Some(monitor))
    }
}

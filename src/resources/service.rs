//! Function Service

use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;

use super::merge::merge;
use super::{
    function_labels, owned_meta, selector_labels, Synthesizer, DEFAULT_FUNCTION_PORT,
    SERVICE_PORT_NAME,
};
use crate::crd::Function;
use crate::error::Result;

impl Synthesizer {
    /// ClusterIP Service exposing the function port, with the Function's
    /// `service` override merged on top
    pub fn service(&self, function: &Function) -> Result<Service> {
        let name = function.name_any();
        let default = ServiceSpec {
            ports: Some(vec![ServicePort {
                name: Some(SERVICE_PORT_NAME.to_string()),
                port: DEFAULT_FUNCTION_PORT,
                target_port: Some(IntOrString::Int(DEFAULT_FUNCTION_PORT)),
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            selector: Some(selector_labels(&name)),
            type_: Some("ClusterIP".to_string()),
            ..Default::default()
        };
        let spec = match &function.spec.service {
            Some(overrides) => merge(&default, overrides)?,
            None => default,
        };

        Ok(Service {
            metadata: owned_meta(function, name, function_labels(function))?,
            spec: Some(spec),
            ..Default::default()
        })
    }
}

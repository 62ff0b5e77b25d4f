//! Ingress routing HTTP traffic to a Function

use std::collections::BTreeMap;

use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
    IngressServiceBackend, IngressSpec, IngressTLS, ServiceBackendPort,
};
use kube::ResourceExt;

use super::{owned_meta, service_port, Synthesizer};
use crate::crd::{Function, Gateway, HttpTrigger};
use crate::error::{Error, Result};

impl Synthesizer {
    /// Ingress for an HTTP trigger, owned by the trigger
    pub fn ingress(&self, trigger: &HttpTrigger, function: &Function) -> Result<Ingress> {
        let spec = &trigger.spec;
        if spec.host_name.is_empty() {
            return Err(Error::invalid_spec(format!(
                "HTTPTrigger {} has no host-name",
                trigger.name_any()
            )));
        }
        let name = trigger.name_any();
        let function_name = function.name_any();

        let mut annotations = BTreeMap::new();
        annotations.insert(
            "kubernetes.io/ingress.class".to_string(),
            gateway_class(spec.gateway).to_string(),
        );
        if spec.tls {
            annotations.insert("kubernetes.io/tls-acme".to_string(), "true".to_string());
            annotations.insert(
                "ingress.kubernetes.io/ssl-redirect".to_string(),
                "true".to_string(),
            );
        }
        if let Some(secret) = spec.basic_auth_secret.as_deref().filter(|s| !s.is_empty()) {
            annotations.extend(basic_auth_annotations(spec.gateway, secret)?);
        }
        if spec.cors_enable {
            if spec.gateway != Gateway::Nginx {
                return Err(Error::invalid_spec(format!(
                    "cors-enable is only supported with the nginx gateway, not {:?}",
                    spec.gateway
                )));
            }
            annotations.insert(
                "nginx.ingress.kubernetes.io/enable-cors".to_string(),
                "true".to_string(),
            );
        }

        let tls = match (spec.tls, spec.tls_secret.as_deref().filter(|s| !s.is_empty())) {
            (_, Some(secret)) => Some(secret.to_string()),
            (true, None) => Some(format!("{}-tls", name)),
            (false, None) => None,
        }
        .map(|secret_name| {
            vec![IngressTLS {
                hosts: Some(vec![spec.host_name.clone()]),
                secret_name: Some(secret_name),
            }]
        });

        let labels = BTreeMap::from([
            ("created-by".to_string(), "kubeless".to_string()),
            ("function".to_string(), function_name.clone()),
        ]);
        let mut metadata = owned_meta(trigger, name, labels)?;
        metadata.annotations = Some(annotations);

        Ok(Ingress {
            metadata,
            spec: Some(IngressSpec {
                rules: Some(vec![IngressRule {
                    host: Some(spec.host_name.clone()),
                    http: Some(HTTPIngressRuleValue {
                        paths: vec![HTTPIngressPath {
                            path: Some(spec.path_or_default()),
                            path_type: "Prefix".to_string(),
                            backend: IngressBackend {
                                service: Some(IngressServiceBackend {
                                    name: function_name,
                                    port: Some(ServiceBackendPort {
                                        number: Some(service_port(function)),
                                        name: None,
                                    }),
                                }),
                                resource: None,
                            },
                        }],
                    }),
                }]),
                tls,
                ..Default::default()
            }),
            ..Default::default()
        })
    }
}

fn gateway_class(gateway: Gateway) -> &'static str {
    match gateway {
        Gateway::Nginx => "nginx",
        Gateway::Traefik => "traefik",
        Gateway::Kong => "kong",
    }
}

fn basic_auth_annotations(gateway: Gateway, secret: &str) -> Result<BTreeMap<String, String>> {
    let prefix = match gateway {
        Gateway::Nginx => "nginx.ingress.kubernetes.io",
        Gateway::Traefik => "ingress.kubernetes.io",
        Gateway::Kong => {
            return Err(Error::invalid_spec(
                "basic-auth-secret is not supported with the kong gateway",
            ))
        }
    };
    Ok(BTreeMap::from([
        (format!("{}/auth-type", prefix), "basic".to_string()),
        (format!("{}/auth-secret", prefix), secret.to_string()),
        (
            format!("{}/auth-realm", prefix),
            "Authentication Required".to_string(),
        ),
    ]))
}

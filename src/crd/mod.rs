//! Custom Resource Definitions served and consumed by the controller

mod cronjob_trigger;
mod function;
mod http_trigger;
mod service_monitor;

pub use cronjob_trigger::*;
pub use function::*;
pub use http_trigger::*;
pub use service_monitor::*;

use kube::CustomResourceExt;
use schemars::gen::SchemaGenerator;
use schemars::schema::Schema;

/// API group shared by the Function and trigger resources
pub const API_GROUP: &str = "kubeless.io";

/// Generate all CRD YAML manifests owned by this controller
pub fn generate_crds() -> Result<Vec<String>, serde_yaml::Error> {
    Ok(vec![
        serde_yaml::to_string(&Function::crd())?,
        serde_yaml::to_string(&CronJobTrigger::crd())?,
        serde_yaml::to_string(&HttpTrigger::crd())?,
    ])
}

/// Schema for embedded Kubernetes objects whose shape is validated by the API
/// server of the kind they describe, not by the CRD.
pub(crate) fn preserve_unknown_fields(_: &mut SchemaGenerator) -> Schema {
    serde_json::from_value(serde_json::json!({
        "type": "object",
        "x-kubernetes-preserve-unknown-fields": true
    }))
    .unwrap_or(Schema::Bool(true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::Resource;

    #[test]
    fn http_trigger_keeps_its_kubeless_kind() {
        assert_eq!(HttpTrigger::kind(&()), "HTTPTrigger");
        assert_eq!(HttpTrigger::group(&()), API_GROUP);
        let crd = HttpTrigger::crd();
        assert_eq!(crd.spec.names.kind, "HTTPTrigger");
        assert_eq!(crd.spec.names.plural, "httptriggers");
    }

    #[test]
    fn every_crd_renders() {
        let crds = generate_crds().unwrap();
        assert_eq!(crds.len(), 3);
        assert!(crds[2].contains("kind: HTTPTrigger"));
    }
}

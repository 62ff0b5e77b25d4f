//! Create-or-update and delete with conflict handling
//!
//! `ensure` creates the desired object and falls back to updating the stored
//! one when it already exists. The update starts from the desired object,
//! carries over whatever the API server owns (resourceVersion, uid, status,
//! allocated cluster IPs, ...) and is skipped when the stored object already
//! covers every desired field. A conflicting update always re-reads the
//! stored object before the next attempt.

use std::fmt::Debug;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;
use k8s_openapi::api::batch::v1::CronJob;
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use k8s_openapi::api::networking::v1::Ingress;
use kube::api::DeleteParams;
use kube::{Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::ObjectClient;
use crate::crd::ServiceMonitor;
use crate::error::{Error, Result};
use crate::resources::merge::is_subset;

/// Update attempts before a conflict is handed back to the controller
const MAX_CONFLICT_RETRIES: usize = 3;

/// What `ensure` had to do
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Applied {
    Created,
    Updated,
    Unchanged,
}

/// Objects the controller synthesizes and owns
pub trait Owned:
    Resource<DynamicType = ()> + Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Copy kind-specific server-assigned fields from `stored`
    fn preserve_server_fields(&mut self, _stored: &Self) {}
}

impl Owned for ConfigMap {}

impl Owned for ServiceMonitor {}

impl Owned for Service {
    fn preserve_server_fields(&mut self, stored: &Self) {
        self.status = stored.status.clone();
        let (Some(desired), Some(current)) = (self.spec.as_mut(), stored.spec.as_ref()) else {
            return;
        };
        // clusterIP is immutable once allocated
        if desired.cluster_ip.is_none() {
            desired.cluster_ip = current.cluster_ip.clone();
        }
        if desired.cluster_ips.is_none() {
            desired.cluster_ips = current.cluster_ips.clone();
        }
        if desired.ip_families.is_none() {
            desired.ip_families = current.ip_families.clone();
        }
    }
}

impl Owned for Deployment {
    fn preserve_server_fields(&mut self, stored: &Self) {
        // Replicas left unset belong to whoever scales the Deployment.
        if let (Some(desired), Some(stored)) = (self.spec.as_mut(), stored.spec.as_ref()) {
            if desired.replicas.is_none() {
                desired.replicas = stored.replicas;
            }
        }
        self.status = stored.status.clone();
    }
}

impl Owned for HorizontalPodAutoscaler {
    fn preserve_server_fields(&mut self, stored: &Self) {
        self.status = stored.status.clone();
    }
}

impl Owned for CronJob {
    fn preserve_server_fields(&mut self, stored: &Self) {
        self.status = stored.status.clone();
    }
}

impl Owned for Ingress {
    fn preserve_server_fields(&mut self, stored: &Self) {
        self.status = stored.status.clone();
    }
}

/// Desired object rebased onto the stored one
fn overlay<K: Owned>(desired: &K, stored: &K) -> K {
    let mut updated = desired.clone();
    let meta = updated.meta_mut();
    let current = stored.meta();
    meta.resource_version = current.resource_version.clone();
    meta.uid = current.uid.clone();
    meta.creation_timestamp = current.creation_timestamp.clone();
    meta.generation = current.generation;
    meta.managed_fields = current.managed_fields.clone();
    meta.finalizers = current.finalizers.clone();
    meta.deletion_timestamp = current.deletion_timestamp.clone();

    // Annotations written by other controllers survive the update.
    if let Some(existing) = &current.annotations {
        let mut annotations = existing.clone();
        annotations.extend(meta.annotations.take().unwrap_or_default());
        meta.annotations = Some(annotations);
    }

    updated.preserve_server_fields(stored);
    updated
}

fn up_to_date<K: Owned>(updated: &K, stored: &K) -> Result<bool> {
    Ok(is_subset(
        &serde_json::to_value(updated)?,
        &serde_json::to_value(stored)?,
    ))
}

fn object_key<K: Resource>(obj: &K) -> String {
    format!(
        "{}/{}",
        obj.meta().namespace.as_deref().unwrap_or_default(),
        obj.meta().name.as_deref().unwrap_or_default()
    )
}

/// Make the cluster hold `desired`
pub async fn ensure<K: Owned>(client: &dyn ObjectClient<K>, desired: &K) -> Result<Applied> {
    let kind = K::kind(&());
    let key = object_key(desired);
    let wrap = |e: Error| Error::resource(&*kind, key.as_str(), e);

    match client.create(desired).await {
        Ok(_) => {
            info!(kind = %kind, key = %key, "Created");
            return Ok(Applied::Created);
        }
        Err(e) if e.is_already_exists() => {
            debug!(kind = %kind, key = %key, "Already exists, updating");
        }
        Err(e) => return Err(wrap(e)),
    }

    let namespace = desired.namespace().unwrap_or_default();
    let name = desired.name_any();
    for attempt in 1..=MAX_CONFLICT_RETRIES {
        let stored = client.get(&namespace, &name).await.map_err(wrap)?;
        let updated = overlay(desired, &stored);
        if up_to_date(&updated, &stored).map_err(wrap)? {
            debug!(kind = %kind, key = %key, "Up to date");
            return Ok(Applied::Unchanged);
        }
        match client.replace(&updated).await {
            Ok(_) => {
                info!(kind = %kind, key = %key, "Updated");
                return Ok(Applied::Updated);
            }
            Err(e) if e.is_conflict() => {
                warn!(kind = %kind, key = %key, attempt, "Update conflicted, re-reading");
            }
            Err(e) => return Err(wrap(e)),
        }
    }

    Err(wrap(Error::ConflictRetriesExhausted {
        kind: kind.to_string(),
        name: key.clone(),
    }))
}

/// Make sure `namespace/name` is gone; returns whether a delete was issued
pub async fn ensure_absent<K: Owned>(
    client: &dyn ObjectClient<K>,
    namespace: &str,
    name: &str,
    params: &DeleteParams,
) -> Result<bool> {
    let kind = K::kind(&());
    match client.delete(namespace, name, params).await {
        Ok(()) => {
            info!(kind = %kind, namespace, name, "Deleted");
            Ok(true)
        }
        Err(e) if e.is_not_found() => Ok(false),
        Err(e) => Err(Error::resource(
            &*kind,
            format!("{}/{}", namespace, name),
            e,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::ServiceSpec;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use std::collections::BTreeMap;

    fn service(cluster_ip: Option<&str>, annotations: &[(&str, &str)]) -> Service {
        Service {
            metadata: ObjectMeta {
                name: Some("f1".to_string()),
                namespace: Some("default".to_string()),
                annotations: (!annotations.is_empty()).then(|| {
                    annotations
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect::<BTreeMap<_, _>>()
                }),
                ..Default::default()
            },
            spec: Some(ServiceSpec {
                cluster_ip: cluster_ip.map(str::to_string),
                type_: Some("ClusterIP".to_string()),
                ..Default::default()
            }),
            status: None,
        }
    }

    #[test]
    fn overlay_keeps_server_fields_and_foreign_annotations() {
        let desired = service(None, &[("owner", "controller")]);
        let mut stored = service(Some("10.0.0.12"), &[("owner", "someone"), ("note", "kept")]);
        stored.metadata.resource_version = Some("42".to_string());

        let updated = overlay(&desired, &stored);
        assert_eq!(updated.metadata.resource_version.as_deref(), Some("42"));
        assert_eq!(
            updated.spec.as_ref().and_then(|s| s.cluster_ip.as_deref()),
            Some("10.0.0.12")
        );
        let annotations = updated.metadata.annotations.unwrap();
        assert_eq!(annotations["owner"], "controller");
        assert_eq!(annotations["note"], "kept");
    }

    #[test]
    fn unchanged_object_needs_no_update() {
        let desired = service(None, &[]);
        let mut stored = service(Some("10.0.0.12"), &[]);
        stored.metadata.resource_version = Some("7".to_string());
        assert!(up_to_date(&overlay(&desired, &stored), &stored).unwrap());

        let mut changed = desired.clone();
        changed.spec.as_mut().unwrap().type_ = Some("NodePort".to_string());
        assert!(!up_to_date(&overlay(&changed, &stored), &stored).unwrap());
    }
}

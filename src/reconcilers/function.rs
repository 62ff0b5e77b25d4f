//! Function reconciler
//!
//! Owned objects are applied in dependency order: ConfigMap, Service,
//! Deployment, then the optional autoscaler and its ServiceMonitor. Every
//! attempt re-synthesizes and re-applies the whole set, so a failure part way
//! through is repaired by the next attempt.

use async_trait::async_trait;
use chrono::Utc;
use kube::api::{DeleteParams, PropagationPolicy};
use kube::ResourceExt;
use serde_json::json;
use tracing::{debug, info, instrument};

use super::Managed;
use crate::cluster::{ensure, ensure_absent, Cluster, ObjectClient};
use crate::controllers::Context;
use crate::crd::{Condition, Function, FunctionStatus};
use crate::error::{Error, Result};

/// Finalizer guarding a Function's owned objects
pub const FINALIZER: &str = "kubeless.io/function";

pub const PHASE_READY: &str = "Ready";
pub const PHASE_FAILED: &str = "Failed";

#[async_trait]
impl Managed for Function {
    const FINALIZER: &'static str = FINALIZER;

    fn spec_changed(&self, newer: &Self) -> bool {
        let (old, new) = (&self.spec, &newer.spec);
        old.function != new.function
            || old.handler != new.handler
            || old.function_content_type != new.function_content_type
            || old.deps != new.deps
            || old.timeout != new.timeout
            || old.runtime != new.runtime
            || old.checksum != new.checksum
            || old.resources != new.resources
            || old.deployment != new.deployment
            || old.service != new.service
            || old.horizontal_pod_autoscaler != new.horizontal_pod_autoscaler
    }

    #[instrument(skip(self, ctx), fields(name = %self.name_any(), namespace = self.namespace()))]
    async fn ensure(&self, ctx: &Context) -> Result<()> {
        let cluster = &ctx.cluster;
        let synthesizer = &ctx.synthesizer;
        let namespace = self.namespace().unwrap_or_default();
        let name = self.name_any();

        ensure(cluster.config_maps.as_ref(), &synthesizer.config_map(self)?).await?;
        ensure(cluster.services.as_ref(), &synthesizer.service(self)?).await?;
        ensure(cluster.deployments.as_ref(), &synthesizer.deployment(self)?).await?;

        let monitor = synthesizer.monitor(self)?;
        match synthesizer.autoscaler(self)? {
            Some(autoscaler) => {
                match &monitor {
                    Some(monitor) => {
                        ensure(cluster.monitors.as_ref(), monitor).await?;
                    }
                    None => {
                        ensure_absent(cluster.monitors.as_ref(), &namespace, &name, &DeleteParams::default())
                            .await?;
                    }
                }
                ensure(cluster.autoscalers.as_ref(), &autoscaler).await?;
            }
            None => delete_autoscaling(cluster, &namespace, &name).await?,
        }

        info!("Function resources ensured");
        Ok(())
    }

    #[instrument(skip(self, ctx), fields(name = %self.name_any(), namespace = self.namespace()))]
    async fn cleanup(&self, ctx: &Context) -> Result<()> {
        delete_function_resources(&ctx.cluster, &self.namespace().unwrap_or_default(), &self.name_any())
            .await
    }

    async fn report(&self, ctx: &Context, outcome: &Result<()>) -> Result<()> {
        let Some(status) = desired_status(self, outcome) else {
            return Ok(());
        };
        if self.status.as_ref() == Some(&status) {
            debug!("Status unchanged");
            return Ok(());
        }
        let patch = json!({ "status": status });
        ctx.cluster
            .functions
            .patch_status(&self.namespace().unwrap_or_default(), &self.name_any(), &patch)
            .await?;
        Ok(())
    }
}

/// Status after an ensure; transient failures leave the status alone
pub fn desired_status(function: &Function, outcome: &Result<()>) -> Option<FunctionStatus> {
    let (phase, message, ready) = match outcome {
        Ok(()) => (PHASE_READY, None, "True"),
        Err(e) if e.is_permanent() => (PHASE_FAILED, Some(e.to_string()), "False"),
        Err(_) => return None,
    };

    let previous = function
        .status
        .as_ref()
        .and_then(|s| s.conditions.iter().find(|c| c.type_ == PHASE_READY));
    let last_transition_time = match previous {
        Some(c) if c.status == ready => c.last_transition_time,
        _ => Utc::now(),
    };

    Some(FunctionStatus {
        phase: Some(phase.to_string()),
        message: message.clone(),
        observed_generation: function.metadata.generation,
        conditions: vec![Condition {
            type_: PHASE_READY.to_string(),
            status: ready.to_string(),
            last_transition_time,
            reason: Some(phase.to_string()),
            message,
        }],
    })
}

/// Remove the autoscaler and its ServiceMonitor, if any
async fn delete_autoscaling(cluster: &Cluster, namespace: &str, name: &str) -> Result<()> {
    let params = DeleteParams::default();
    ensure_absent(cluster.monitors.as_ref(), namespace, name, &params).await?;
    ensure_absent(cluster.autoscalers.as_ref(), namespace, name, &params).await?;
    Ok(())
}

/// Delete every object a Function owns
pub async fn delete_function_resources(cluster: &Cluster, namespace: &str, name: &str) -> Result<()> {
    ensure_absent(
        cluster.deployments.as_ref(),
        namespace,
        name,
        &DeleteParams {
            propagation_policy: Some(PropagationPolicy::Background),
            ..Default::default()
        },
    )
    .await?;
    ensure_absent(cluster.services.as_ref(), namespace, name, &DeleteParams::default()).await?;
    ensure_absent(cluster.config_maps.as_ref(), namespace, name, &DeleteParams::default()).await?;
    delete_autoscaling(cluster, namespace, name).await?;
    Ok(())
}

/// Look up the Function a trigger points at
pub(crate) async fn referenced_function(
    cluster: &Cluster,
    namespace: &str,
    name: &str,
) -> Result<Function> {
    cluster
        .functions
        .get(namespace, name)
        .await
        .map_err(|e| Error::resource("Function", format!("{}/{}", namespace, name), e))
}

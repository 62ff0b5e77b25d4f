//! CronJobTrigger reconciler

use async_trait::async_trait;
use kube::api::{DeleteParams, PropagationPolicy};
use kube::ResourceExt;
use tracing::{info, instrument};

use super::function::referenced_function;
use super::{FunctionTrigger, Managed};
use crate::cluster::{ensure, ensure_absent};
use crate::controllers::Context;
use crate::crd::CronJobTrigger;
use crate::error::Result;
use crate::resources::cron_job_name;

pub const FINALIZER: &str = "kubeless.io/cronjobtrigger";

#[async_trait]
impl Managed for CronJobTrigger {
    const FINALIZER: &'static str = FINALIZER;

    fn spec_changed(&self, newer: &Self) -> bool {
        self.spec != newer.spec
    }

    #[instrument(skip(self, ctx), fields(name = %self.name_any(), namespace = self.namespace()))]
    async fn ensure(&self, ctx: &Context) -> Result<()> {
        let namespace = self.namespace().unwrap_or_default();
        let function =
            referenced_function(&ctx.cluster, &namespace, &self.spec.function_name).await?;
        let cron_job = ctx.synthesizer.cron_job(self, &function)?;
        ensure(ctx.cluster.cron_jobs.as_ref(), &cron_job).await?;
        info!(function = %self.spec.function_name, "CronJob ensured");
        Ok(())
    }

    #[instrument(skip(self, ctx), fields(name = %self.name_any(), namespace = self.namespace()))]
    async fn cleanup(&self, ctx: &Context) -> Result<()> {
        ensure_absent(
            ctx.cluster.cron_jobs.as_ref(),
            &self.namespace().unwrap_or_default(),
            &cron_job_name(&self.name_any()),
            &DeleteParams {
                propagation_policy: Some(PropagationPolicy::Background),
                ..Default::default()
            },
        )
        .await?;
        Ok(())
    }
}

impl FunctionTrigger for CronJobTrigger {
    fn function_name(&self) -> &str {
        &self.spec.function_name
    }
}

//! HTTPTrigger reconciler

use async_trait::async_trait;
use kube::api::DeleteParams;
use kube::ResourceExt;
use tracing::{info, instrument};

use super::function::referenced_function;
use super::{FunctionTrigger, Managed};
use crate::cluster::{ensure, ensure_absent};
use crate::controllers::Context;
use crate::crd::HttpTrigger;
use crate::error::Result;

pub const FINALIZER: &str = "kubeless.io/httptrigger";

#[async_trait]
impl Managed for HttpTrigger {
    const FINALIZER: &'static str = FINALIZER;

    fn spec_changed(&self, newer: &Self) -> bool {
        self.spec != newer.spec
    }

    #[instrument(skip(self, ctx), fields(name = %self.name_any(), namespace = self.namespace()))]
    async fn ensure(&self, ctx: &Context) -> Result<()> {
        let namespace = self.namespace().unwrap_or_default();
        let function =
            referenced_function(&ctx.cluster, &namespace, &self.spec.function_name).await?;
        let ingress = ctx.synthesizer.ingress(self, &function)?;
        ensure(ctx.cluster.ingresses.as_ref(), &ingress).await?;
        info!(host = %self.spec.host_name, "Ingress ensured");
        Ok(())
    }

    #[instrument(skip(self, ctx), fields(name = %self.name_any(), namespace = self.namespace()))]
    async fn cleanup(&self, ctx: &Context) -> Result<()> {
        ensure_absent(
            ctx.cluster.ingresses.as_ref(),
            &self.namespace().unwrap_or_default(),
            &self.name_any(),
            &DeleteParams::default(),
        )
        .await?;
        Ok(())
    }
}

impl FunctionTrigger for HttpTrigger {
    fn function_name(&self) -> &str {
        &self.spec.function_name
    }
}

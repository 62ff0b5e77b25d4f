//! Per-kind reconciliation logic
//!
//! The controllers drive every kind through the same finalizer lifecycle; what differs per kind lives behind [`Managed`]:
//! - which finalizer guards it
//! - which spec edits are worth a reconciliation
//! - how owned objects are ensured and cleaned up
//! - what status is reported afterwards

pub mod cronjob_trigger;
pub mod function;
pub mod http_trigger;

use std::fmt::Debug;

use async_trait::async_trait;
use k8s_openapi::NamespaceResourceScope;
use kube::Resource;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::controllers::Context;
use crate::error::Result;

/// A kind whose owned objects this controller manages
#[async_trait]
pub trait Managed:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    /// Finalizer held while owned objects may exist
    const FINALIZER: &'static str;

    /// Whether `newer` differs from `self` in anything the owned objects depend on
    fn spec_changed(&self, newer: &Self) -> bool;

    /// Create or update every owned object
    async fn ensure(&self, ctx: &Context) -> Result<()>;

    /// Delete every owned object; objects already gone count as deleted
    async fn cleanup(&self, ctx: &Context) -> Result<()>;

    /// Record the outcome of `ensure` on the object
    async fn report(&self, _ctx: &Context, _outcome: &Result<()>) -> Result<()> {
        Ok(())
    }
}

/// A kind that invokes a Function by name
pub trait FunctionTrigger: Managed {
    /// Name of the Function, in the trigger's namespace
    fn function_name(&self) -> &str;
}

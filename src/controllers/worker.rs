//! Reconcile and error policy handed to the kube-runtime controller
//!
//! `finalizer()` splits every object's lifecycle into two events:
//! - `Apply`: the object is live. The finalizer is attached first, then the
//!   owned objects are ensured and the outcome reported.
//! - `Cleanup`: deletion was requested while the finalizer is held. Owned
//!   objects are removed, and the finalizer is released only once that
//!   succeeds.
//!
//! Objects already deleted, or deleting without our finalizer, own nothing
//! left to clean and are not touched.

use std::sync::Arc;

use kube::runtime::controller::Action;
use kube::runtime::finalizer::{finalizer, Event as FinalizerEvent};
use kube::{Api, Client, Resource, ResourceExt};
use tracing::{info, instrument, warn};

use super::retry::Retries;
use super::Context;
use crate::error::{Error, Result};
use crate::metrics;
use crate::reconcilers::Managed;

/// State shared by every reconciliation of kind `K`
pub struct Shared<K: Managed> {
    pub client: Client,
    pub context: Arc<Context>,
    pub retries: Retries<K>,
}

impl<K: Managed> Shared<K> {
    pub fn new(client: Client, context: Arc<Context>, max_retries: u32) -> Self {
        Self {
            client,
            context,
            retries: Retries::new(max_retries),
        }
    }
}

/// Bring the cluster in line with one cached object
#[instrument(skip(obj, shared), fields(kind = %K::kind(&()), name = %obj.name_any(), namespace = obj.namespace()))]
pub async fn reconcile<K: Managed>(obj: Arc<K>, shared: Arc<Shared<K>>) -> Result<Action> {
    let kind = K::kind(&());
    let _timer = metrics::RECONCILE_DURATION
        .with_label_values(&[&*kind])
        .start_timer();
    metrics::RECONCILIATIONS.with_label_values(&[&*kind]).inc();

    let namespace = obj.namespace().unwrap_or_default();
    let api: Api<K> = Api::namespaced(shared.client.clone(), &namespace);
    let context = shared.context.clone();

    let action = finalizer(&api, K::FINALIZER, obj.clone(), |event| async move {
        on_event(event, &context).await
    })
    .await
    .map_err(|e| Error::Finalizer(Box::new(e)))?;

    shared.retries.succeeded(obj.as_ref());
    Ok(action)
}

/// Handle one finalizer event for an object already holding our finalizer
pub async fn on_event<K: Managed>(event: FinalizerEvent<K>, ctx: &Context) -> Result<Action> {
    match event {
        FinalizerEvent::Apply(obj) => {
            let outcome = obj.ensure(ctx).await;
            if let Err(e) = obj.report(ctx, &outcome).await {
                warn!(error = %e, "Unable to record status");
            }
            outcome.map(|()| Action::await_change())
        }
        FinalizerEvent::Cleanup(obj) => {
            obj.cleanup(ctx).await?;
            metrics::CLEANUPS.with_label_values(&[&*K::kind(&())]).inc();
            info!("Owned resources removed, releasing finalizer");
            Ok(Action::await_change())
        }
    }
}

/// Requeue with backoff, or give up until the next change
pub fn error_policy<K: Managed>(obj: Arc<K>, error: &Error, shared: Arc<Shared<K>>) -> Action {
    shared.retries.failed(obj.as_ref(), error)
}

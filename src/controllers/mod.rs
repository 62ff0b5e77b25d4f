//! Controllers for the Function and trigger resources
//!
//! Each kind runs the same pipeline: a change feed fills the local cache and
//! emits events, the change filter keeps the ones worth reconciling, and a
//! kube-runtime [`Controller`] reconciles them with per-object exclusivity,
//! bounded concurrency and backoff. Trigger controllers also follow their
//! Functions, since the objects they own are derived from them.

pub mod events;
pub mod feed;
pub mod retry;
pub mod worker;

use std::sync::Arc;

use futures::{future, Stream, StreamExt, TryStreamExt};
use kube::runtime::controller::{self, Controller};
use kube::runtime::reflector::Store;
use kube::runtime::watcher::{self, watcher};
use kube::runtime::{predicates, WatchStreamExt};
use kube::{Api, Client};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cluster::Cluster;
use crate::config::Config;
use crate::crd::{CronJobTrigger, Function, HttpTrigger};
use crate::metrics;
use crate::reconcilers::{FunctionTrigger, Managed};
use crate::resources::Synthesizer;

use feed::Feed;
use worker::Shared;

/// Shared state handed to every reconciliation
pub struct Context {
    /// Cluster API clients
    pub cluster: Cluster,

    /// Desired-state synthesizer
    pub synthesizer: Synthesizer,
}

impl Context {
    pub fn new(cluster: Cluster, synthesizer: Synthesizer) -> Self {
        Self {
            cluster,
            synthesizer,
        }
    }
}

/// Filtered objects of kind `K` to reconcile, and the cache they are read from
fn changes<K: Managed>(
    client: &Client,
    config: &Config,
) -> (impl Stream<Item = Result<K, watcher::Error>> + Send + 'static, Store<K>) {
    let feed = Feed::<K>::default();
    let store = feed.store();
    let watch = watcher(Api::<K>::all(client.clone()), watcher::Config::default())
        .default_backoff()
        .boxed();
    let objects = feed
        .events(watch, config.resync_period())
        .try_filter_map(|event| {
            future::ready(Ok(event.reconcile_target().map(|obj| obj.as_ref().clone())))
        });
    (objects, store)
}

/// Functions whose spec changed, for the trigger controllers to follow
fn function_changes(
    client: &Client,
) -> impl Stream<Item = Result<Function, watcher::Error>> + Send + 'static {
    watcher(Api::<Function>::all(client.clone()), watcher::Config::default())
        .default_backoff()
        .touched_objects()
        .predicate_filter(predicates::generation)
}

/// Run the controller for kind `K` until `cancel` fires and in-flight work drains
///
/// `related` may add further triggers to the controller; it receives the
/// cache of `K` to map related objects back to keys.
async fn run<K, F>(
    client: Client,
    context: Arc<Context>,
    config: Config,
    cancel: CancellationToken,
    related: F,
) where
    K: Managed,
    F: FnOnce(Controller<K>, Store<K>) -> Controller<K>,
{
    let kind = K::kind(&()).to_string();
    metrics::set_cache_synced(&kind, false);

    let (objects, store) = changes::<K>(&client, &config);
    tokio::spawn({
        let store = store.clone();
        let kind = kind.clone();
        async move {
            if store.wait_until_ready().await.is_ok() {
                metrics::set_cache_synced(&kind, true);
            }
        }
    });

    let shared = Arc::new(Shared::new(client, context, config.max_retries));
    let base = Controller::for_stream(objects, store.clone())
        .with_config(controller::Config::default().concurrency(config.workers.max(1)));

    info!(kind = %kind, workers = config.workers, "Starting controller");
    related(base, store)
        .graceful_shutdown_on(async move { cancel.cancelled().await })
        .run(worker::reconcile, worker::error_policy, shared)
        .for_each(|result| {
            let kind = kind.clone();
            async move {
                match result {
                    Ok((obj, _action)) => {
                        info!(
                            kind = %kind,
                            name = %obj.name,
                            namespace = obj.namespace.as_deref().unwrap_or_default(),
                            "Reconciled"
                        );
                    }
                    Err(controller::Error::ReconcilerFailed(e, obj)) => {
                        debug!(kind = %kind, name = %obj.name, error = %e, "Reconcile failed");
                    }
                    Err(controller::Error::ObjectNotFound(obj)) => {
                        debug!(kind = %kind, name = %obj.name, "Object left the cache before reconciling");
                    }
                    Err(e) => warn!(kind = %kind, error = %e, "Controller error"),
                }
            }
        })
        .await;
    info!(kind = %kind, "Controller stopped");
}

/// Reconcile triggers of kind `K` again whenever their Function changes
fn follow_functions<K: FunctionTrigger>(
    client: &Client,
) -> impl FnOnce(Controller<K>, Store<K>) -> Controller<K> {
    let functions = function_changes(client);
    move |base, store| {
        base.watches_stream(functions, move |function| events::triggers_of(&store, &function))
    }
}

pub async fn run_function_controller(
    client: Client,
    context: Arc<Context>,
    config: Config,
    cancel: CancellationToken,
) {
    run::<Function, _>(client, context, config, cancel, |base, _| base).await
}

pub async fn run_cronjob_trigger_controller(
    client: Client,
    context: Arc<Context>,
    config: Config,
    cancel: CancellationToken,
) {
    let related = follow_functions::<CronJobTrigger>(&client);
    run(client, context, config, cancel, related).await
}

pub async fn run_http_trigger_controller(
    client: Client,
    context: Arc<Context>,
    config: Config,
    cancel: CancellationToken,
) {
    let related = follow_functions::<HttpTrigger>(&client);
    run(client, context, config, cancel, related).await
}

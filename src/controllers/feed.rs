//! Change feed: watch stream to local cache and tagged events
//!
//! The feed is the only writer of the reflector store. Every event is yielded
//! after the store reflects it, so a reconciliation reading the store always
//! sees at least the state the event describes. Events produced during a re-list are
//! held back until the re-list completes, and keys that disappeared across
//! it are reported as deleted.

use std::collections::HashSet;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use futures::{future, stream, Stream, StreamExt};
use kube::runtime::reflector::store::Writer;
use kube::runtime::reflector::{ObjectRef, Store};
use kube::runtime::watcher::{self, Event};
use kube::Resource;
use serde::de::DeserializeOwned;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::events::{ObjectKey, ResourceEvent};

/// Translates watcher events for one kind into [`ResourceEvent`]s
pub struct Feed<K>
where
    K: Resource<DynamicType = ()> + Clone + 'static,
{
    writer: Writer<K>,
    relisted: Option<HashSet<ObjectRef<K>>>,
    held: Vec<ResourceEvent<K>>,
}

impl<K> Default for Feed<K>
where
    K: Resource<DynamicType = ()> + Clone + 'static,
{
    fn default() -> Self {
        Self {
            writer: Writer::default(),
            relisted: None,
            held: Vec::new(),
        }
    }
}

impl<K> Feed<K>
where
    K: Resource<DynamicType = ()> + Clone + Debug + DeserializeOwned + Send + Sync + 'static,
{
    /// Read handle on the cache this feed maintains
    pub fn store(&self) -> Store<K> {
        self.writer.as_reader()
    }

    /// Apply one watcher event to the cache and return what to emit
    pub fn handle(&mut self, event: Event<K>) -> Vec<ResourceEvent<K>> {
        let reader = self.writer.as_reader();
        match &event {
            Event::Apply(obj) => {
                let emitted = Self::applied(&reader, obj);
                self.writer.apply_watcher_event(&event);
                vec![emitted]
            }
            Event::Delete(obj) => {
                self.writer.apply_watcher_event(&event);
                vec![ResourceEvent::Deleted(ObjectKey::of(obj))]
            }
            Event::Init => {
                debug!("Re-list started");
                self.relisted = Some(HashSet::new());
                self.held.clear();
                self.writer.apply_watcher_event(&event);
                Vec::new()
            }
            Event::InitApply(obj) => {
                self.held.push(Self::applied(&reader, obj));
                if let Some(seen) = self.relisted.as_mut() {
                    seen.insert(ObjectRef::from_obj(obj));
                }
                self.writer.apply_watcher_event(&event);
                Vec::new()
            }
            Event::InitDone => {
                let before = reader.state();
                self.writer.apply_watcher_event(&event);
                let seen = self.relisted.take().unwrap_or_default();
                let mut emitted = std::mem::take(&mut self.held);
                emitted.extend(
                    before
                        .iter()
                        .filter(|obj| !seen.contains(&ObjectRef::from_obj(obj.as_ref())))
                        .map(|obj| ResourceEvent::Deleted(ObjectKey::of(obj.as_ref()))),
                );
                debug!(objects = seen.len(), "Re-list finished");
                emitted
            }
        }
    }

    fn applied(reader: &Store<K>, obj: &K) -> ResourceEvent<K> {
        let new = Arc::new(obj.clone());
        match reader.get(&ObjectRef::from_obj(obj)) {
            Some(old) => ResourceEvent::Updated(old, new),
            None => ResourceEvent::Added(new),
        }
    }

    /// Every cached object as a no-change update
    pub fn resync(&self) -> Vec<ResourceEvent<K>> {
        self.writer
            .as_reader()
            .state()
            .into_iter()
            .map(|obj| ResourceEvent::Updated(obj.clone(), obj))
            .collect()
    }

    /// Drive this feed from a watch stream, merging in periodic resyncs
    ///
    /// Every yielded event is already reflected in the store. Watch errors
    /// are passed through for the consumer to back off on.
    pub fn events<S>(
        self,
        watch: S,
        resync_period: Option<Duration>,
    ) -> impl Stream<Item = Result<ResourceEvent<K>, watcher::Error>> + Send + 'static
    where
        S: Stream<Item = Result<Event<K>, watcher::Error>> + Send + Unpin + 'static,
    {
        let kind = K::kind(&()).to_string();
        let resync = resync_period.map(|period| {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });

        info!(kind = %kind, "Change feed started");
        stream::unfold(
            (self, watch, resync),
            move |(mut feed, mut watch, mut resync)| {
                let kind = kind.clone();
                async move {
                    let emitted: Vec<Result<ResourceEvent<K>, watcher::Error>> = tokio::select! {
                        _ = tick(&mut resync) => feed.resync().into_iter().map(Ok).collect(),
                        item = watch.next() => match item {
                            Some(Ok(event)) => feed.handle(event).into_iter().map(Ok).collect(),
                            Some(Err(e)) => {
                                warn!(kind = %kind, error = %e, "Watch failed, backing off");
                                vec![Err(e)]
                            }
                            None => {
                                info!(kind = %kind, "Change feed stopped");
                                return None;
                            }
                        },
                    };
                    Some((stream::iter(emitted), (feed, watch, resync)))
                }
            },
        )
        .flatten()
    }
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => future::pending::<()>().await,
    }
}

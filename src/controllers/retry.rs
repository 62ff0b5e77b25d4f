//! Retry ceiling for failed reconciliations
//!
//! The kube-runtime controller requeues whatever `error_policy` asks for but
//! keeps no history per object. [`Retries`] counts consecutive failures per
//! object so a key that keeps failing is reported once and left alone until
//! its next change event.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use kube::runtime::controller::Action;
use kube::runtime::reflector::ObjectRef;
use kube::Resource;
use tracing::{error, warn};

use super::events::ObjectKey;
use crate::error::Error;
use crate::metrics;

/// Delay before the first retry; doubles with every further failure
pub const BASE_DELAY: Duration = Duration::from_millis(5);

/// Upper bound on the delay between retries
pub const MAX_DELAY: Duration = Duration::from_secs(1000);

/// Backoff after `failures` earlier consecutive failures
pub fn requeue_delay(failures: u32) -> Duration {
    let factor = 2u32.checked_pow(failures).unwrap_or(u32::MAX);
    BASE_DELAY.saturating_mul(factor).min(MAX_DELAY)
}

/// Consecutive failure counts per object of kind `K`
pub struct Retries<K: Resource<DynamicType = ()>> {
    failures: Mutex<HashMap<ObjectRef<K>, u32>>,
    max_retries: u32,
}

impl<K: Resource<DynamicType = ()>> Retries<K> {
    pub fn new(max_retries: u32) -> Self {
        Self {
            failures: Mutex::new(HashMap::new()),
            max_retries,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ObjectRef<K>, u32>> {
        self.failures
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Failures recorded for `obj` since its last success
    pub fn count(&self, obj: &K) -> u32 {
        self.lock()
            .get(&ObjectRef::from_obj(obj))
            .copied()
            .unwrap_or(0)
    }

    /// Forget the failure history of `obj`
    pub fn succeeded(&self, obj: &K) {
        self.lock().remove(&ObjectRef::from_obj(obj));
    }

    /// Decide what happens to `obj` after `error`
    ///
    /// Transient errors are requeued with exponential backoff until
    /// `max_retries` retries have failed. Permanent errors and exhausted
    /// retries are reported and the object waits for its next change.
    pub fn failed(&self, obj: &K, error: &Error) -> Action {
        let kind = K::kind(&());
        metrics::RECONCILIATION_ERRORS
            .with_label_values(&[&*kind])
            .inc();

        let key = ObjectKey::of(obj);
        let obj_ref = ObjectRef::from_obj(obj);
        let mut failures = self.lock();
        let retries = failures.get(&obj_ref).copied().unwrap_or(0);
        if !error.is_permanent() && retries < self.max_retries {
            failures.insert(obj_ref, retries + 1);
            let delay = requeue_delay(retries);
            warn!(kind = %kind, key = %key, error = %error, retries, ?delay, "Reconciliation failed, will retry");
            return Action::requeue(delay);
        }

        failures.remove(&obj_ref);
        drop(failures);
        report_dropped(&kind, &key, error);
        Action::await_change()
    }
}

/// Process-wide sink for errors the controller gives up on
fn report_dropped(kind: &str, key: &ObjectKey, error: &Error) {
    metrics::DROPPED_KEYS.with_label_values(&[kind]).inc();
    error!(kind, key = %key, error = %error, "Giving up until the object changes");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{Function, FunctionSpec};

    fn function() -> Function {
        let mut f = Function::new("f1", FunctionSpec::default());
        f.metadata.namespace = Some("default".to_string());
        f
    }

    #[test]
    fn delays_double_up_to_the_cap() {
        assert_eq!(requeue_delay(0), Duration::from_millis(5));
        assert_eq!(requeue_delay(1), Duration::from_millis(10));
        assert_eq!(requeue_delay(4), Duration::from_millis(80));
        assert_eq!(requeue_delay(30), MAX_DELAY);
        assert_eq!(requeue_delay(u32::MAX), MAX_DELAY);
    }

    #[test]
    fn transient_errors_retry_until_the_ceiling() {
        let retries = Retries::new(2);
        let f = function();
        let transient = Error::config("api unavailable");

        assert_eq!(retries.failed(&f, &transient), Action::requeue(requeue_delay(0)));
        assert_eq!(retries.count(&f), 1);
        assert_eq!(retries.failed(&f, &transient), Action::requeue(requeue_delay(1)));
        assert_eq!(retries.count(&f), 2);
        assert_eq!(retries.failed(&f, &transient), Action::await_change());
        assert_eq!(retries.count(&f), 0);
    }

    #[test]
    fn permanent_errors_are_dropped_at_once() {
        let retries = Retries::new(5);
        let f = function();
        let permanent = Error::UnknownRuntime("cobol".to_string());
        assert_eq!(retries.failed(&f, &permanent), Action::await_change());
        assert_eq!(retries.count(&f), 0);
    }

    #[test]
    fn success_resets_the_count() {
        let retries = Retries::new(5);
        let f = function();
        retries.failed(&f, &Error::config("api unavailable"));
        retries.failed(&f, &Error::config("api unavailable"));
        retries.succeeded(&f);
        assert_eq!(retries.count(&f), 0);
        assert_eq!(
            retries.failed(&f, &Error::config("api unavailable")),
            Action::requeue(requeue_delay(0))
        );
    }
}

//! Change events and the filter deciding which ones need reconciling
//!
//! Also maps Function changes onto the triggers that reference them, so a
//! trigger's owned objects follow edits to its function.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use kube::runtime::reflector::{ObjectRef, Store};
use kube::{Resource, ResourceExt};

use crate::crd::Function;
use crate::error::{Error, Result};
use crate::reconcilers::{FunctionTrigger, Managed};

/// Stable `namespace/name` address of an object
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn of<K: Resource>(obj: &K) -> Self {
        Self::new(obj.namespace().unwrap_or_default(), obj.name_any())
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

impl FromStr for ObjectKey {
    type Err = Error;

    fn from_str(key: &str) -> Result<Self> {
        match key.split_once('/') {
            Some((namespace, name))
                if !namespace.is_empty() && !name.is_empty() && !name.contains('/') =>
            {
                Ok(Self::new(namespace, name))
            }
            _ => Err(Error::InvalidKey(key.to_string())),
        }
    }
}

/// Change notification for one object
#[derive(Clone, Debug)]
pub enum ResourceEvent<K> {
    Added(Arc<K>),
    Updated(Arc<K>, Arc<K>),
    /// Carries only the key; the object may already be gone from the cache
    Deleted(ObjectKey),
}

impl<K: Managed> ResourceEvent<K> {
    /// Object to hand to the controller, or `None` when the event changes
    /// nothing that matters
    ///
    /// Deletions yield nothing: an object still holding our finalizer is
    /// cleaned up from the update that set its deletion timestamp, and one
    /// without it owns nothing left to clean.
    pub fn reconcile_target(&self) -> Option<&Arc<K>> {
        match self {
            ResourceEvent::Added(obj) => Some(obj),
            ResourceEvent::Updated(old, new) => {
                needs_reconcile(old.as_ref(), new.as_ref()).then_some(new)
            }
            ResourceEvent::Deleted(_) => None,
        }
    }
}

/// Whether an update is worth a reconciliation
pub fn needs_reconcile<K: Managed>(old: &K, new: &K) -> bool {
    if old.meta().deletion_timestamp != new.meta().deletion_timestamp {
        return true;
    }
    if old.finalizers() != new.finalizers() {
        return true;
    }
    if old.resource_version() == new.resource_version() {
        return false;
    }
    old.spec_changed(new)
}

/// Cached triggers that invoke `function`
pub fn triggers_of<K: FunctionTrigger>(store: &Store<K>, function: &Function) -> Vec<ObjectRef<K>> {
    let namespace = function.namespace();
    let name = function.name_any();
    store
        .state()
        .iter()
        .filter(|trigger| trigger.namespace() == namespace && trigger.function_name() == name)
        .map(|trigger| ObjectRef::from_obj(trigger.as_ref()))
        .collect()
}

//! Typed, namespaced access to one object kind

use std::fmt::Debug;
use std::marker::PhantomData;

use async_trait::async_trait;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{DeleteParams, Patch, PatchParams, PostParams};
use kube::{Api, Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{Error, Result};

/// Field manager recorded on every write
pub const FIELD_MANAGER: &str = "function-controller";

/// Cluster API operations the reconcilers need for one kind
///
/// The controller talks to the cluster only through this trait so the
/// reconcilers can be driven against an in-memory cluster in tests.
#[async_trait]
pub trait ObjectClient<K>: Send + Sync {
    /// Fetch the stored object
    async fn get(&self, namespace: &str, name: &str) -> Result<K>;

    /// Create `obj` in its own namespace
    async fn create(&self, obj: &K) -> Result<K>;

    /// Replace the stored object, guarded by `obj`'s resourceVersion
    async fn replace(&self, obj: &K) -> Result<K>;

    async fn delete(&self, namespace: &str, name: &str, params: &DeleteParams) -> Result<()>;

    /// JSON merge patch of the status subresource
    async fn patch_status(&self, namespace: &str, name: &str, patch: &Value) -> Result<K>;
}

/// [`ObjectClient`] backed by the Kubernetes API server
pub struct KubeObjectClient<K> {
    client: Client,
    _kind: PhantomData<fn() -> K>,
}

impl<K> KubeObjectClient<K> {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            _kind: PhantomData,
        }
    }
}

impl<K> KubeObjectClient<K>
where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope>,
{
    fn api(&self, namespace: &str) -> Api<K> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn namespace_and_name<K: Resource>(obj: &K) -> Result<(String, String)> {
    let name = obj.name_any();
    let namespace = obj
        .namespace()
        .ok_or_else(|| Error::invalid_spec(format!("{} has no namespace", name)))?;
    Ok((namespace, name))
}

#[async_trait]
impl<K> ObjectClient<K> for KubeObjectClient<K>
where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static,
{
    async fn get(&self, namespace: &str, name: &str) -> Result<K> {
        Ok(self.api(namespace).get(name).await?)
    }

    async fn create(&self, obj: &K) -> Result<K> {
        let (namespace, _) = namespace_and_name(obj)?;
        let params = PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        };
        Ok(self.api(&namespace).create(&params, obj).await?)
    }

    async fn replace(&self, obj: &K) -> Result<K> {
        let (namespace, name) = namespace_and_name(obj)?;
        let params = PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        };
        Ok(self.api(&namespace).replace(&name, &params, obj).await?)
    }

    async fn delete(&self, namespace: &str, name: &str, params: &DeleteParams) -> Result<()> {
        self.api(namespace).delete(name, params).await?;
        Ok(())
    }

    async fn patch_status(&self, namespace: &str, name: &str, patch: &Value) -> Result<K> {
        Ok(self
            .api(namespace)
            .patch_status(name, &PatchParams::default(), &Patch::Merge(patch))
            .await?)
    }
}

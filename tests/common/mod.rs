//! In-memory cluster used by the integration tests

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;
use k8s_openapi::api::batch::v1::CronJob;
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::DeleteParams;
use kube::core::ErrorResponse;
use kube::{Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use function_controller::cluster::{Cluster, ObjectClient};
use function_controller::config::ClusterDefaults;
use function_controller::controllers::Context;
use function_controller::crd::{Function, FunctionSpec, ServiceMonitor};
use function_controller::resources::merge::merge_values;
use function_controller::resources::Synthesizer;
use function_controller::runtimes::RuntimeRegistry;
use function_controller::{Error, Result};

pub const NAMESPACE: &str = "default";

pub const RUNTIMES: &str = r#"
- ID: python
  depName: requirements.txt
  fileNameSuffix: .py
  installCommand: pip install --prefix=$KUBELESS_INSTALL_VOLUME -r $KUBELESS_DEPS_FILE
  versions:
    - name: python27
      version: "2.7"
      runtimeImage: kubeless/python:2.7
      initImage: python:2.7
      env:
        PYTHONPATH: /kubeless/lib/python2.7/site-packages
      imagePullSecrets: [p1]
- ID: nodejs
  depName: package.json
  fileNameSuffix: .js
  installCommand: npm install --prefix=$KUBELESS_INSTALL_VOLUME
  versions:
    - name: node8
      version: "8"
      runtimeImage: kubeless/nodejs:8
"#;

pub fn api_error(code: u16, reason: &str) -> Error {
    Error::Kube(kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message: format!("injected {}", reason),
        reason: reason.to_string(),
        code,
    }))
}

pub fn synthesizer() -> Synthesizer {
    synthesizer_with(ClusterDefaults::default())
}

pub fn synthesizer_with(defaults: ClusterDefaults) -> Synthesizer {
    let runtimes = RuntimeRegistry::from_yaml(RUNTIMES).expect("test runtimes parse");
    Synthesizer::new(Arc::new(runtimes), Arc::new(defaults))
}

/// A Function as the cluster would hand it out: namespaced, with a uid
pub fn function(name: &str, spec: FunctionSpec) -> Function {
    let mut f = Function::new(name, spec);
    f.metadata = ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(NAMESPACE.to_string()),
        uid: Some(format!("uid-{}", name)),
        generation: Some(1),
        labels: Some([("team".to_string(), "faas".to_string())].into()),
        ..Default::default()
    };
    f
}

pub fn python_function(name: &str) -> Function {
    function(
        name,
        FunctionSpec {
            runtime: "python2.7".to_string(),
            handler: "foo.bar".to_string(),
            function: "function".to_string(),
            deps: "deps".to_string(),
            ..Default::default()
        },
    )
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Op {
    Get,
    Create,
    Replace,
    Delete,
    PatchStatus,
}

/// Stored objects of one kind plus a count of successful writes
pub struct FakeObjects<K> {
    objects: Mutex<BTreeMap<(String, String), K>>,
    failures: Mutex<Vec<(Op, Error)>>,
    mutations: AtomicUsize,
    version: AtomicU64,
}

impl<K> Default for FakeObjects<K> {
    fn default() -> Self {
        Self {
            objects: Mutex::new(BTreeMap::new()),
            failures: Mutex::new(Vec::new()),
            mutations: AtomicUsize::new(0),
            version: AtomicU64::new(0),
        }
    }
}

impl<K> FakeObjects<K>
where
    K: Resource + Clone + Serialize + DeserializeOwned + Send + Sync,
{
    /// Seed an object without counting it as a mutation
    pub fn insert(&self, mut obj: K) -> K {
        let version = self.next_version();
        obj.meta_mut().resource_version = Some(version);
        let key = (obj.namespace().unwrap_or_default(), obj.name_any());
        self.objects.lock().unwrap().insert(key, obj.clone());
        obj
    }

    pub fn stored(&self, name: &str) -> Option<K> {
        self.objects
            .lock()
            .unwrap()
            .get(&(NAMESPACE.to_string(), name.to_string()))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn mutations(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    /// Make the next `op` fail with `error`
    pub fn fail_next(&self, op: Op, error: Error) {
        self.failures.lock().unwrap().push((op, error));
    }

    fn injected(&self, op: Op) -> Result<()> {
        let mut failures = self.failures.lock().unwrap();
        match failures.iter().position(|(o, _)| *o == op) {
            Some(index) => Err(failures.remove(index).1),
            None => Ok(()),
        }
    }

    fn next_version(&self) -> String {
        (self.version.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }

    fn mutated(&self) {
        self.mutations.fetch_add(1, Ordering::SeqCst);
    }

    fn merge_patch(&self, namespace: &str, name: &str, patch: &Value) -> Result<K> {
        let key = (namespace.to_string(), name.to_string());
        let mut objects = self.objects.lock().unwrap();
        let stored = objects.get(&key).ok_or_else(|| api_error(404, "NotFound"))?;

        let expected = patch.pointer("/metadata/resourceVersion").and_then(Value::as_str);
        if expected.is_some() && expected != stored.meta().resource_version.as_deref() {
            return Err(api_error(409, "Conflict"));
        }

        let mut value = serde_json::to_value(stored)?;
        merge_values(&mut value, patch);
        let mut updated: K = serde_json::from_value(value)?;
        updated.meta_mut().resource_version = Some(self.next_version());

        objects.insert(key, updated.clone());
        self.mutated();
        Ok(updated)
    }
}

#[async_trait]
impl<K> ObjectClient<K> for FakeObjects<K>
where
    K: Resource + Clone + Serialize + DeserializeOwned + Send + Sync,
{
    async fn get(&self, namespace: &str, name: &str) -> Result<K> {
        self.injected(Op::Get)?;
        self.objects
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| api_error(404, "NotFound"))
    }

    async fn create(&self, obj: &K) -> Result<K> {
        self.injected(Op::Create)?;
        let key = (obj.namespace().unwrap_or_default(), obj.name_any());
        let mut objects = self.objects.lock().unwrap();
        if objects.contains_key(&key) {
            return Err(api_error(409, "AlreadyExists"));
        }
        let mut created = obj.clone();
        created.meta_mut().resource_version = Some(self.next_version());
        created.meta_mut().uid = Some(format!("uid-{}", key.1));
        objects.insert(key, created.clone());
        self.mutated();
        Ok(created)
    }

    async fn replace(&self, obj: &K) -> Result<K> {
        self.injected(Op::Replace)?;
        let key = (obj.namespace().unwrap_or_default(), obj.name_any());
        let mut objects = self.objects.lock().unwrap();
        let stored = objects.get(&key).ok_or_else(|| api_error(404, "NotFound"))?;
        if obj.meta().resource_version != stored.meta().resource_version {
            return Err(api_error(409, "Conflict"));
        }
        let mut replaced = obj.clone();
        replaced.meta_mut().resource_version = Some(self.next_version());
        objects.insert(key, replaced.clone());
        self.mutated();
        Ok(replaced)
    }

    async fn delete(&self, namespace: &str, name: &str, _params: &DeleteParams) -> Result<()> {
        self.injected(Op::Delete)?;
        let key = (namespace.to_string(), name.to_string());
        match self.objects.lock().unwrap().remove(&key) {
            Some(_) => {
                self.mutated();
                Ok(())
            }
            None => Err(api_error(404, "NotFound")),
        }
    }

    async fn patch_status(&self, namespace: &str, name: &str, patch: &Value) -> Result<K> {
        self.injected(Op::PatchStatus)?;
        self.merge_patch(namespace, name, patch)
    }
}

/// Fakes for every kind, kept around so tests can inspect them
#[derive(Clone, Default)]
pub struct FakeCluster {
    pub config_maps: Arc<FakeObjects<ConfigMap>>,
    pub services: Arc<FakeObjects<Service>>,
    pub deployments: Arc<FakeObjects<Deployment>>,
    pub autoscalers: Arc<FakeObjects<HorizontalPodAutoscaler>>,
    pub monitors: Arc<FakeObjects<ServiceMonitor>>,
    pub cron_jobs: Arc<FakeObjects<CronJob>>,
    pub ingresses: Arc<FakeObjects<Ingress>>,
    pub functions: Arc<FakeObjects<Function>>,
}

impl FakeCluster {
    pub fn cluster(&self) -> Cluster {
        Cluster {
            config_maps: self.config_maps.clone(),
            services: self.services.clone(),
            deployments: self.deployments.clone(),
            autoscalers: self.autoscalers.clone(),
            monitors: self.monitors.clone(),
            cron_jobs: self.cron_jobs.clone(),
            ingresses: self.ingresses.clone(),
            functions: self.functions.clone(),
        }
    }

    pub fn context(&self) -> Context {
        Context::new(self.cluster(), synthesizer())
    }

    /// Writes to objects owned by Functions and triggers
    pub fn owned_mutations(&self) -> usize {
        self.config_maps.mutations()
            + self.services.mutations()
            + self.deployments.mutations()
            + self.autoscalers.mutations()
            + self.monitors.mutations()
            + self.cron_jobs.mutations()
            + self.ingresses.mutations()
    }

    /// Objects owned by the Function `name` still stored
    pub fn owned_by_function(&self, name: &str) -> usize {
        [
            self.config_maps.stored(name).is_some(),
            self.services.stored(name).is_some(),
            self.deployments.stored(name).is_some(),
            self.autoscalers.stored(name).is_some(),
            self.monitors.stored(name).is_some(),
        ]
        .iter()
        .filter(|present| **present)
        .count()
    }
}

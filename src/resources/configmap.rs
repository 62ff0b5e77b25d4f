//! Function code ConfigMap

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ConfigMap;
use kube::ResourceExt;

use super::{function_labels, owned_meta, Synthesizer};
use crate::crd::{Function, FunctionSpec};
use crate::error::Result;

impl Synthesizer {
    /// ConfigMap carrying the handler, the source and the dependency manifest
    pub fn config_map(&self, function: &Function) -> Result<ConfigMap> {
        let spec = &function.spec;
        let mut data = BTreeMap::new();
        data.insert("handler".to_string(), spec.handler.clone());
        data.insert(self.source_file_name(spec), spec.function.clone());

        // Unknown runtimes have no manifest name; the entry is dropped rather
        // than failing the whole Function.
        if !spec.deps.is_empty() {
            if let Ok(runtime) = self.runtimes.resolve(&spec.runtime) {
                if !runtime.dep_name.is_empty() {
                    data.insert(runtime.dep_name.clone(), spec.deps.clone());
                }
            }
        }

        Ok(ConfigMap {
            metadata: owned_meta(function, function.name_any(), function_labels(function))?,
            data: Some(data),
            ..Default::default()
        })
    }

    /// Key the source is stored under in the ConfigMap
    pub fn source_file_name(&self, spec: &FunctionSpec) -> String {
        let (module, _) = spec.handler_parts();
        if spec.function_content_type.is_zip() {
            return format!("{}.zip", module);
        }
        if spec.function_content_type.is_encoded() {
            return module.to_string();
        }
        match self.runtimes.resolve(&spec.runtime) {
            Ok(runtime) => format!("{}{}", module, runtime.file_extension),
            Err(_) => module.to_string(),
        }
    }

    /// Name the decoded source gets inside the runtime volume
    pub(crate) fn staged_file_name(&self, spec: &FunctionSpec) -> String {
        let (module, _) = spec.handler_parts();
        match self.runtimes.resolve(&spec.runtime) {
            Ok(runtime) => format!("{}{}", module, runtime.file_extension),
            Err(_) => module.to_string(),
        }
    }
}

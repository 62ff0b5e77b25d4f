//! Runtime registry loaded from the `runtime-images` config entry

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::LocalObjectReference;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// A language family and the versions available for it
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeFamily {
    /// Family id, the prefix of every runtime id in the family
    #[serde(rename = "ID")]
    pub id: String,

    /// Dependency manifest file name (requirements.txt, package.json, ...)
    #[serde(default)]
    pub dep_name: String,

    /// Source file extension, including the dot
    #[serde(default)]
    pub file_name_suffix: String,

    /// Shell command installing dependencies. `$KUBELESS_INSTALL_VOLUME` and
    /// `$KUBELESS_DEPS_FILE` are set in its environment.
    #[serde(default)]
    pub install_command: String,

    pub versions: Vec<RuntimeVersion>,
}

/// One concrete version of a runtime family
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeVersion {
    pub name: String,
    pub version: String,

    /// Image running the function
    pub runtime_image: String,

    /// Image used to install dependencies
    #[serde(default)]
    pub init_image: String,

    /// Runtime-specific environment (module paths and the like)
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    #[serde(default)]
    pub image_pull_secrets: Vec<String>,
}

/// Everything the synthesizer needs to know about one runtime id
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuntimeDescriptor {
    pub id: String,
    pub image: String,
    pub init_image: String,
    pub file_extension: String,
    pub dep_name: String,
    pub install_command: String,
    pub env: BTreeMap<String, String>,
    pub image_pull_secrets: Vec<String>,
}

/// Read-only lookup of runtime descriptors by id
#[derive(Clone, Debug, Default)]
pub struct RuntimeRegistry {
    runtimes: BTreeMap<String, RuntimeDescriptor>,
}

impl RuntimeRegistry {
    /// Build the registry from runtime families
    pub fn from_families(families: Vec<RuntimeFamily>) -> Result<Self> {
        let mut runtimes = BTreeMap::new();
        for family in families {
            for version in family.versions {
                let id = format!("{}{}", family.id, version.version);
                let descriptor = RuntimeDescriptor {
                    id: id.clone(),
                    image: version.runtime_image,
                    init_image: version.init_image,
                    file_extension: family.file_name_suffix.clone(),
                    dep_name: family.dep_name.clone(),
                    install_command: family.install_command.clone(),
                    env: version.env,
                    image_pull_secrets: version.image_pull_secrets,
                };
                if runtimes.insert(id.clone(), descriptor).is_some() {
                    return Err(Error::config(format!("runtime '{}' is declared twice", id)));
                }
            }
        }
        debug!(count = runtimes.len(), "Loaded runtime registry");
        Ok(Self { runtimes })
    }

    /// Parse the YAML list stored under `runtime-images`
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let families: Vec<RuntimeFamily> = serde_yaml::from_str(yaml)?;
        Self::from_families(families)
    }

    /// Look up a runtime id
    pub fn resolve(&self, id: &str) -> Result<&RuntimeDescriptor> {
        self.runtimes
            .get(id)
            .ok_or_else(|| Error::UnknownRuntime(id.to_string()))
    }

    pub fn is_known(&self, id: &str) -> bool {
        self.runtimes.contains_key(id)
    }

    /// Image pull secrets declared for a runtime id
    pub fn image_secrets(&self, id: &str) -> Result<Vec<LocalObjectReference>> {
        Ok(self
            .resolve(id)?
            .image_pull_secrets
            .iter()
            .map(|name| LocalObjectReference {
                name: name.clone(),
            })
            .collect())
    }

    /// Known runtime ids, sorted
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.runtimes.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RUNTIMES: &str = r#"
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
      imagePullSecrets: [p1, p2]
    - name: python34
      version: "3.4"
      runtimeImage: kubeless/python:3.4
- ID: nodejs
  depName: package.json
  fileNameSuffix: .js
  versions:
    - name: node8
      version: "8"
      runtimeImage: kubeless/nodejs:8
"#;

    #[test]
    fn resolves_runtime_ids_from_family_and_version() {
        let registry = RuntimeRegistry::from_yaml(RUNTIMES).unwrap();
        assert_eq!(
            registry.ids().collect::<Vec<_>>(),
            vec!["nodejs8", "python2.7", "python3.4"]
        );

        let python = registry.resolve("python2.7").unwrap();
        assert_eq!(python.image, "kubeless/python:2.7");
        assert_eq!(python.file_extension, ".py");
        assert_eq!(python.dep_name, "requirements.txt");
        assert_eq!(
            python.env.get("PYTHONPATH").map(String::as_str),
            Some("/kubeless/lib/python2.7/site-packages")
        );
    }

    #[test]
    fn unknown_runtime_is_an_error() {
        let registry = RuntimeRegistry::from_yaml(RUNTIMES).unwrap();
        let err = registry.resolve("cobol").unwrap_err();
        assert!(matches!(err, Error::UnknownRuntime(ref id) if id == "cobol"));
        assert!(registry.image_secrets("cobol").is_err());
    }

    #[test]
    fn lists_image_secrets_in_order() {
        let registry = RuntimeRegistry::from_yaml(RUNTIMES).unwrap();
        let secrets = registry.image_secrets("python2.7").unwrap();
        let names: Vec<_> = secrets.into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["p1", "p2"]);
    }

    #[test]
    fn rejects_duplicate_ids() {
        let yaml = r#"
- ID: go
  versions:
    - {name: a, version: "1.10", runtimeImage: x}
    - {name: b, version: "1.10", runtimeImage: y}
"#;
        assert!(RuntimeRegistry::from_yaml(yaml).is_err());
    }
}

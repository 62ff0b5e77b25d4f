//! Deep merge of partially specified object trees
//!
//! Overrides are merged onto defaults through their JSON form:
//! - objects merge key by key, recursively
//! - arrays and scalars in the override replace the default outright
//! - `null` in the override leaves the default untouched

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::Result;

/// Merge `overlay` onto `base` in place
pub fn merge_values(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (_, Value::Null) => {}
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(key) {
                    Some(existing) => merge_values(existing, value),
                    None if value.is_null() => {}
                    None => {
                        base.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base, overlay) => *base = overlay.clone(),
    }
}

/// Merge a typed override onto a typed default
pub fn merge<T>(base: &T, overlay: &T) -> Result<T>
where
    T: Serialize + DeserializeOwned,
{
    let mut merged = serde_json::to_value(base)?;
    merge_values(&mut merged, &serde_json::to_value(overlay)?);
    Ok(serde_json::from_value(merged)?)
}

/// Whether every field set in `subset` holds the same value in `superset`.
///
/// Fields only present in `superset` (server defaults, foreign annotations)
/// are ignored; arrays must match element by element.
pub fn is_subset(subset: &Value, superset: &Value) -> bool {
    match (subset, superset) {
        (Value::Null, _) => true,
        (Value::Object(sub), Value::Object(sup)) => sub.iter().all(|(key, value)| {
            match sup.get(key) {
                Some(other) => is_subset(value, other),
                None => value.is_null(),
            }
        }),
        (Value::Array(sub), Value::Array(sup)) => {
            sub.len() == sup.len() && sub.iter().zip(sup).all(|(a, b)| is_subset(a, b))
        }
        (a, b) => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::apps::v1::Deployment;
    use serde_json::json;

    #[test]
    fn override_wins_and_default_only_fields_survive() {
        let mut base = json!({"a": 1, "b": {"c": 2, "d": 3}});
        merge_values(&mut base, &json!({"b": {"c": 20}, "e": 5}));
        assert_eq!(base, json!({"a": 1, "b": {"c": 20, "d": 3}, "e": 5}));
    }

    #[test]
    fn arrays_replace_instead_of_appending() {
        let mut base = json!({"items": [1, 2, 3]});
        merge_values(&mut base, &json!({"items": [9]}));
        assert_eq!(base, json!({"items": [9]}));
    }

    #[test]
    fn null_leaves_default_untouched() {
        let mut base = json!({"a": {"b": 1}});
        merge_values(&mut base, &json!({"a": null, "c": null}));
        assert_eq!(base, json!({"a": {"b": 1}}));
    }

    #[test]
    fn merges_typed_deployments() {
        let default: Deployment = serde_json::from_value(json!({
            "metadata": {"annotations": {"foo1-deploy": "bar"}},
            "spec": {
                "selector": {},
                "template": {"spec": {"containers": [{"name": "x", "imagePullPolicy": "Always"}]}}
            }
        }))
        .unwrap();
        let overlay: Deployment = serde_json::from_value(json!({
            "metadata": {"annotations": {"foo2-deploy": "bar"}},
            "spec": {
                "replicas": 10,
                "selector": {},
                "template": {"spec": {"containers": [{"name": "y"}]}}
            }
        }))
        .unwrap();

        let merged = merge(&default, &overlay).unwrap();
        let annotations = merged.metadata.annotations.unwrap();
        assert_eq!(annotations.get("foo1-deploy").map(String::as_str), Some("bar"));
        assert_eq!(annotations.get("foo2-deploy").map(String::as_str), Some("bar"));

        let spec = merged.spec.unwrap();
        assert_eq!(spec.replicas, Some(10));
        let containers = spec.template.spec.unwrap().containers;
        assert_eq!(containers.len(), 1);
        assert_eq!(containers[0].name, "y");
        assert_eq!(containers[0].image_pull_policy, None);
    }

    #[test]
    fn subset_ignores_extra_fields_but_not_changed_ones() {
        let stored = json!({"spec": {"replicas": 1, "strategy": {"type": "RollingUpdate"}}, "status": {}});
        assert!(is_subset(&json!({"spec": {"replicas": 1}}), &stored));
        assert!(!is_subset(&json!({"spec": {"replicas": 2}}), &stored));
        assert!(!is_subset(&json!({"spec": {"paused": true}}), &stored));
        assert!(!is_subset(&json!({"a": [1]}), &json!({"a": [1, 2]})));
    }
}

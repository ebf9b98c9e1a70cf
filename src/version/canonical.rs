//! Canonical config hashing (spec §4.B rule 1).

use serde_json::Value;
use std::collections::BTreeMap;

/// Field names considered "runtime fields": service/task/test subconfigs,
/// timeouts, and `cacheResult`. These never participate in the config hash
/// unless a `buildConfig` section exists, in which case only that section is
/// hashed and these never come into play at all.
const RUNTIME_FIELDS: &[&str] = &["services", "tasks", "tests", "timeout", "timeouts", "cacheResult"];

/// Strip the runtime fields from a config object. Non-object values pass
/// through unchanged.
pub fn omit_runtime_fields(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut filtered = serde_json::Map::new();
            for (k, v) in map {
                if RUNTIME_FIELDS.contains(&k.as_str()) {
                    continue;
                }
                filtered.insert(k.clone(), v.clone());
            }
            Value::Object(filtered)
        }
        other => other.clone(),
    }
}

/// Bytes to feed into the version hash for a task/module config, per §4.B
/// rule 1: if `buildConfig` is present, hash only that section (`spec` and
/// everything else is ignored); otherwise hash the whole config with runtime
/// fields omitted (and `spec`, if present, participates).
pub fn config_hash_bytes(config: &Value) -> Vec<u8> {
    let section = match config.get("buildConfig") {
        Some(build_config) => build_config.clone(),
        None => omit_runtime_fields(config),
    };
    canonicalize(&section)
}

/// Serialize `value` with every object's keys in lexicographic order,
/// regardless of the `serde_json` crate's `preserve_order` feature.
fn canonicalize(value: &Value) -> Vec<u8> {
    serde_json::to_vec(&sort_keys(value)).expect("a canonicalized JSON value always serializes")
}

fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<&String, Value> =
                map.iter().map(|(k, v)| (k, sort_keys(v))).collect();
            let mut out = serde_json::Map::new();
            for (k, v) in sorted {
                out.insert(k.clone(), v);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn build_config_section_ignores_siblings() {
        let a = json!({"buildConfig": {"x": 1}, "spec": {"unrelated": true}});
        let b = json!({"buildConfig": {"x": 1}});
        assert_eq!(config_hash_bytes(&a), config_hash_bytes(&b));
    }

    #[test]
    fn without_build_config_spec_participates() {
        let a = json!({"spec": {"x": 1}});
        let b = json!({"spec": {"x": 2}});
        assert_ne!(config_hash_bytes(&a), config_hash_bytes(&b));
    }

    #[test]
    fn runtime_fields_omitted_without_build_config() {
        let a = json!({"spec": {"x": 1}, "timeout": 10, "cacheResult": true});
        let b = json!({"spec": {"x": 1}, "timeout": 99, "cacheResult": false});
        assert_eq!(config_hash_bytes(&a), config_hash_bytes(&b));
    }

    #[test]
    fn runtime_field_changes_are_invisible_when_build_config_present() {
        let a = json!({"buildConfig": {"x": 1}, "timeout": 10});
        let b = json!({"buildConfig": {"x": 1}, "timeout": 999});
        assert_eq!(config_hash_bytes(&a), config_hash_bytes(&b));
    }

    #[test]
    fn nested_key_order_is_canonicalized() {
        let a = json!({"buildConfig": {"a": 1, "b": {"y": 1, "x": 2}}});
        let b = json!({"buildConfig": {"b": {"x": 2, "y": 1}, "a": 1}});
        assert_eq!(config_hash_bytes(&a), config_hash_bytes(&b));
    }
}

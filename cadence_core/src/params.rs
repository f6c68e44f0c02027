//! Component parameters
//!
//! Key-value configuration handed to [`Component::configure`](crate::core::Component::configure),
//! usually read from the `params` table of a task section in the manager config.

use crate::error::{CadenceError, CadenceResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Parameter store of one component
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComponentParams {
    // BTreeMap keeps keys sorted for stable listing.
    params: BTreeMap<String, Value>,
}

impl ComponentParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convert a TOML table into parameters
    pub fn from_toml(table: toml::Table) -> CadenceResult<Self> {
        let value = serde_json::to_value(table)?;
        match value {
            Value::Object(map) => Ok(Self {
                params: map.into_iter().collect(),
            }),
            other => Err(CadenceError::config(format!(
                "params must be a table, found {}",
                other
            ))),
        }
    }

    /// Get a parameter value
    pub fn get<T: for<'de> Deserialize<'de>>(&self, key: &str) -> Option<T> {
        let value = self.params.get(key)?;
        serde_json::from_value(value.clone()).ok()
    }

    /// Get a parameter, reporting a missing key or a type mismatch
    pub fn require<T: for<'de> Deserialize<'de>>(&self, key: &str) -> CadenceResult<T> {
        let value = self
            .params
            .get(key)
            .ok_or_else(|| CadenceError::config(format!("missing parameter '{}'", key)))?;
        Ok(serde_json::from_value(value.clone())?)
    }

    /// Get parameter with default
    pub fn get_or<T: for<'de> Deserialize<'de>>(&self, key: &str, default: T) -> T {
        self.get(key).unwrap_or(default)
    }

    pub fn get_f64(&self, key: &str, default: f64) -> f64 {
        self.get_or(key, default)
    }

    pub fn get_i64(&self, key: &str, default: i64) -> i64 {
        self.get_or(key, default)
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        self.get_or(key, default)
    }

    pub fn get_string(&self, key: &str, default: &str) -> String {
        self.get_or(key, default.to_string())
    }

    /// Set a parameter value
    pub fn set<T: Serialize>(&mut self, key: &str, value: T) -> CadenceResult<()> {
        let json_value = serde_json::to_value(value)?;
        self.params.insert(key.to_string(), json_value);
        Ok(())
    }

    pub fn has(&self, key: &str) -> bool {
        self.params.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.params.remove(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.params.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Overlay `other` on top of `self`; keys of `other` win
    pub fn merged(&self, other: &ComponentParams) -> ComponentParams {
        let mut params = self.params.clone();
        params.extend(other.params.iter().map(|(k, v)| (k.clone(), v.clone())));
        ComponentParams { params }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_operations() {
        let mut params = ComponentParams::new();
        params.set("gain", 42.5).unwrap();
        params.set("enabled", true).unwrap();
        assert_eq!(params.get::<f64>("gain"), Some(42.5));
        assert_eq!(params.get_f64("missing", 1.0), 1.0);
        assert!(params.get_bool("enabled", false));
        assert_eq!(params.get::<String>("gain"), None);

        params.set("gain", 2.0).unwrap();
        assert_eq!(params.get_f64("gain", 0.0), 2.0);
        assert_eq!(params.keys(), vec!["enabled", "gain"]);
    }

    #[test]
    fn from_toml_table() {
        let table: toml::Table = toml::from_str(
            r#"
            joints = 6
            name = "arm"
            limits = [1.0, 2.5]
            "#,
        )
        .unwrap();
        let params = ComponentParams::from_toml(table).unwrap();
        assert_eq!(params.get_i64("joints", 0), 6);
        assert_eq!(params.get_string("name", ""), "arm");
        assert_eq!(params.get::<Vec<f64>>("limits"), Some(vec![1.0, 2.5]));
        assert!(params.require::<u32>("missing").is_err());
    }

    #[test]
    fn merged_prefers_overrides() {
        let mut base = ComponentParams::new();
        base.set("a", 1).unwrap();
        base.set("b", 1).unwrap();
        let mut over = ComponentParams::new();
        over.set("b", 2).unwrap();
        let merged = base.merged(&over);
        assert_eq!(merged.get_i64("a", 0), 1);
        assert_eq!(merged.get_i64("b", 0), 2);
    }
}

//! Runtime configuration for the worker
//!
//! A flat map of setting name to JSON value. Only `intervalSeconds` is
//! interpreted here; every other key is stored verbatim for the tick function.
//! A `merge` is applied atomically: readers see either the old or the new map.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde_json::{Map, Value};

/// Key holding the worker cadence in whole seconds
pub const INTERVAL_KEY: &str = "intervalSeconds";

/// Cadence used when nothing has been configured
pub const DEFAULT_INTERVAL_SECS: u64 = 5;

/// Smallest cadence the worker will ever sleep for
pub const MIN_INTERVAL_SECS: u64 = 1;

/// A config value that failed validation and was ignored
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigRejection {
    pub key: String,
    pub value: Value,
    pub reason: &'static str,
}

impl std::fmt::Display for ConfigRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "rejected {}={}: {}", self.key, self.value, self.reason)
    }
}

impl std::error::Error for ConfigRejection {}

/// Outcome of a single `merge` call
#[derive(Debug, Clone, Default)]
pub struct MergeReport {
    /// Fields that were written, after coercion
    pub applied: Map<String, Value>,
    /// Fields that were ignored, prior values kept
    pub rejected: Vec<ConfigRejection>,
}

/// Thread-safe key/value settings
pub struct ConfigStore {
    values: Mutex<HashMap<String, Value>>,
}

impl ConfigStore {
    pub fn new(default_interval_secs: u64) -> Self {
        let mut values = HashMap::new();
        values.insert(
            INTERVAL_KEY.to_string(),
            Value::from(default_interval_secs.max(MIN_INTERVAL_SECS)),
        );
        Self {
            values: Mutex::new(values),
        }
    }

    /// Copy of the full configuration
    pub fn snapshot(&self) -> Map<String, Value> {
        self.lock()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.lock().get(key).cloned()
    }

    /// Effective cadence, never below [`MIN_INTERVAL_SECS`]
    pub fn interval_secs(&self) -> u64 {
        self.lock()
            .get(INTERVAL_KEY)
            .and_then(|v| coerce_interval(v).ok())
            .unwrap_or(DEFAULT_INTERVAL_SECS)
    }

    /// Merge non-null fields from `update`.
    ///
    /// Invalid values are skipped and reported; they never abort the rest of
    /// the merge.
    pub fn merge(&self, update: &Map<String, Value>) -> MergeReport {
        let mut report = MergeReport::default();

        for (key, value) in update {
            if value.is_null() {
                continue;
            }
            if key == INTERVAL_KEY {
                match coerce_interval(value) {
                    Ok(secs) => {
                        report.applied.insert(key.clone(), Value::from(secs));
                    }
                    Err(reason) => report.rejected.push(ConfigRejection {
                        key: key.clone(),
                        value: value.clone(),
                        reason,
                    }),
                }
            } else {
                report.applied.insert(key.clone(), value.clone());
            }
        }

        if !report.applied.is_empty() {
            let mut values = self.lock();
            for (key, value) in &report.applied {
                values.insert(key.clone(), value.clone());
            }
        }

        report
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Value>> {
        self.values.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new(DEFAULT_INTERVAL_SECS)
    }
}

/// Coerce a JSON value into whole seconds, floored at [`MIN_INTERVAL_SECS`].
///
/// Accepts numbers and numeric strings; fractions are truncated.
pub fn coerce_interval(value: &Value) -> Result<u64, &'static str> {
    let secs = match value {
        Value::Number(n) => n.as_f64().ok_or("not representable as a number")?,
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| "not a numeric string")?,
        Value::Null => return Err("null"),
        _ => return Err("expected a number"),
    };
    if !secs.is_finite() {
        return Err("not a finite number");
    }
    // `as` saturates: negatives become 0 and are floored below
    Ok((secs.trunc() as u64).max(MIN_INTERVAL_SECS))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_default_interval() {
        let store = ConfigStore::default();
        assert_eq!(store.interval_secs(), 5);
        assert_eq!(store.get(INTERVAL_KEY), Some(json!(5)));
    }

    #[test]
    fn test_zero_interval_clamped_to_one() {
        let store = ConfigStore::default();
        let report = store.merge(&obj(json!({ "intervalSeconds": 0 })));
        assert!(report.rejected.is_empty());
        assert_eq!(store.interval_secs(), 1);
    }

    #[test]
    fn test_interval_coercion() {
        assert_eq!(coerce_interval(&json!(3)), Ok(3));
        assert_eq!(coerce_interval(&json!(2.9)), Ok(2));
        assert_eq!(coerce_interval(&json!("7")), Ok(7));
        assert_eq!(coerce_interval(&json!(" 4.5 ")), Ok(4));
        assert_eq!(coerce_interval(&json!(-10)), Ok(1));
        assert!(coerce_interval(&json!("soon")).is_err());
        assert!(coerce_interval(&json!(true)).is_err());
        assert!(coerce_interval(&json!([1])).is_err());
        assert!(coerce_interval(&json!("inf")).is_err());
    }

    #[test]
    fn test_invalid_interval_keeps_prior_value() {
        let store = ConfigStore::default();
        store.merge(&obj(json!({ "intervalSeconds": 9 })));

        let report = store.merge(&obj(json!({ "intervalSeconds": "abc", "mode": "fast" })));
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].key, INTERVAL_KEY);
        assert_eq!(store.interval_secs(), 9);
        // the rest of the merge still applies
        assert_eq!(store.get("mode"), Some(json!("fast")));
    }

    #[test]
    fn test_null_fields_are_skipped() {
        let store = ConfigStore::default();
        store.merge(&obj(json!({ "symbol": "SPY" })));

        let report = store.merge(&obj(json!({ "symbol": null, "intervalSeconds": null })));
        assert!(report.applied.is_empty());
        assert!(report.rejected.is_empty());
        assert_eq!(store.get("symbol"), Some(json!("SPY")));
        assert_eq!(store.interval_secs(), 5);
    }

    #[test]
    fn test_unknown_keys_stored_verbatim() {
        let store = ConfigStore::default();
        let nested = json!({ "allocation": 0.5, "tags": ["a", "b"] });
        store.merge(&obj(json!({ "strategy": nested.clone() })));

        let snapshot = store.snapshot();
        assert_eq!(snapshot.get("strategy"), Some(&nested));
        assert_eq!(snapshot.get(INTERVAL_KEY), Some(&json!(5)));
    }
}

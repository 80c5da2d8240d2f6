//! Persisted application state
//!
//! One JSON object lives in the storage slot. All fields are optional and
//! nothing is validated: a known key holding a value of an unexpected type
//! is carried through untouched alongside the unknown keys, so older or newer
//! writers sharing the slot don't lose each other's data.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::consts::JS_MAX_SAFE_INTEGER;

/// Wire names of the known fields
pub mod keys {
    pub const NPUB: &str = "npub";
    pub const TRAINING_DATA_SIZE: &str = "trainingDataSize";
    pub const TRAINING_DATA: &str = "trainingData";
    pub const LAST_FETCHED_AT: &str = "lastFetchedAt";
}

/// The state object stored under the persistence key
///
/// Numbers are kept as `serde_json::Number` so whatever a JS writer stored
/// (fractions, negatives) reads back exactly.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "Map<String, Value>", into = "Map<String, Value>")]
pub struct PersistedState {
    /// Caller-defined identity string
    pub npub: Option<String>,
    /// Number of training items
    pub training_data_size: Option<Number>,
    /// Opaque training payload
    pub training_data: Option<String>,
    /// Unix timestamp (ms) of the last fetch
    pub last_fetched_at: Option<Number>,
    /// Unknown keys, plus known keys whose value didn't fit the field type
    pub extra: Map<String, Value>,
}

impl PersistedState {
    /// Create an empty state
    pub fn new() -> Self {
        Self::default()
    }

    /// True when no field (known or unknown) is set
    pub fn is_empty(&self) -> bool {
        self.npub.is_none()
            && self.training_data_size.is_none()
            && self.training_data.is_none()
            && self.last_fetched_at.is_none()
            && self.extra.is_empty()
    }

    /// Store a raw JSON value under `key`.
    ///
    /// Known keys land in their typed field when the value fits and stay
    /// raw otherwise; either way the key exists in exactly one place.
    pub fn put(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        match key.as_str() {
            keys::NPUB => self.npub = fit(&mut self.extra, key, value),
            keys::TRAINING_DATA_SIZE => {
                self.training_data_size = fit(&mut self.extra, key, value)
            }
            keys::TRAINING_DATA => self.training_data = fit(&mut self.extra, key, value),
            keys::LAST_FETCHED_AT => self.last_fetched_at = fit(&mut self.extra, key, value),
            _ => {
                self.extra.insert(key, value);
            }
        }
    }

    /// Shallow-merge a patch over this state.
    ///
    /// Fields the patch doesn't mention keep their value; mentioned fields are
    /// overwritten, including explicit clears.
    pub fn apply(&mut self, patch: StatePatch) {
        assign(&mut self.npub, &mut self.extra, keys::NPUB, patch.npub);
        assign(
            &mut self.training_data_size,
            &mut self.extra,
            keys::TRAINING_DATA_SIZE,
            patch.training_data_size,
        );
        assign(
            &mut self.training_data,
            &mut self.extra,
            keys::TRAINING_DATA,
            patch.training_data,
        );
        assign(
            &mut self.last_fetched_at,
            &mut self.extra,
            keys::LAST_FETCHED_AT,
            patch.last_fetched_at,
        );
        for (key, value) in patch.extra {
            self.put(key, value);
        }
    }

    /// Return a copy with the patch applied
    pub fn merged(mut self, patch: StatePatch) -> Self {
        self.apply(patch);
        self
    }

    /// Known numeric fields a browser would round when parsing them
    pub fn unsafe_numbers(&self) -> Vec<&'static str> {
        [
            (keys::TRAINING_DATA_SIZE, &self.training_data_size),
            (keys::LAST_FETCHED_AT, &self.last_fetched_at),
        ]
        .into_iter()
        .filter(|(_, n)| matches!(n, Some(n) if !is_js_safe(n)))
        .map(|(key, _)| key)
        .collect()
    }
}

/// Decode `value` into a typed field, or keep it raw under `key`
fn fit<T: DeserializeOwned>(
    extra: &mut Map<String, Value>,
    key: String,
    value: Value,
) -> Option<T> {
    match T::deserialize(&value) {
        Ok(typed) => {
            extra.remove(&key);
            Some(typed)
        }
        Err(_) => {
            extra.insert(key, value);
            None
        }
    }
}

fn assign<T>(
    slot: &mut Option<T>,
    extra: &mut Map<String, Value>,
    key: &str,
    change: Option<Option<T>>,
) {
    if let Some(value) = change {
        extra.remove(key);
        *slot = value;
    }
}

impl From<Map<String, Value>> for PersistedState {
    fn from(map: Map<String, Value>) -> Self {
        let mut state = Self::new();
        for (key, value) in map {
            state.put(key, value);
        }
        state
    }
}

/// Typed fields win over a same-named raw entry, so the output never
/// carries a key twice
impl From<PersistedState> for Map<String, Value> {
    fn from(state: PersistedState) -> Self {
        let mut map = state.extra;
        let typed = [
            (keys::NPUB, state.npub.map(Value::String)),
            (keys::TRAINING_DATA_SIZE, state.training_data_size.map(Value::Number)),
            (keys::TRAINING_DATA, state.training_data.map(Value::String)),
            (keys::LAST_FETCHED_AT, state.last_fetched_at.map(Value::Number)),
        ];
        for (key, value) in typed {
            if let Some(value) = value {
                map.insert(key.to_string(), value);
            }
        }
        map
    }
}

/// True when a browser's `JSON.parse` yields exactly this number
pub fn is_js_safe(number: &Number) -> bool {
    if let Some(n) = number.as_u64() {
        n <= JS_MAX_SAFE_INTEGER
    } else if let Some(n) = number.as_i64() {
        n.unsigned_abs() <= JS_MAX_SAFE_INTEGER
    } else {
        // Already an f64, which is what JS numbers are
        true
    }
}

/// A partial update.
///
/// Each field is tri-state: `None` leaves the stored value alone,
/// `Some(None)` clears it and `Some(Some(v))` sets it. When decoded from JSON
/// a missing key maps to `None` and a `null` value to `Some(None)`; a known
/// key with a value of another type is passed through raw.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(from = "Map<String, Value>")]
pub struct StatePatch {
    pub npub: Option<Option<String>>,
    pub training_data_size: Option<Option<Number>>,
    pub training_data: Option<Option<String>>,
    pub last_fetched_at: Option<Option<Number>>,
    pub extra: Map<String, Value>,
}

impl StatePatch {
    /// Patch that changes nothing
    pub fn new() -> Self {
        Self::default()
    }

    pub fn npub(mut self, npub: impl Into<String>) -> Self {
        self.npub = Some(Some(npub.into()));
        self.extra.remove(keys::NPUB);
        self
    }

    pub fn training_data_size(mut self, size: impl Into<Number>) -> Self {
        self.training_data_size = Some(Some(size.into()));
        self.extra.remove(keys::TRAINING_DATA_SIZE);
        self
    }

    pub fn training_data(mut self, data: impl Into<String>) -> Self {
        self.training_data = Some(Some(data.into()));
        self.extra.remove(keys::TRAINING_DATA);
        self
    }

    pub fn last_fetched_at(mut self, timestamp: impl Into<Number>) -> Self {
        self.last_fetched_at = Some(Some(timestamp.into()));
        self.extra.remove(keys::LAST_FETCHED_AT);
        self
    }

    pub fn clear_npub(self) -> Self {
        self.extra(keys::NPUB, Value::Null)
    }

    pub fn clear_training_data_size(self) -> Self {
        self.extra(keys::TRAINING_DATA_SIZE, Value::Null)
    }

    pub fn clear_training_data(self) -> Self {
        self.extra(keys::TRAINING_DATA, Value::Null)
    }

    pub fn clear_last_fetched_at(self) -> Self {
        self.extra(keys::LAST_FETCHED_AT, Value::Null)
    }

    /// Set any key from a raw JSON value.
    ///
    /// Known keys go to their typed field (`null` clears it); unknown keys
    /// and mistyped values are merged as-is.
    pub fn extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.put(key.into(), value.into());
        self
    }

    fn put(&mut self, key: String, value: Value) {
        match key.as_str() {
            keys::NPUB => self.npub = mention(&mut self.extra, key, value),
            keys::TRAINING_DATA_SIZE => {
                self.training_data_size = mention(&mut self.extra, key, value)
            }
            keys::TRAINING_DATA => self.training_data = mention(&mut self.extra, key, value),
            keys::LAST_FETCHED_AT => self.last_fetched_at = mention(&mut self.extra, key, value),
            _ => {
                self.extra.insert(key, value);
            }
        }
    }

    /// True when applying this patch cannot change anything
    pub fn is_empty(&self) -> bool {
        self.npub.is_none()
            && self.training_data_size.is_none()
            && self.training_data.is_none()
            && self.last_fetched_at.is_none()
            && self.extra.is_empty()
    }
}

/// Patch-side counterpart of `fit`: `null` is an explicit clear
fn mention<T: DeserializeOwned>(
    extra: &mut Map<String, Value>,
    key: String,
    value: Value,
) -> Option<Option<T>> {
    if value.is_null() {
        extra.remove(&key);
        return Some(None);
    }
    match T::deserialize(&value) {
        Ok(typed) => {
            extra.remove(&key);
            Some(Some(typed))
        }
        Err(_) => {
            extra.insert(key, value);
            None
        }
    }
}

impl From<Map<String, Value>> for StatePatch {
    fn from(map: Map<String, Value>) -> Self {
        let mut patch = Self::new();
        for (key, value) in map {
            patch.put(key, value);
        }
        patch
    }
}

/// Every set field of a state becomes a "set" in the patch
impl From<PersistedState> for StatePatch {
    fn from(state: PersistedState) -> Self {
        Self {
            npub: state.npub.map(Some),
            training_data_size: state.training_data_size.map(Some),
            training_data: state.training_data.map(Some),
            last_fetched_at: state.last_fetched_at.map(Some),
            extra: state.extra,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_shallow_merge_keeps_unmentioned_fields() {
        let state = PersistedState {
            npub: Some("a".into()),
            training_data_size: Some(5.into()),
            ..Default::default()
        };
        let merged = state.merged(StatePatch::new().training_data_size(10));
        assert_eq!(merged.npub.as_deref(), Some("a"));
        assert_eq!(merged.training_data_size, Some(10.into()));
        assert_eq!(merged.training_data, None);
    }

    #[test]
    fn test_explicit_clear_drops_key() {
        let state = PersistedState {
            npub: Some("a".into()),
            training_data: Some("payload".into()),
            ..Default::default()
        };
        let merged = state.merged(StatePatch::new().clear_training_data());
        assert_eq!(merged.training_data, None);

        let json = serde_json::to_value(&merged).unwrap();
        assert_eq!(json, json!({ "npub": "a" }));
    }

    #[test]
    fn test_empty_state_serializes_to_empty_object() {
        assert_eq!(serde_json::to_string(&PersistedState::new()).unwrap(), "{}");
        assert!(PersistedState::new().is_empty());
    }

    #[test]
    fn test_camel_case_wire_names() {
        let state: PersistedState = serde_json::from_value(json!({
            "npub": "npub1xyz",
            "trainingDataSize": 3,
            "trainingData": "abc",
            "lastFetchedAt": 1000
        }))
        .unwrap();
        assert_eq!(state.npub.as_deref(), Some("npub1xyz"));
        assert_eq!(state.training_data_size, Some(3.into()));
        assert_eq!(state.training_data.as_deref(), Some("abc"));
        assert_eq!(state.last_fetched_at, Some(1000.into()));
        assert!(state.extra.is_empty());
    }

    #[test]
    fn test_js_numbers_read_exactly() {
        let state: PersistedState =
            serde_json::from_str(r#"{"trainingDataSize":-1,"lastFetchedAt":1700000000000.5}"#)
                .unwrap();
        assert_eq!(state.training_data_size.as_ref().and_then(Number::as_i64), Some(-1));
        assert_eq!(
            state.last_fetched_at.as_ref().and_then(Number::as_f64),
            Some(1700000000000.5)
        );
    }

    #[test]
    fn test_mistyped_known_field_passes_through() {
        let raw = r#"{"npub":"a","trainingDataSize":"lots"}"#;
        let state: PersistedState = serde_json::from_str(raw).unwrap();
        assert_eq!(state.npub.as_deref(), Some("a"));
        assert_eq!(state.training_data_size, None);
        assert_eq!(state.extra.get("trainingDataSize"), Some(&json!("lots")));

        let value = serde_json::to_value(&state).unwrap();
        assert_eq!(value, json!({ "npub": "a", "trainingDataSize": "lots" }));

        // A typed write replaces the raw value
        let fixed = state.merged(StatePatch::new().training_data_size(4));
        assert!(fixed.extra.is_empty());
        assert_eq!(fixed.training_data_size, Some(4.into()));
    }

    #[test]
    fn test_unknown_keys_survive() {
        let raw = r#"{"npub":"a","theme":"dark","flags":{"beta":true}}"#;
        let state: PersistedState = serde_json::from_str(raw).unwrap();
        assert_eq!(state.extra.get("theme"), Some(&json!("dark")));

        let merged = state.merged(StatePatch::new().last_fetched_at(7));
        let value = serde_json::to_value(&merged).unwrap();
        assert_eq!(
            value,
            json!({ "npub": "a", "lastFetchedAt": 7, "theme": "dark", "flags": { "beta": true } })
        );
    }

    #[test]
    fn test_extra_with_known_key_routes_to_field() {
        let state = PersistedState::new()
            .merged(StatePatch::new().npub("a").training_data("keep"))
            .merged(StatePatch::new().extra("npub", "b"));
        assert_eq!(state.npub.as_deref(), Some("b"));
        assert!(state.extra.is_empty());

        let raw = serde_json::to_string(&state).unwrap();
        assert_eq!(raw, r#"{"npub":"b","trainingData":"keep"}"#);
        let back: PersistedState = serde_json::from_str(&raw).unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn test_extra_null_on_known_key_clears() {
        let patch = StatePatch::new().npub("a").extra("npub", Value::Null);
        assert_eq!(patch.npub, Some(None));
        assert!(patch.extra.is_empty());
    }

    #[test]
    fn test_raw_entry_never_duplicates_typed_field() {
        let mut state = PersistedState {
            npub: Some("typed".into()),
            ..Default::default()
        };
        state.extra.insert("npub".into(), json!("raw"));
        let raw = serde_json::to_string(&state).unwrap();
        assert_eq!(raw, r#"{"npub":"typed"}"#);
    }

    #[test]
    fn test_patch_from_json_distinguishes_missing_and_null() {
        let patch: StatePatch =
            serde_json::from_str(r#"{"npub":null,"lastFetchedAt":1000}"#).unwrap();
        assert_eq!(patch.npub, Some(None));
        assert_eq!(patch.last_fetched_at, Some(Some(1000.into())));
        assert_eq!(patch.training_data, None);
        assert_eq!(patch.training_data_size, None);
    }

    #[test]
    fn test_patch_from_json_accepts_any_number() {
        let patch: StatePatch = serde_json::from_str(r#"{"trainingDataSize":-1}"#).unwrap();
        assert_eq!(patch.training_data_size, Some(Some((-1).into())));

        let patch: StatePatch = serde_json::from_str(r#"{"trainingDataSize":"lots"}"#).unwrap();
        assert_eq!(patch.training_data_size, None);
        assert_eq!(patch.extra.get("trainingDataSize"), Some(&json!("lots")));
    }

    #[test]
    fn test_patch_extra_overwrites_shallowly() {
        let state: PersistedState =
            serde_json::from_str(r#"{"prefs":{"a":1,"b":2}}"#).unwrap();
        let merged = state.merged(StatePatch::new().extra("prefs", json!({ "a": 9 })));
        assert_eq!(merged.extra.get("prefs"), Some(&json!({ "a": 9 })));
    }

    #[test]
    fn test_wrong_shape_is_rejected() {
        assert!(serde_json::from_str::<PersistedState>("[1, 2]").is_err());
        assert!(serde_json::from_str::<PersistedState>("null").is_err());
        assert!(serde_json::from_str::<PersistedState>("not json").is_err());
    }

    #[test]
    fn test_state_into_patch_roundtrip() {
        let state = PersistedState {
            npub: Some("a".into()),
            last_fetched_at: Some(42.into()),
            ..Default::default()
        };
        let rebuilt = PersistedState::new().merged(state.clone().into());
        assert_eq!(rebuilt, state);
    }

    #[test]
    fn test_js_safe_boundary() {
        assert!(is_js_safe(&JS_MAX_SAFE_INTEGER.into()));
        assert!(!is_js_safe(&(JS_MAX_SAFE_INTEGER + 1).into()));
        assert!(is_js_safe(&(-(JS_MAX_SAFE_INTEGER as i64)).into()));
        assert!(!is_js_safe(&(-(JS_MAX_SAFE_INTEGER as i64) - 1).into()));
        assert!(is_js_safe(&Number::from_f64(1.5e300).unwrap()));

        let state = PersistedState::new()
            .merged(StatePatch::new().last_fetched_at(JS_MAX_SAFE_INTEGER + 1));
        assert_eq!(state.unsafe_numbers(), vec!["lastFetchedAt"]);
    }

    fn field<T: std::fmt::Debug + Clone + 'static>(
        value: impl Strategy<Value = T> + 'static,
    ) -> impl Strategy<Value = Option<Option<T>>> {
        proptest::option::of(proptest::option::of(value))
    }

    fn patch_strategy() -> impl Strategy<Value = StatePatch> {
        (
            field("[a-z0-9]{0,12}"),
            field(any::<i64>().prop_map(Number::from)),
            field(".{0,24}"),
            field(any::<u64>().prop_map(Number::from)),
        )
            .prop_map(|(npub, size, data, fetched)| StatePatch {
                npub,
                training_data_size: size,
                training_data: data,
                last_fetched_at: fetched,
                extra: Map::new(),
            })
    }

    proptest! {
        #[test]
        fn prop_merge_is_idempotent(base in patch_strategy(), patch in patch_strategy()) {
            let start = PersistedState::new().merged(base);
            let once = start.clone().merged(patch.clone());
            let twice = once.clone().merged(patch);
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn prop_unmentioned_fields_preserved(base in patch_strategy()) {
            let start = PersistedState::new().merged(base);
            let after = start.clone().merged(StatePatch::new());
            prop_assert_eq!(start, after);
        }

        #[test]
        fn prop_stored_text_reads_back_equal(base in patch_strategy()) {
            let state = PersistedState::new().merged(base);
            let raw = serde_json::to_string(&state).unwrap();
            let back: PersistedState = serde_json::from_str(&raw).unwrap();
            prop_assert_eq!(back, state);
        }
    }
}

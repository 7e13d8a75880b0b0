//! Schema-less document representation.
//!
//! A [`Document`] is an ordered mapping of field name to [`Value`], where
//! `Value` is the JSON-like tagged union (`Null | Bool | Number | String |
//! Array | Object`). Field order is preserved so documents round-trip through
//! the stores unchanged.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Fields maintained by the store itself.
///
/// They are excluded from content comparison and stripped from documents
/// before they are written to the target.
pub const SYSTEM_FIELDS: &[&str] = &["_rid", "_self", "_etag", "_ts", "_attachments", "_lsn"];

/// Name of the mandatory identity field.
pub const ID_FIELD: &str = "id";

/// Returns true if `name` is a store-managed metadata field.
pub fn is_system_field(name: &str) -> bool {
    SYSTEM_FIELDS.contains(&name)
}

/// A single schema-less record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(Map<String, Value>);

impl Document {
    /// Create an empty document.
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Build a document from a JSON value. Returns `None` unless the value is an object.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    /// The document's `id`, if it is a non-empty string.
    pub fn id(&self) -> Option<&str> {
        match self.0.get(ID_FIELD) {
            Some(Value::String(id)) if !id.is_empty() => Some(id.as_str()),
            _ => None,
        }
    }

    /// Get a top-level field.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Whether a top-level field is present.
    pub fn contains_field(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    /// Set a top-level field, returning the previous value.
    pub fn insert(&mut self, field: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(field.into(), value)
    }

    /// Remove a top-level field.
    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.0.remove(field)
    }

    /// Borrow the underlying field map.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Mutably borrow the underlying field map.
    pub fn fields_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.0
    }

    /// Number of top-level fields.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the document has no fields.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Copy of this document with store metadata fields removed.
    pub fn without_system_fields(&self) -> Document {
        let mut copy = self.clone();
        copy.strip_system_fields();
        copy
    }

    /// Remove store metadata fields in place.
    pub fn strip_system_fields(&mut self) {
        for field in SYSTEM_FIELDS {
            self.0.remove(*field);
        }
    }

    /// Compare user content, ignoring system fields at the top level.
    pub fn content_eq(&self, other: &Document) -> bool {
        let lhs = self.0.iter().filter(|(k, _)| !is_system_field(k));
        let rhs_len = other.0.keys().filter(|k| !is_system_field(k)).count();

        let mut lhs_len = 0;
        for (key, value) in lhs {
            lhs_len += 1;
            match other.0.get(key) {
                Some(theirs) if values_equal(value, theirs) => {}
                _ => return false,
            }
        }
        lhs_len == rhs_len
    }

    /// Render the document as compact JSON for diagnostics.
    pub fn to_json_string(&self) -> String {
        serde_json::to_string(&self.0).unwrap_or_else(|_| "<unserializable>".to_string())
    }

    /// Consume into a JSON value.
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Map<String, Value>> for Document {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Deep equality: mapping keys are order-insensitive, sequences are
/// order-sensitive, and numbers compare by numeric value.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => {
            if x == y {
                return true;
            }
            if x.is_f64() || y.is_f64() {
                return match (x.as_f64(), y.as_f64()) {
                    (Some(fx), Some(fy)) => fx == fy,
                    _ => false,
                };
            }
            // Both integers: exact, f64 would merge values above 2^53
            match (x.as_i64(), y.as_i64()) {
                (Some(ix), Some(iy)) => ix == iy,
                _ => x.as_u64().is_some() && x.as_u64() == y.as_u64(),
            }
        }
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(xm), Value::Object(ym)) => {
            xm.len() == ym.len()
                && xm
                    .iter()
                    .all(|(k, v)| ym.get(k).map_or(false, |other| values_equal(v, other)))
        }
        _ => false,
    }
}

/// Short human-readable rendering of a value for log lines.
pub fn describe_value(value: Option<&Value>) -> String {
    match value {
        None => "<missing>".to_string(),
        Some(v) => serde_json::to_string(v).unwrap_or_else(|_| "<unserializable>".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        Document::from_value(value).unwrap()
    }

    #[test]
    fn test_id_requires_non_empty_string() {
        assert_eq!(doc(json!({"id": "a"})).id(), Some("a"));
        assert_eq!(doc(json!({"id": ""})).id(), None);
        assert_eq!(doc(json!({"id": 7})).id(), None);
        assert_eq!(doc(json!({"name": "x"})).id(), None);
    }

    #[test]
    fn test_from_value_rejects_non_objects() {
        assert!(Document::from_value(json!([1, 2])).is_none());
        assert!(Document::from_value(json!("text")).is_none());
    }

    #[test]
    fn test_content_eq_ignores_system_fields() {
        let source = doc(json!({"id": "a", "pk": "x", "n": 1}));
        let target = doc(json!({"id": "a", "pk": "x", "n": 1, "_etag": "\"0001\"", "_ts": 17}));
        assert!(source.content_eq(&target));
        assert!(target.content_eq(&source));
    }

    #[test]
    fn test_content_eq_key_order_insensitive() {
        let a = doc(json!({"id": "a", "nested": {"x": 1, "y": 2}}));
        let b = doc(json!({"nested": {"y": 2, "x": 1}, "id": "a"}));
        assert!(a.content_eq(&b));
    }

    #[test]
    fn test_content_eq_sequence_order_sensitive() {
        let a = doc(json!({"id": "a", "tags": [1, 2]}));
        let b = doc(json!({"id": "a", "tags": [2, 1]}));
        assert!(!a.content_eq(&b));
    }

    #[test]
    fn test_content_eq_detects_extra_field() {
        let a = doc(json!({"id": "a"}));
        let b = doc(json!({"id": "a", "extra": null}));
        assert!(!a.content_eq(&b));
        assert!(!b.content_eq(&a));
    }

    #[test]
    fn test_numbers_compare_by_value() {
        assert!(values_equal(&json!(1), &json!(1.0)));
        assert!(!values_equal(&json!(1), &json!(2)));
        assert!(!values_equal(&json!(1), &json!("1")));
    }

    #[test]
    fn test_large_integers_compare_exactly() {
        assert!(!values_equal(&json!(9007199254740993u64), &json!(9007199254740992u64)));
        assert!(!values_equal(&json!(-9007199254740993i64), &json!(-9007199254740992i64)));
        assert!(!values_equal(&json!(u64::MAX), &json!(u64::MAX - 1)));
        assert!(values_equal(&json!(u64::MAX), &json!(u64::MAX)));
        assert!(!values_equal(&json!(-1), &json!(u64::MAX)));

        let newer = doc(json!({"id": "a", "ts": 9007199254740993u64}));
        let older = doc(json!({"id": "a", "ts": 9007199254740992u64}));
        assert!(!newer.content_eq(&older));
    }

    #[test]
    fn test_strip_system_fields() {
        let mut d = doc(json!({"id": "a", "_rid": "r", "_self": "s", "value": 3}));
        d.strip_system_fields();
        assert_eq!(d.len(), 2);
        assert!(!d.contains_field("_rid"));
    }
}

//! Search criteria and dotted-path lookups.
//!
//! A criterion maps a dotted path such as `"address.city"` to the value the
//! field must hold. Paths walk objects by key and arrays by canonical decimal
//! index, the same own-property rule the CouchDB map function applies.

use serde_json::Value;
use std::collections::BTreeMap;

/// Search criteria: dotted path to required value.
///
/// Paths iterate in sorted order, which fixes the order of query keys built
/// from them.
pub type Criteria = BTreeMap<String, Value>;

/// Look up a dotted path inside a value.
///
/// An empty segment ends the walk at the current node, so `""` yields the
/// value itself and `"a."` yields the `a` field. Returns `None` when a segment
/// is missing or addresses into a scalar. JSON `null` counts as present.
pub fn lookup_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for segment in path.split('.') {
        if segment.is_empty() {
            return Some(current);
        }
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(array_index(segment)?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Parse an array index the way JavaScript names array elements.
///
/// Only the canonical form counts: `"1"` is an index, `"01"` and `"+1"` are not.
fn array_index(segment: &str) -> Option<usize> {
    let index = segment.parse::<usize>().ok()?;
    (index.to_string() == segment).then_some(index)
}

/// Compare two JSON values for an exact-match query.
///
/// Numbers compare by value, so `5` equals `5.0`.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            if let (Some(x), Some(y)) = (x.as_i64(), y.as_i64()) {
                x == y
            } else if let (Some(x), Some(y)) = (x.as_u64(), y.as_u64()) {
                x == y
            } else {
                x.as_f64() == y.as_f64()
            }
        }
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).is_some_and(|y| values_equal(x, y)))
        }
        _ => a == b,
    }
}

/// Whether `value` satisfies every criterion.
pub fn matches(value: &Value, criteria: &Criteria) -> bool {
    criteria.iter().all(|(path, expected)| {
        lookup_path(value, path).is_some_and(|actual| values_equal(actual, expected))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn lookup_nested_object() {
        let value = json!({"a": {"b": 5}});
        assert_eq!(lookup_path(&value, "a.b"), Some(&json!(5)));
        assert_eq!(lookup_path(&value, "a"), Some(&json!({"b": 5})));
        assert_eq!(lookup_path(&value, "a.c"), None);
    }

    #[test]
    fn lookup_array_index() {
        let value = json!({"tags": ["x", "y"]});
        assert_eq!(lookup_path(&value, "tags.1"), Some(&json!("y")));
        assert_eq!(lookup_path(&value, "tags.2"), None);
        assert_eq!(lookup_path(&value, "tags.first"), None);
    }

    #[test]
    fn lookup_rejects_non_canonical_index() {
        let value = json!({"tags": ["x", "y"]});
        assert_eq!(lookup_path(&value, "tags.0"), Some(&json!("x")));
        assert_eq!(lookup_path(&value, "tags.01"), None);
        assert_eq!(lookup_path(&value, "tags.+1"), None);
        assert_eq!(lookup_path(&value, "tags.00"), None);
    }

    #[test]
    fn non_canonical_index_never_matches() {
        let mut criteria = Criteria::new();
        criteria.insert("tags.01".to_string(), json!("y"));
        assert!(!matches(&json!({"tags": ["x", "y"]}), &criteria));
    }

    #[test]
    fn lookup_empty_segment_stops_walk() {
        let value = json!({"a": {"b": 1}});
        assert_eq!(lookup_path(&value, ""), Some(&value));
        assert_eq!(lookup_path(&value, "a."), Some(&json!({"b": 1})));
    }

    #[test]
    fn lookup_into_scalar_is_missing() {
        let value = json!({"a": 3, "n": null});
        assert_eq!(lookup_path(&value, "a.b"), None);
        assert_eq!(lookup_path(&value, "n"), Some(&Value::Null));
        assert_eq!(lookup_path(&value, "n.x"), None);
    }

    #[test]
    fn numbers_compare_by_value() {
        assert!(values_equal(&json!(5), &json!(5.0)));
        assert!(!values_equal(&json!(5), &json!(6)));
        assert!(!values_equal(&json!(5), &json!("5")));
        assert!(values_equal(&json!([1, {"x": 2.0}]), &json!([1.0, {"x": 2}])));
    }

    #[test]
    fn matches_requires_every_criterion() {
        let value = json!({"a": {"b": 5}, "name": "bob"});
        let mut criteria = Criteria::new();
        criteria.insert("a.b".to_string(), json!(5));
        assert!(matches(&value, &criteria));

        criteria.insert("name".to_string(), json!("alice"));
        assert!(!matches(&value, &criteria));
    }

    #[test]
    fn missing_path_never_matches() {
        let mut criteria = Criteria::new();
        criteria.insert("a.b".to_string(), Value::Null);
        assert!(!matches(&json!({"a": {}}), &criteria));
        assert!(matches(&json!({"a": {"b": null}}), &criteria));
    }

    #[test]
    fn empty_criteria_match_everything() {
        assert!(matches(&json!({"any": "thing"}), &Criteria::new()));
    }
}

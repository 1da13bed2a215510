//! One-level strict equality over JSON-shaped values

use serde_json::Value;

/// Shallow structural equality.
///
/// `None` stands for an absent value (`undefined`) and `Some(Value::Null)` for
/// an explicit null; the two are never equal to each other. Containers compare
/// their own entries with strict equality: scalars by value, nested objects
/// and arrays by identity only. There is no recursion.
pub fn shallow_equal(a: Option<&Value>, b: Option<&Value>) -> bool {
    let (a, b) = match (a, b) {
        (None, None) => return true,
        (Some(a), Some(b)) => (a, b),
        _ => return false,
    };

    if std::ptr::eq(a, b) {
        return true;
    }

    match (a, b) {
        (Value::Object(left), Value::Object(right)) => {
            left.len() == right.len()
                && left
                    .iter()
                    .all(|(key, value)| right.get(key).is_some_and(|other| strict_eq(value, other)))
        }
        (Value::Array(left), Value::Array(right)) => {
            left.len() == right.len() && left.iter().zip(right).all(|(l, r)| strict_eq(l, r))
        }
        _ => strict_eq(a, b),
    }
}

/// Scalars by value, containers by identity
fn strict_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(l), Value::Bool(r)) => l == r,
        (Value::Number(l), Value::Number(r)) => l.as_f64() == r.as_f64(),
        (Value::String(l), Value::String(r)) => l == r,
        (Value::Array(_), Value::Array(_)) | (Value::Object(_), Value::Object(_)) => std::ptr::eq(a, b),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_identity_fast_path() {
        let value = json!({"nested": {"deep": [1, 2, 3]}});
        assert!(shallow_equal(Some(&value), Some(&value)));
    }

    #[test]
    fn test_null_and_absent() {
        let null = Value::Null;
        let other_null = Value::Null;
        let empty = json!({});

        assert!(shallow_equal(Some(&null), Some(&other_null)));
        assert!(shallow_equal(None, None));
        assert!(!shallow_equal(Some(&null), None));
        assert!(!shallow_equal(Some(&empty), Some(&null)));
        assert!(!shallow_equal(Some(&empty), None));
    }

    #[test]
    fn test_flat_objects() {
        let a = json!({"id": 1, "name": "Ada", "active": true});
        let b = json!({"name": "Ada", "active": true, "id": 1});
        let c = json!({"id": 1, "name": "Ada", "active": false});
        let d = json!({"id": 1, "name": "Ada"});

        assert!(shallow_equal(Some(&a), Some(&b)));
        assert!(!shallow_equal(Some(&a), Some(&c)));
        assert!(!shallow_equal(Some(&a), Some(&d)));
    }

    #[test]
    fn test_null_member_vs_missing_member() {
        let a = json!({"id": 1, "bio": null});
        let b = json!({"id": 1, "other": null});
        assert!(!shallow_equal(Some(&a), Some(&b)));
    }

    #[test]
    fn test_nested_containers_compare_by_identity() {
        // Equal content, different allocations: not strictly equal
        let a = json!({"tags": ["a", "b"]});
        let b = json!({"tags": ["a", "b"]});
        assert!(!shallow_equal(Some(&a), Some(&b)));
    }

    #[test]
    fn test_scalars() {
        assert!(shallow_equal(Some(&json!(3)), Some(&json!(3.0))));
        assert!(!shallow_equal(Some(&json!("3")), Some(&json!(3))));
        assert!(shallow_equal(Some(&json!([1, "x"])), Some(&json!([1, "x"]))));
        assert!(!shallow_equal(Some(&json!([1, 2])), Some(&json!([2, 1]))));
    }
}

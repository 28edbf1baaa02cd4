//! The call payload and the deep-equality rule used by change detection.

/// A channel payload. Modelled directly as a JSON-like value so that deep
/// equality (the semantics change detection needs) is structural, not
/// pointer-based, and so host applications can pass any `Serialize` type
/// through [`serde_json::to_value`] without the runtime needing to know its
/// concrete type.
pub type Payload = serde_json::Value;

/// Structural equality over JSON-like values: numbers, strings, booleans,
/// null, ordered arrays, and string-keyed objects (key order does not
/// matter, consistent with `serde_json::Value`'s own `PartialEq`).
///
/// `serde_json::Value` already implements structural `PartialEq` this way,
/// so this is a thin named wrapper kept around the comparison so call sites
/// read as intent ("are these payloads the same, for change-detection
/// purposes") rather than an incidental `==`.
pub fn deep_equal(a: &Payload, b: &Payload) -> bool {
    a == b
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scalars_compare_structurally() {
        assert!(deep_equal(&json!(1), &json!(1)));
        assert!(!deep_equal(&json!(1), &json!(2)));
        assert!(deep_equal(&json!(null), &json!(null)));
    }

    #[test]
    fn objects_ignore_key_order() {
        let a = json!({"x": 1, "y": 2});
        let b = json!({"y": 2, "x": 1});
        assert!(deep_equal(&a, &b));
    }

    #[test]
    fn arrays_are_order_sensitive() {
        assert!(!deep_equal(&json!([1, 2]), &json!([2, 1])));
    }

    #[test]
    fn nested_structures_compare_recursively() {
        let a = json!({"list": [1, {"k": "v"}], "n": 3});
        let b = json!({"list": [1, {"k": "v"}], "n": 3});
        let c = json!({"list": [1, {"k": "w"}], "n": 3});
        assert!(deep_equal(&a, &b));
        assert!(!deep_equal(&a, &c));
    }
}

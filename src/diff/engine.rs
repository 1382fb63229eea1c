//! Computing and applying structural diffs.

use super::map::{Change, DiffMap};
use super::policy::DiffOptions;
use crate::types::{RecordState, Value};

/// Compute the delta that turns `old` into `new`.
///
/// Keys only in `new` are emitted whole (maps are not diffed against
/// nothing), keys only in `old` are emitted as [`Change::Deleted`], and keys
/// in both are compared recursively. Keys of `new` come first, in `new`'s
/// order, followed by the keys that were removed.
pub fn diff(new: &RecordState, old: &RecordState, options: &DiffOptions) -> DiffMap {
    let mut out = DiffMap::new();

    for (key, new_value) in new {
        match old.get(key) {
            None => {
                out.insert(key.clone(), Change::Set(new_value.clone()));
            }
            Some(old_value) => {
                if let Some(change) = diff_value(new_value, old_value, options) {
                    out.insert(key.clone(), change);
                }
            }
        }
    }

    for key in old.keys() {
        if !new.contains_key(key) {
            out.insert(key.clone(), Change::Deleted);
        }
    }

    out
}

/// Compare two values found under the same key. `None` means unchanged.
fn diff_value(new: &Value, old: &Value, options: &DiffOptions) -> Option<Change> {
    match (new, old) {
        (Value::Map(new_map), Value::Map(old_map)) => {
            let nested = diff(new_map, old_map, options);
            if nested.is_empty() {
                None
            } else {
                Some(Change::Nested(nested))
            }
        }
        (Value::Map(_), _) | (_, Value::Map(_)) => Some(Change::Set(new.clone())),
        (Value::Opaque(a), Value::Opaque(b)) => {
            if options.object_comparer.equals(a, b) {
                None
            } else {
                Some(Change::Set(new.clone()))
            }
        }
        _ if new == old => None,
        _ => Some(Change::Set(new.clone())),
    }
}

/// Apply `diff` on top of `base`, returning the new state.
///
/// Keys of `base` the diff does not mention are kept as they are.
pub fn diff_apply(base: &RecordState, diff: &DiffMap) -> RecordState {
    let mut out = base.clone();
    apply_in_place(&mut out, diff);
    out
}

/// Apply `diff` onto `target` without cloning it first.
pub fn apply_in_place(target: &mut RecordState, diff: &DiffMap) {
    for (key, change) in diff {
        match change {
            Change::Deleted => {
                target.shift_remove(key);
            }
            Change::Set(value) => {
                target.insert(key.clone(), value.clone());
            }
            Change::Nested(nested) => {
                let slot = target
                    .entry(key.clone())
                    .or_insert_with(|| Value::Map(RecordState::new()));
                if !slot.is_map() {
                    *slot = Value::Map(RecordState::new());
                }
                if let Value::Map(inner) = slot {
                    apply_in_place(inner, nested);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::EqualityPolicy;
    use crate::types::{state_from_json, Key};
    use serde_json::json;

    #[derive(Debug, serde::Serialize)]
    struct Moment(i64);

    fn state(json: serde_json::Value) -> RecordState {
        state_from_json(json).unwrap()
    }

    fn key(k: &str) -> Key {
        Key::from(k)
    }

    #[test]
    fn test_identical_states_have_empty_diff() {
        let s = state(json!({"a": 1, "b": {"c": [1, 2, {"d": null}]}}));
        assert!(diff(&s, &s, &DiffOptions::default()).is_empty());
    }

    #[test]
    fn test_nested_change_is_nested_diff() {
        let old = state(json!({"a": 1, "b": {"c": 2, "e": 5}}));
        let new = state(json!({"a": 1, "b": {"c": 3, "e": 5}}));

        let d = diff(&new, &old, &DiffOptions::default());

        assert_eq!(d.len(), 1);
        let b = d.get(&key("b")).and_then(Change::as_nested).unwrap();
        assert_eq!(b.len(), 1);
        assert_eq!(b.get(&key("c")), Some(&Change::Set(Value::Int(3))));
    }

    #[test]
    fn test_added_map_is_emitted_whole() {
        let old = state(json!({}));
        let new = state(json!({"b": {"c": 1}}));

        let d = diff(&new, &old, &DiffOptions::default());

        let b = d.get(&key("b")).and_then(Change::as_value).unwrap();
        assert_eq!(b, &Value::from(json!({"c": 1})));
    }

    #[test]
    fn test_removed_key_is_deleted_not_omitted() {
        let old = state(json!({"a": 1, "b": 2}));
        let new = state(json!({"b": 2}));

        let d = diff(&new, &old, &DiffOptions::default());

        assert_eq!(d.get(&key("a")), Some(&Change::Deleted));
        assert!(!d.contains_key(&key("b")));
    }

    #[test]
    fn test_null_is_not_deletion() {
        let old = state(json!({"a": 1}));
        let new = state(json!({"a": null}));

        let d = diff(&new, &old, &DiffOptions::default());
        assert_eq!(d.get(&key("a")), Some(&Change::Set(Value::Null)));
    }

    #[test]
    fn test_type_mismatch_replaces_verbatim() {
        let old = state(json!({"a": {"x": 1}, "b": 1}));
        let new = state(json!({"a": 1, "b": {"x": 1}}));

        let d = diff(&new, &old, &DiffOptions::default());

        assert_eq!(d.get(&key("a")), Some(&Change::Set(Value::Int(1))));
        assert_eq!(
            d.get(&key("b")),
            Some(&Change::Set(Value::from(json!({"x": 1}))))
        );
    }

    #[test]
    fn test_int_and_float_are_distinct() {
        let old = state(json!({"a": 1}));
        let new = state(json!({"a": 1.0}));

        let d = diff(&new, &old, &DiffOptions::default());
        assert_eq!(d.get(&key("a")), Some(&Change::Set(Value::Float(1.0))));
    }

    #[test]
    fn test_opaque_default_policy_always_replaces() {
        let moment = Value::opaque(Moment(1));
        let mut old = RecordState::new();
        old.insert(key("at"), moment.clone());
        let new = old.clone();

        let d = diff(&new, &old, &DiffOptions::default());
        assert_eq!(d.get(&key("at")), Some(&Change::Set(moment)));
    }

    #[test]
    fn test_opaque_custom_policy_decides() {
        let options = DiffOptions::with_comparer(EqualityPolicy::custom(|a, b| {
            match (a.downcast_ref::<Moment>(), b.downcast_ref::<Moment>()) {
                (Some(a), Some(b)) => a.0 == b.0,
                _ => false,
            }
        }));

        let mut old = RecordState::new();
        old.insert(key("at"), Value::opaque(Moment(1)));
        let mut same = RecordState::new();
        same.insert(key("at"), Value::opaque(Moment(1)));
        let mut later = RecordState::new();
        later.insert(key("at"), Value::opaque(Moment(2)));

        assert!(diff(&same, &old, &options).is_empty());
        assert_eq!(diff(&later, &old, &options).len(), 1);
    }

    #[test]
    fn test_order_new_keys_then_deleted() {
        let old = state(json!({"x": 1, "a": 1}));
        let new = state(json!({"b": 2, "a": 2}));

        let d = diff(&new, &old, &DiffOptions::default());
        let keys: Vec<_> = d.keys().cloned().collect();
        assert_eq!(keys, vec![key("b"), key("a"), key("x")]);
    }

    #[test]
    fn test_apply_reconstructs_new() {
        let old = state(json!({"a": 1, "b": {"c": 2, "d": [1, 2]}, "gone": true}));
        let new = state(json!({"a": 1, "b": {"c": 3, "d": [1]}, "fresh": {"x": null}}));

        let d = diff(&new, &old, &DiffOptions::default());
        assert_eq!(diff_apply(&old, &d), new);
    }

    #[test]
    fn test_apply_nested_onto_missing_or_scalar() {
        let base = state(json!({"a": 5}));
        let patch = DiffMap::at_path(&[key("a")], key("b"), Change::set(1));
        let patch_missing = DiffMap::at_path(&[key("z")], key("b"), Change::set(1));

        assert_eq!(diff_apply(&base, &patch), state(json!({"a": {"b": 1}})));
        assert_eq!(
            diff_apply(&base, &patch_missing),
            state(json!({"a": 5, "z": {"b": 1}}))
        );
    }

    #[test]
    fn test_apply_deleting_absent_key_is_noop() {
        let base = state(json!({"a": 1}));
        let patch = DiffMap::at_path(&[], key("missing"), Change::Deleted);
        assert_eq!(diff_apply(&base, &patch), base);
    }
}

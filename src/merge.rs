use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

/// Shallow field-overwrite merge used as the default batch reducer.
///
/// The accumulator starts empty; each queued payload is folded in arrival
/// order, so on key conflicts the later payload wins.
pub trait Coalesce: Sized {
    /// Folds `next` into the accumulator.
    fn coalesce(acc: Option<Self>, next: Self) -> Self;
}

impl Coalesce for Value {
    /// Objects merge field by field; any other value replaces the accumulator.
    fn coalesce(acc: Option<Self>, next: Self) -> Self {
        match (acc, next) {
            (Some(Value::Object(mut base)), Value::Object(patch)) => {
                for (key, value) in patch {
                    base.insert(key, value);
                }
                Value::Object(base)
            }
            (_, next) => next,
        }
    }
}

impl<K: Ord, V> Coalesce for BTreeMap<K, V> {
    fn coalesce(acc: Option<Self>, next: Self) -> Self {
        match acc {
            Some(mut base) => {
                base.extend(next);
                base
            }
            None => next,
        }
    }
}

impl<K: Eq + Hash, V> Coalesce for HashMap<K, V> {
    fn coalesce(acc: Option<Self>, next: Self) -> Self {
        match acc {
            Some(mut base) => {
                base.extend(next);
                base
            }
            None => next,
        }
    }
}

//! Identity keys and the deduplicate-or-conflict rule.
//!
//! Each output type declares what makes two values "the same thing" and
//! whether an identical repeat may be dropped silently. `reduce_to_unique` is
//! the only way final collections get built, so nothing downstream ever sees
//! two different values under one key.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

use crate::core::errors::PrefetchError;

/// Per-type identity policy.
pub trait Unique: Debug + PartialEq {
    /// The identity key.
    type Key: Eq + Hash + Debug;

    /// Whether a value-equal repeat of a key is dropped instead of rejected.
    ///
    /// Package types set this to `false`: a package must never be resolved
    /// twice, even with identical inputs.
    const DEDUPE: bool;

    /// Human-readable kind, used in conflict messages.
    const KIND: &'static str;

    /// Extract the identity key.
    fn unique_key(&self) -> Self::Key;
}

/// Reduce `items` to one value per key, keeping first-seen order.
///
/// A repeated key is skipped when `T::DEDUPE` holds and both values are
/// equal. Any other repeat is a conflict.
pub fn reduce_to_unique<T: Unique>(
    items: impl IntoIterator<Item = T>,
) -> Result<Vec<T>, PrefetchError> {
    let mut seen: HashMap<T::Key, usize> = HashMap::new();
    let mut unique: Vec<T> = Vec::new();

    for item in items {
        let key = item.unique_key();
        match seen.get(&key).copied() {
            None => {
                seen.insert(key, unique.len());
                unique.push(item);
            }
            Some(index) => {
                let prev = &unique[index];
                if T::DEDUPE && *prev == item {
                    tracing::debug!("dropping duplicate {} {:?}", T::KIND, key);
                    continue;
                }
                return Err(conflict::<T>(&key, prev, &item));
            }
        }
    }

    Ok(unique)
}

fn conflict<T: Unique>(key: &T::Key, first: &T, second: &T) -> PrefetchError {
    let key = format!("{:?}", key);
    let first = format!("{:?}", first);
    let second = format!("{:?}", second);

    if T::DEDUPE {
        PrefetchError::DuplicateResourceConflict {
            kind: T::KIND,
            key,
            first,
            second,
        }
    } else {
        PrefetchError::DuplicatePackageConflict { key, first, second }
    }
}

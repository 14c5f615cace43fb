//! Three-layer range merge.
//!
//! Precedence, lowest to highest: committed state, in-flight versions of
//! lower indices, the attempt's own buffer. A tombstone in a higher layer
//! hides the key. The output is always an owned, ascending snapshot.

use std::collections::BTreeMap;

use crate::mvcc::LayerEntry;
use crate::store::{Key, Value};

pub(crate) fn merge_range<'a>(
    committed: Vec<(Key, Value)>,
    layer: &[LayerEntry],
    buffered: impl Iterator<Item = (&'a Key, &'a Option<Value>)>,
) -> Vec<(Key, Value)> {
    let mut merged: BTreeMap<Key, Option<Value>> = committed
        .into_iter()
        .map(|(key, value)| (key, Some(value)))
        .collect();

    for entry in layer {
        merged.insert(entry.key.clone(), entry.value.clone());
    }
    for (key, write) in buffered {
        merged.insert(key.clone(), write.clone());
    }

    merged
        .into_iter()
        .filter_map(|(key, value)| value.map(|value| (key, value)))
        .collect()
}

//! Private writes of one attempt. Nothing here is visible to any other
//! attempt until the scheduler publishes it.

use std::collections::BTreeMap;
use std::ops::Bound;

use crate::store::{Key, KeyRange, Value};

/// Key-ordered buffered writes: `Some(value)` or `None` for a delete.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WriteBuffer {
    entries: BTreeMap<Key, Option<Value>>,
}

impl WriteBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// `Some(write)` if the attempt wrote `key`; `write` is `None` for a delete.
    pub fn get(&self, key: &[u8]) -> Option<&Option<Value>> {
        self.entries.get(key)
    }

    pub fn set(&mut self, key: &[u8], value: &[u8]) {
        self.entries.insert(key.to_vec(), Some(value.to_vec()));
    }

    pub fn delete(&mut self, key: &[u8]) {
        self.entries.insert(key.to_vec(), None);
    }

    /// Buffered writes inside `range`, ascending.
    pub fn range<'a>(
        &'a self,
        range: &'a KeyRange,
    ) -> impl Iterator<Item = (&'a Key, &'a Option<Value>)> + 'a {
        let bounds = if range.is_empty() {
            None
        } else {
            Some((
                range.start().map_or(Bound::Unbounded, Bound::Included),
                range.end().map_or(Bound::Unbounded, Bound::Excluded),
            ))
        };
        bounds
            .into_iter()
            .flat_map(move |bounds| self.entries.range::<[u8], _>(bounds))
    }

    pub fn keys(&self) -> impl Iterator<Item = &Key> {
        self.entries.keys()
    }

    pub fn entries(&self) -> &BTreeMap<Key, Option<Value>> {
        &self.entries
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_write_wins() {
        let mut buffer = WriteBuffer::new();
        buffer.set(b"k", b"1");
        buffer.delete(b"k");
        assert_eq!(buffer.get(b"k"), Some(&None));

        buffer.set(b"k", b"2");
        assert_eq!(buffer.get(b"k"), Some(&Some(b"2".to_vec())));
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_range_is_half_open() {
        let mut buffer = WriteBuffer::new();
        for key in [b"a", b"b", b"c", b"d"] {
            buffer.set(key, b"v");
        }
        let range = KeyRange::new(Some(b"b"), Some(b"d"));
        let keys: Vec<_> = buffer.range(&range).map(|(k, _)| k.clone()).collect();
        assert_eq!(keys, vec![b"b".to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn test_empty_range_yields_nothing() {
        let mut buffer = WriteBuffer::new();
        buffer.set(b"m", b"v");
        let inverted = KeyRange::new(Some(b"z"), Some(b"a"));
        assert_eq!(buffer.range(&inverted).count(), 0);
    }
}

//! Version - one transaction's entry for one key
//!
//! - A version is written by exactly one (index, incarnation)
//! - Its payload is a value, an explicit tombstone, or an estimate
//! - An estimate is a placeholder: a later incarnation of the same index
//!   will overwrite it, so readers must not treat it as final

use std::fmt;

use crate::store::Value;

/// Position of a transaction inside its block.
pub type TxnIndex = u32;

/// Execution attempt number of a transaction within one block.
pub type Incarnation = u32;

/// Identity of one execution attempt: `(index, incarnation)`.
///
/// Ordering is by index first, then incarnation.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TxnVersion {
    pub index: TxnIndex,
    pub incarnation: Incarnation,
}

impl TxnVersion {
    #[inline]
    pub fn new(index: TxnIndex, incarnation: Incarnation) -> Self {
        Self { index, incarnation }
    }
}

impl fmt::Display for TxnVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.index, self.incarnation)
    }
}

/// The payload of a version.
///
/// Tombstone and Estimate are explicit variants, NOT represented via Option.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VersionPayload {
    Value(Value),
    Tombstone,
    Estimate,
}

impl VersionPayload {
    #[inline]
    pub fn is_estimate(&self) -> bool {
        matches!(self, VersionPayload::Estimate)
    }

    #[inline]
    pub fn is_tombstone(&self) -> bool {
        matches!(self, VersionPayload::Tombstone)
    }

    /// Buffered write form: `Some(value)` or `None` for a delete.
    pub fn from_write(write: Option<Value>) -> Self {
        match write {
            Some(value) => VersionPayload::Value(value),
            None => VersionPayload::Tombstone,
        }
    }
}

/// A single version of a key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Version {
    version: TxnVersion,
    payload: VersionPayload,
}

impl Version {
    pub fn new(version: TxnVersion, payload: VersionPayload) -> Self {
        Self { version, payload }
    }

    pub fn estimate(version: TxnVersion) -> Self {
        Self::new(version, VersionPayload::Estimate)
    }

    #[inline]
    pub fn txn_version(&self) -> TxnVersion {
        self.version
    }

    #[inline]
    pub fn index(&self) -> TxnIndex {
        self.version.index
    }

    #[inline]
    pub fn payload(&self) -> &VersionPayload {
        &self.payload
    }

    #[inline]
    pub fn is_estimate(&self) -> bool {
        self.payload.is_estimate()
    }

    /// Turn this version into an estimate, keeping its identity.
    pub(crate) fn mark_estimate(&mut self) {
        self.payload = VersionPayload::Estimate;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_txn_version_ordering() {
        assert!(TxnVersion::new(1, 5) < TxnVersion::new(2, 0));
        assert!(TxnVersion::new(2, 0) < TxnVersion::new(2, 1));
    }

    #[test]
    fn test_txn_version_display() {
        assert_eq!(TxnVersion::new(7, 2).to_string(), "7.2");
    }

    #[test]
    fn test_payload_from_write() {
        assert_eq!(
            VersionPayload::from_write(Some(b"v".to_vec())),
            VersionPayload::Value(b"v".to_vec())
        );
        assert!(VersionPayload::from_write(None).is_tombstone());
    }

    #[test]
    fn test_mark_estimate_keeps_identity() {
        let mut version = Version::new(TxnVersion::new(3, 1), VersionPayload::Value(vec![1]));
        version.mark_estimate();

        assert!(version.is_estimate());
        assert_eq!(version.txn_version(), TxnVersion::new(3, 1));
    }
}

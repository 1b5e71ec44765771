use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{LedgerError, ProvenanceError};
use crate::record::RecordKind;

/// Key-space a ledger entry lives in. Each namespace gets its own key prefix
/// so identical IDs of different kinds never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    Provenance,
    Record(RecordKind),
    QrLink,
    Trace,
    /// Off-chain document submitted with a record.
    Document(RecordKind),
}

impl Namespace {
    fn prefix(self) -> &'static str {
        match self {
            Namespace::Provenance => "BATCH",
            Namespace::Record(RecordKind::CollectionEvent) => "EVENT",
            Namespace::Record(RecordKind::QualityTest) => "TEST",
            Namespace::Record(RecordKind::ProcessingStep) => "STEP",
            Namespace::Record(RecordKind::Certification) => "CERT",
            Namespace::QrLink => "QR",
            Namespace::Trace => "TRACE",
            Namespace::Document(RecordKind::CollectionEvent) => "DOC_EVENT",
            Namespace::Document(RecordKind::QualityTest) => "DOC_TEST",
            Namespace::Document(RecordKind::ProcessingStep) => "DOC_STEP",
            Namespace::Document(RecordKind::Certification) => "DOC_CERT",
        }
    }
}

/// Namespaced ledger key, stored as `<PREFIX>_<id>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LedgerKey {
    pub namespace: Namespace,
    pub id: String,
}

impl LedgerKey {
    pub fn provenance(batch_id: impl Into<String>) -> Self {
        Self {
            namespace: Namespace::Provenance,
            id: batch_id.into(),
        }
    }

    pub fn record(kind: RecordKind, record_id: impl Into<String>) -> Self {
        Self {
            namespace: Namespace::Record(kind),
            id: record_id.into(),
        }
    }

    pub fn qr_link(qr_code: impl Into<String>) -> Self {
        Self {
            namespace: Namespace::QrLink,
            id: qr_code.into(),
        }
    }

    pub fn trace(batch_id: impl Into<String>) -> Self {
        Self {
            namespace: Namespace::Trace,
            id: batch_id.into(),
        }
    }

    pub fn document(kind: RecordKind, record_id: impl Into<String>) -> Self {
        Self {
            namespace: Namespace::Document(kind),
            id: record_id.into(),
        }
    }

    /// The string the underlying ledger stores this entry under.
    pub fn encode(&self) -> String {
        format!("{}_{}", self.namespace.prefix(), self.id)
    }
}

impl std::fmt::Display for LedgerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}", self.namespace.prefix(), self.id)
    }
}

/// One unit of work against the ledger.
///
/// A `put` is visible to later `get`s on the same transaction. Nothing is
/// visible to other transactions until `commit`; dropping an uncommitted
/// transaction discards its writes.
pub trait LedgerTxn {
    fn get(&self, key: &LedgerKey) -> Result<Option<Vec<u8>>, LedgerError>;

    fn put(&mut self, key: &LedgerKey, value: Vec<u8>) -> Result<(), LedgerError>;

    fn exists(&self, key: &LedgerKey) -> Result<bool, LedgerError> {
        Ok(self.get(key)?.is_some())
    }

    fn commit(self) -> Result<(), LedgerError>
    where
        Self: Sized;
}

/// The external key-value ledger.
pub trait Ledger: Send + Sync {
    type Txn: LedgerTxn;

    fn begin(&self) -> Result<Self::Txn, LedgerError>;
}

/// Read and decode an entry, `None` if absent.
pub fn read_record<T, X>(txn: &X, key: &LedgerKey) -> Result<Option<T>, ProvenanceError>
where
    T: DeserializeOwned,
    X: LedgerTxn + ?Sized,
{
    match txn.get(key)? {
        Some(bytes) => serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| ProvenanceError::Deserialization {
                key: key.clone(),
                source,
            }),
        None => Ok(None),
    }
}

/// Read and decode an entry that must exist.
pub fn require_record<T, X>(txn: &X, key: &LedgerKey) -> Result<T, ProvenanceError>
where
    T: DeserializeOwned,
    X: LedgerTxn + ?Sized,
{
    read_record(txn, key)?.ok_or_else(|| ProvenanceError::NotFound(key.clone()))
}

/// Encode and write an entry, replacing any previous value.
pub fn write_record<T, X>(txn: &mut X, key: &LedgerKey, value: &T) -> Result<(), ProvenanceError>
where
    T: Serialize,
    X: LedgerTxn + ?Sized,
{
    let bytes = serde_json::to_vec(value).map_err(|source| ProvenanceError::Serialization {
        key: key.clone(),
        source,
    })?;
    txn.put(key, bytes)?;
    Ok(())
}

/// Write an entry that must not exist yet.
pub fn insert_record<T, X>(txn: &mut X, key: &LedgerKey, value: &T) -> Result<(), ProvenanceError>
where
    T: Serialize,
    X: LedgerTxn + ?Sized,
{
    if txn.exists(key)? {
        return Err(ProvenanceError::DuplicateKey(key.clone()));
    }
    write_record(txn, key, value)
}

// In-memory implementation for testing
#[cfg(any(test, feature = "test-utils"))]
pub mod memory {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, RwLock};

    #[derive(Default)]
    struct Shared {
        entries: RwLock<HashMap<String, Vec<u8>>>,
        reject_writes: AtomicBool,
    }

    /// In-memory ledger for testing. Clones share the same entries.
    #[derive(Clone, Default)]
    pub struct InMemoryLedger {
        shared: Arc<Shared>,
    }

    impl InMemoryLedger {
        pub fn new() -> Self {
            Self::default()
        }

        /// Raw committed bytes under a key.
        pub fn raw(&self, key: &LedgerKey) -> Option<Vec<u8>> {
            self.shared
                .entries
                .read()
                .unwrap()
                .get(&key.encode())
                .cloned()
        }

        /// Overwrite committed bytes directly, bypassing any checks.
        pub fn insert_raw(&self, key: &LedgerKey, value: impl Into<Vec<u8>>) {
            self.shared
                .entries
                .write()
                .unwrap()
                .insert(key.encode(), value.into());
        }

        pub fn len(&self) -> usize {
            self.shared.entries.read().unwrap().len()
        }

        pub fn is_empty(&self) -> bool {
            self.len() == 0
        }

        /// Make every subsequent `put` fail, to exercise adapter errors.
        pub fn reject_writes(&self, reject: bool) {
            self.shared.reject_writes.store(reject, Ordering::SeqCst);
        }
    }

    impl Ledger for InMemoryLedger {
        type Txn = InMemoryTxn;

        fn begin(&self) -> Result<InMemoryTxn, LedgerError> {
            Ok(InMemoryTxn {
                shared: self.shared.clone(),
                pending: HashMap::new(),
            })
        }
    }

    pub struct InMemoryTxn {
        shared: Arc<Shared>,
        pending: HashMap<String, Vec<u8>>,
    }

    impl LedgerTxn for InMemoryTxn {
        fn get(&self, key: &LedgerKey) -> Result<Option<Vec<u8>>, LedgerError> {
            let encoded = key.encode();
            if let Some(value) = self.pending.get(&encoded) {
                return Ok(Some(value.clone()));
            }
            Ok(self.shared.entries.read().unwrap().get(&encoded).cloned())
        }

        fn put(&mut self, key: &LedgerKey, value: Vec<u8>) -> Result<(), LedgerError> {
            if self.shared.reject_writes.load(Ordering::SeqCst) {
                return Err(LedgerError::Write {
                    key: key.encode(),
                    reason: "ledger is rejecting writes".to_string(),
                });
            }
            self.pending.insert(key.encode(), value);
            Ok(())
        }

        fn commit(self) -> Result<(), LedgerError> {
            self.shared.entries.write().unwrap().extend(self.pending);
            Ok(())
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_put_visible_within_txn_only() {
            let ledger = InMemoryLedger::new();
            let key = LedgerKey::provenance("B1");

            let mut txn = ledger.begin().unwrap();
            txn.put(&key, b"one".to_vec()).unwrap();
            assert_eq!(txn.get(&key).unwrap(), Some(b"one".to_vec()));
            assert!(ledger.raw(&key).is_none());

            txn.commit().unwrap();
            assert_eq!(ledger.raw(&key), Some(b"one".to_vec()));
        }

        #[test]
        fn test_dropped_txn_discards_writes() {
            let ledger = InMemoryLedger::new();
            {
                let mut txn = ledger.begin().unwrap();
                txn.put(&LedgerKey::provenance("B1"), b"x".to_vec()).unwrap();
            }
            assert!(ledger.is_empty());
        }

        #[test]
        fn test_reject_writes() {
            let ledger = InMemoryLedger::new();
            ledger.reject_writes(true);
            let mut txn = ledger.begin().unwrap();
            let err = txn.put(&LedgerKey::qr_link("Q1"), Vec::new()).unwrap_err();
            assert!(matches!(err, LedgerError::Write { ref key, .. } if key == "QR_Q1"));
        }
    }
}

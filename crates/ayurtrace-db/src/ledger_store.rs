use std::sync::Arc;

use redb::{Database, ReadableTable, WriteTransaction};

use ayurtrace_core::{Ledger, LedgerError, LedgerKey, LedgerTxn};

use crate::tables::LEDGER_TABLE;

/// redb implementation of Ledger.
pub struct RedbLedger {
    db: Arc<Database>,
}

impl RedbLedger {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Initialize the database tables.
    pub fn init_tables(db: &Database) -> Result<(), LedgerError> {
        let write_txn = db
            .begin_write()
            .map_err(|e| LedgerError::Transaction(e.to_string()))?;
        {
            let _ = write_txn
                .open_table(LEDGER_TABLE)
                .map_err(|e| LedgerError::Transaction(e.to_string()))?;
        }
        write_txn
            .commit()
            .map_err(|e| LedgerError::Transaction(e.to_string()))?;
        Ok(())
    }
}

impl Ledger for RedbLedger {
    type Txn = RedbTxn;

    fn begin(&self) -> Result<RedbTxn, LedgerError> {
        let txn = self
            .db
            .begin_write()
            .map_err(|e| LedgerError::Transaction(e.to_string()))?;
        Ok(RedbTxn { txn })
    }
}

/// A redb write transaction. Dropping it without `commit` aborts.
pub struct RedbTxn {
    txn: WriteTransaction,
}

impl LedgerTxn for RedbTxn {
    fn get(&self, key: &LedgerKey) -> Result<Option<Vec<u8>>, LedgerError> {
        let encoded = key.encode();
        let read_err = |e: &dyn std::fmt::Display| LedgerError::Read {
            key: encoded.clone(),
            reason: e.to_string(),
        };

        let table = self
            .txn
            .open_table(LEDGER_TABLE)
            .map_err(|e| read_err(&e))?;
        let value = table
            .get(encoded.as_str())
            .map_err(|e| read_err(&e))?
            .map(|v| v.value().to_vec());
        Ok(value)
    }

    fn put(&mut self, key: &LedgerKey, value: Vec<u8>) -> Result<(), LedgerError> {
        let encoded = key.encode();
        let write_err = |e: &dyn std::fmt::Display| LedgerError::Write {
            key: encoded.clone(),
            reason: e.to_string(),
        };

        let mut table = self
            .txn
            .open_table(LEDGER_TABLE)
            .map_err(|e| write_err(&e))?;
        table
            .insert(encoded.as_str(), value.as_slice())
            .map_err(|e| write_err(&e))?;
        Ok(())
    }

    fn commit(self) -> Result<(), LedgerError> {
        self.txn
            .commit()
            .map_err(|e| LedgerError::Transaction(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ayurtrace_core::{
        FixedClock, GeoFence, NewQualityTest, ProvenanceError, ProvenanceService, ProvenanceStatus,
        RecordKind, Validator,
    };
    use tempfile::{tempdir, TempDir};

    fn create_test_db() -> (TempDir, Arc<Database>) {
        let dir = tempdir().unwrap();
        let db = Database::create(dir.path().join("test.redb")).unwrap();
        RedbLedger::init_tables(&db).unwrap();
        (dir, Arc::new(db))
    }

    #[test]
    fn test_put_and_get() {
        let (_dir, db) = create_test_db();
        let ledger = RedbLedger::new(db);
        let key = LedgerKey::provenance("B1");

        let mut txn = ledger.begin().unwrap();
        assert!(!txn.exists(&key).unwrap());
        txn.put(&key, b"{}".to_vec()).unwrap();
        assert_eq!(txn.get(&key).unwrap(), Some(b"{}".to_vec()));
        txn.commit().unwrap();

        let txn = ledger.begin().unwrap();
        assert_eq!(txn.get(&key).unwrap(), Some(b"{}".to_vec()));
    }

    #[test]
    fn test_uncommitted_writes_discarded() {
        let (_dir, db) = create_test_db();
        let ledger = RedbLedger::new(db);
        let key = LedgerKey::qr_link("Q1");

        {
            let mut txn = ledger.begin().unwrap();
            txn.put(&key, b"x".to_vec()).unwrap();
        }

        let txn = ledger.begin().unwrap();
        assert!(txn.get(&key).unwrap().is_none());
    }

    #[test]
    fn test_namespaces_do_not_collide() {
        let (_dir, db) = create_test_db();
        let ledger = RedbLedger::new(db);

        let mut txn = ledger.begin().unwrap();
        txn.put(&LedgerKey::record(RecordKind::CollectionEvent, "X"), b"event".to_vec())
            .unwrap();
        txn.put(&LedgerKey::record(RecordKind::QualityTest, "X"), b"test".to_vec())
            .unwrap();
        txn.commit().unwrap();

        let txn = ledger.begin().unwrap();
        assert_eq!(
            txn.get(&LedgerKey::record(RecordKind::CollectionEvent, "X"))
                .unwrap(),
            Some(b"event".to_vec())
        );
        assert_eq!(
            txn.get(&LedgerKey::record(RecordKind::QualityTest, "X"))
                .unwrap(),
            Some(b"test".to_vec())
        );
    }

    #[test]
    fn test_service_over_redb() {
        let (_dir, db) = create_test_db();
        let service = ProvenanceService::new(
            RedbLedger::new(db),
            Validator::new(GeoFence::default()),
            Arc::new(FixedClock::new(1_000)),
        );

        service.create_provenance("BATCH1").unwrap();
        service
            .record_quality_test(NewQualityTest {
                test_id: "T1".to_string(),
                lab_id: "LAB1".to_string(),
                batch_id: "BATCH1".to_string(),
                report_hash: "hash123".to_string(),
                test_type: "pesticide".to_string(),
                result: true,
            })
            .unwrap();
        service
            .transition_status("BATCH1", ProvenanceStatus::Completed)
            .unwrap();

        let provenance = service.get_provenance("BATCH1").unwrap();
        assert_eq!(provenance.quality_tests, ["T1"]);
        assert_eq!(provenance.status, ProvenanceStatus::Completed);
        assert_eq!(service.get_provenance_trace("BATCH1").unwrap().len(), 3);
        assert!(matches!(
            service.create_provenance("BATCH1").unwrap_err(),
            ProvenanceError::AlreadyExists(_)
        ));
    }
}

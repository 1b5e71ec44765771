use redb::TableDefinition;

/// Table holding every ledger entry.
/// Key: namespaced ledger key, e.g. "BATCH_B1" or "TEST_T1"
/// Value: JSON-encoded record bytes
pub const LEDGER_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("ledger");

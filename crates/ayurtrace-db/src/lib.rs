//! AyurTrace DB - redb implementation of the ledger adapter.

pub mod ledger_store;
pub mod tables;

pub use ledger_store::{RedbLedger, RedbTxn};

use std::path::Path;
use std::sync::Arc;

use redb::Database;

use ayurtrace_core::LedgerError;

/// Open (or create) a database with all required tables.
pub fn init_database(path: impl AsRef<Path>) -> Result<Arc<Database>, LedgerError> {
    let db = Database::create(path).map_err(|e| LedgerError::Transaction(e.to_string()))?;

    RedbLedger::init_tables(&db)?;

    Ok(Arc::new(db))
}

use thiserror::Error;

use crate::ledger::LedgerKey;
use crate::record::{ProvenanceStatus, RecordKind};

#[derive(Error, Debug)]
pub enum ProvenanceError {
    #[error("Not found: {0}")]
    NotFound(LedgerKey),

    #[error("Provenance already exists for batch {0}")]
    AlreadyExists(String),

    #[error("Duplicate key: {0}")]
    DuplicateKey(LedgerKey),

    #[error("{kind} {record_id} is already attached to batch {batch_id}")]
    Duplicate {
        batch_id: String,
        kind: RecordKind,
        record_id: String,
    },

    #[error("{kind} {record_id} belongs to batch {owner}, not {batch_id}")]
    BatchMismatch {
        batch_id: String,
        kind: RecordKind,
        record_id: String,
        owner: String,
    },

    #[error("Invalid status transition for batch {batch_id}: {from} -> {to}")]
    InvalidTransition {
        batch_id: String,
        from: ProvenanceStatus,
        to: ProvenanceStatus,
    },

    #[error("Failed to decode {key}: {source}")]
    Deserialization {
        key: LedgerKey,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to encode {key}: {source}")]
    Serialization {
        key: LedgerKey,
        #[source]
        source: serde_json::Error,
    },

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

/// Failure reported by the underlying key-value ledger.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Ledger read failed for {key}: {reason}")]
    Read { key: String, reason: String },

    #[error("Ledger write failed for {key}: {reason}")]
    Write { key: String, reason: String },

    #[error("Ledger transaction failed: {0}")]
    Transaction(String),
}

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Invalid latitude {0}: must be between -90 and 90")]
    InvalidLatitude(f64),

    #[error("Invalid longitude {0}: must be between -180 and 180")]
    InvalidLongitude(f64),

    #[error("Invalid geo-zone {0:?}: expected \"lat,lon\"")]
    InvalidZone(String),

    #[error("Invalid season entry {0:?}: expected \"crop:start-end\"")]
    InvalidSeasonEntry(String),

    #[error("Invalid month {0}: must be between 1 and 12")]
    InvalidMonth(u32),

    #[error("Invalid record ID: {0}")]
    InvalidRecordId(String),
}

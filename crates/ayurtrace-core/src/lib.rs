//! AyurTrace Core - Provenance records, validation and ledger service.
//!
//! Batches of harvested produce are tracked through immutable records
//! (collection events, quality tests, processing steps, certifications)
//! referenced from a per-batch provenance aggregate. Storage is abstracted
//! behind the [`Ledger`] trait; this crate has no dependencies on other
//! AyurTrace crates.

pub mod clock;
pub mod error;
pub mod ledger;
pub mod record;
pub mod service;
pub mod validation;

// Re-exports for convenience
pub use clock::{Clock, SystemClock};
pub use error::{LedgerError, ProvenanceError, ValidationError};
pub use ledger::{Ledger, LedgerKey, LedgerTxn, Namespace};
pub use record::{
    Certification, CollectionEvent, NewCertification, NewCollectionEvent, NewProcessingStep,
    NewQualityTest, ProcessingStep, Provenance, ProvenanceStatus, QrLink, QualityTest, RecordKind,
    TraceEntry, TraceEvent,
};
pub use service::{OffChainDocuments, ProvenanceReport, ProvenanceService, QrVerification};
pub use validation::{AnySeason, GeoFence, MonthWindow, SeasonCalendar, SeasonPolicy, Validator};

#[cfg(any(test, feature = "test-utils"))]
pub use clock::FixedClock;
#[cfg(any(test, feature = "test-utils"))]
pub use ledger::memory::{InMemoryLedger, InMemoryTxn};

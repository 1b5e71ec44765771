use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use crate::clock::Clock;
use crate::error::ProvenanceError;
use crate::ledger::{
    insert_record, read_record, require_record, write_record, Ledger, LedgerKey, LedgerTxn,
};
use crate::record::{
    Certification, CollectionEvent, NewCertification, NewCollectionEvent, NewProcessingStep,
    NewQualityTest, ProcessingStep, Provenance, ProvenanceStatus, QrLink, QualityTest, RecordKind,
    TraceEntry, TraceEvent,
};
use crate::validation::Validator;

/// A provenance aggregate with every referenced record resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvenanceReport {
    pub provenance: Provenance,
    pub collection_events: Vec<CollectionEvent>,
    pub quality_tests: Vec<QualityTest>,
    pub processing_steps: Vec<ProcessingStep>,
    /// Validity reconciled at report time.
    pub certifications: Vec<Certification>,
    pub trace: Vec<TraceEntry>,
    pub documents: OffChainDocuments,
}

/// Off-chain documents stored alongside a batch's records, keyed by record
/// ID. Records submitted with only a hash have no entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OffChainDocuments {
    pub collection_events: BTreeMap<String, serde_json::Value>,
    pub quality_tests: BTreeMap<String, serde_json::Value>,
}

/// Outcome of a consumer QR lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QrVerification {
    pub link: QrLink,
    pub provenance: Provenance,
    pub documents: OffChainDocuments,
    pub current_hash: String,
    /// The batch is unchanged since the link was created.
    pub snapshot_current: bool,
    /// Active link, unchanged snapshot, batch not recalled.
    pub verified: bool,
}

/// Creates and links provenance records on top of a [`Ledger`].
///
/// Every public operation runs in its own ledger transaction and either
/// commits all of its writes or none.
pub struct ProvenanceService<L: Ledger> {
    ledger: L,
    validator: Validator,
    clock: Arc<dyn Clock>,
}

impl<L: Ledger> ProvenanceService<L> {
    pub fn new(ledger: L, validator: Validator, clock: Arc<dyn Clock>) -> Self {
        Self {
            ledger,
            validator,
            clock,
        }
    }

    /// Record a harvest. The event is not attached to any batch; use
    /// [`attach_record`](Self::attach_record) for that.
    pub fn record_collection_event(
        &self,
        input: NewCollectionEvent,
    ) -> Result<CollectionEvent, ProvenanceError> {
        self.record_collection_event_with_details(input, None)
    }

    /// Record a harvest and keep the off-chain details document with it.
    pub fn record_collection_event_with_details(
        &self,
        input: NewCollectionEvent,
        details: Option<&serde_json::Value>,
    ) -> Result<CollectionEvent, ProvenanceError> {
        let event = CollectionEvent::record(input, self.clock.as_ref(), &self.validator);
        let key = LedgerKey::record(RecordKind::CollectionEvent, &event.event_id);

        let mut txn = self.ledger.begin()?;
        insert_record(&mut txn, &key, &event).inspect_err(|e| {
            tracing::warn!("Rejected collection event {}: {}", event.event_id, e);
        })?;
        store_document(&mut txn, RecordKind::CollectionEvent, &event.event_id, details)?;
        txn.commit()?;

        if !event.geo_fence_valid {
            tracing::debug!(
                "Collection event {} outside approved zones: {}",
                event.event_id,
                event.geo_coordinates
            );
        }
        if !event.season_valid {
            tracing::debug!(
                "Collection event {} out of season for {}",
                event.event_id,
                event.crop_id
            );
        }
        tracing::info!("Recorded collection event {}", event.event_id);
        Ok(event)
    }

    pub fn record_quality_test(&self, input: NewQualityTest) -> Result<QualityTest, ProvenanceError> {
        self.record_quality_test_with_report(input, None)
    }

    /// Record a lab test and keep the off-chain report with it.
    pub fn record_quality_test_with_report(
        &self,
        input: NewQualityTest,
        report: Option<&serde_json::Value>,
    ) -> Result<QualityTest, ProvenanceError> {
        let test = QualityTest::record(input, self.clock.as_ref());
        self.record_for_batch(
            RecordKind::QualityTest,
            &test.test_id,
            &test.batch_id,
            &test,
            report,
        )?;
        Ok(test)
    }

    pub fn record_processing_step(
        &self,
        input: NewProcessingStep,
    ) -> Result<ProcessingStep, ProvenanceError> {
        let step = ProcessingStep::record(input, self.clock.as_ref());
        self.record_for_batch(
            RecordKind::ProcessingStep,
            &step.step_id,
            &step.batch_id,
            &step,
            None,
        )?;
        Ok(step)
    }

    pub fn issue_certification(
        &self,
        input: NewCertification,
    ) -> Result<Certification, ProvenanceError> {
        let cert = Certification::issue(input, self.clock.as_ref());
        self.record_for_batch(
            RecordKind::Certification,
            &cert.cert_id,
            &cert.batch_id,
            &cert,
            None,
        )?;
        Ok(cert)
    }

    /// Write a leaf record and attach it to its batch in one transaction.
    fn record_for_batch<T: Serialize>(
        &self,
        kind: RecordKind,
        record_id: &str,
        batch_id: &str,
        record: &T,
        document: Option<&serde_json::Value>,
    ) -> Result<(), ProvenanceError> {
        let mut txn = self.ledger.begin()?;
        let result = self.write_and_attach(&mut txn, kind, record_id, batch_id, record, document);
        if let Err(e) = &result {
            tracing::warn!("Rejected {} {}: {}", kind, record_id, e);
        }
        result?;
        txn.commit()?;

        tracing::info!("Recorded {} {} for batch {}", kind, record_id, batch_id);
        Ok(())
    }

    fn write_and_attach<T: Serialize>(
        &self,
        txn: &mut L::Txn,
        kind: RecordKind,
        record_id: &str,
        batch_id: &str,
        record: &T,
        document: Option<&serde_json::Value>,
    ) -> Result<(), ProvenanceError> {
        let batch_key = LedgerKey::provenance(batch_id);
        let mut provenance: Provenance = require_record(&*txn, &batch_key)?;

        insert_record(txn, &LedgerKey::record(kind, record_id), record)?;
        store_document(txn, kind, record_id, document)?;
        append_reference(&mut provenance, kind, record_id)?;
        write_record(txn, &batch_key, &provenance)?;
        self.append_trace(txn, batch_id, attached(kind, record_id))
    }

    /// Append an entry to the batch trace. The trace is created with the batch.
    fn append_trace(
        &self,
        txn: &mut L::Txn,
        batch_id: &str,
        event: TraceEvent,
    ) -> Result<(), ProvenanceError> {
        let key = LedgerKey::trace(batch_id);
        let mut trace: Vec<TraceEntry> = require_record(&*txn, &key)?;
        trace.push(TraceEntry::new(event, self.clock.as_ref()));
        write_record(txn, &key, &trace)
    }

    pub fn create_provenance(&self, batch_id: &str) -> Result<Provenance, ProvenanceError> {
        let key = LedgerKey::provenance(batch_id);
        let mut txn = self.ledger.begin()?;
        if txn.exists(&key)? {
            tracing::warn!("Provenance for batch {} already exists", batch_id);
            return Err(ProvenanceError::AlreadyExists(batch_id.to_string()));
        }

        let provenance = Provenance::new(batch_id, self.clock.as_ref());
        let trace = vec![TraceEntry::new(TraceEvent::Created, self.clock.as_ref())];
        write_record(&mut txn, &key, &provenance)?;
        write_record(&mut txn, &LedgerKey::trace(batch_id), &trace)?;
        txn.commit()?;

        tracing::info!("Created provenance for batch {}", batch_id);
        Ok(provenance)
    }

    pub fn get_provenance(&self, batch_id: &str) -> Result<Provenance, ProvenanceError> {
        let txn = self.ledger.begin()?;
        require_record(&txn, &LedgerKey::provenance(batch_id))
    }

    /// Timestamped history of a batch: creation, every attached record and
    /// every status change, oldest first.
    pub fn get_provenance_trace(
        &self,
        batch_id: &str,
    ) -> Result<Vec<TraceEntry>, ProvenanceError> {
        let txn = self.ledger.begin()?;
        let batch_key = LedgerKey::provenance(batch_id);
        if !txn.exists(&batch_key)? {
            return Err(ProvenanceError::NotFound(batch_key));
        }
        require_record(&txn, &LedgerKey::trace(batch_id))
    }

    /// Append `record_id` to the batch's list for `kind`.
    ///
    /// The record must exist and, for kinds that name a batch, belong to
    /// `batch_id`. Attaching an ID twice fails with `Duplicate`.
    pub fn attach_record(
        &self,
        batch_id: &str,
        kind: RecordKind,
        record_id: &str,
    ) -> Result<Provenance, ProvenanceError> {
        let batch_key = LedgerKey::provenance(batch_id);
        let mut txn = self.ledger.begin()?;
        let mut provenance: Provenance = require_record(&txn, &batch_key)?;

        if let Some(owner) = Self::owning_batch(&txn, kind, record_id)? {
            if owner != batch_id {
                return Err(ProvenanceError::BatchMismatch {
                    batch_id: batch_id.to_string(),
                    kind,
                    record_id: record_id.to_string(),
                    owner,
                });
            }
        }

        append_reference(&mut provenance, kind, record_id)?;
        write_record(&mut txn, &batch_key, &provenance)?;
        self.append_trace(&mut txn, batch_id, attached(kind, record_id))?;
        txn.commit()?;

        tracing::info!("Attached {} {} to batch {}", kind, record_id, batch_id);
        Ok(provenance)
    }

    /// Load the record to prove it exists, returning the batch it names.
    fn owning_batch(
        txn: &L::Txn,
        kind: RecordKind,
        record_id: &str,
    ) -> Result<Option<String>, ProvenanceError> {
        let key = LedgerKey::record(kind, record_id);
        let owner = match kind {
            RecordKind::CollectionEvent => {
                let _: CollectionEvent = require_record(txn, &key)?;
                None
            }
            RecordKind::QualityTest => Some(require_record::<QualityTest, _>(txn, &key)?.batch_id),
            RecordKind::ProcessingStep => {
                Some(require_record::<ProcessingStep, _>(txn, &key)?.batch_id)
            }
            RecordKind::Certification => {
                Some(require_record::<Certification, _>(txn, &key)?.batch_id)
            }
        };
        Ok(owner)
    }

    pub fn transition_status(
        &self,
        batch_id: &str,
        status: ProvenanceStatus,
    ) -> Result<Provenance, ProvenanceError> {
        let key = LedgerKey::provenance(batch_id);
        let mut txn = self.ledger.begin()?;
        let mut provenance: Provenance = require_record(&txn, &key)?;

        let from = provenance.status;
        if !from.can_transition_to(status) {
            tracing::warn!(
                "Rejected status change for batch {}: {} -> {}",
                batch_id,
                from,
                status
            );
            return Err(ProvenanceError::InvalidTransition {
                batch_id: batch_id.to_string(),
                from,
                to: status,
            });
        }

        provenance.status = status;
        write_record(&mut txn, &key, &provenance)?;
        self.append_trace(
            &mut txn,
            batch_id,
            TraceEvent::StatusChanged { from, to: status },
        )?;
        txn.commit()?;

        tracing::info!("Batch {} status {} -> {}", batch_id, from, status);
        Ok(provenance)
    }

    pub fn get_collection_event(&self, event_id: &str) -> Result<CollectionEvent, ProvenanceError> {
        self.get_record(RecordKind::CollectionEvent, event_id)
    }

    pub fn get_quality_test(&self, test_id: &str) -> Result<QualityTest, ProvenanceError> {
        self.get_record(RecordKind::QualityTest, test_id)
    }

    pub fn get_processing_step(&self, step_id: &str) -> Result<ProcessingStep, ProvenanceError> {
        self.get_record(RecordKind::ProcessingStep, step_id)
    }

    /// Fetch a certification with `is_valid` recomputed for the current time.
    pub fn get_certification(&self, cert_id: &str) -> Result<Certification, ProvenanceError> {
        let cert: Certification = self.get_record(RecordKind::Certification, cert_id)?;
        Ok(cert.reconciled(self.clock.now()))
    }

    fn get_record<T: serde::de::DeserializeOwned>(
        &self,
        kind: RecordKind,
        record_id: &str,
    ) -> Result<T, ProvenanceError> {
        let txn = self.ledger.begin()?;
        require_record(&txn, &LedgerKey::record(kind, record_id))
    }

    /// Resolve every reference of a batch into its record.
    pub fn get_provenance_report(&self, batch_id: &str) -> Result<ProvenanceReport, ProvenanceError> {
        let txn = self.ledger.begin()?;
        let provenance: Provenance = require_record(&txn, &LedgerKey::provenance(batch_id))?;

        let now = self.clock.now();
        let collection_events = resolve(&txn, RecordKind::CollectionEvent, &provenance)?;
        let quality_tests = resolve(&txn, RecordKind::QualityTest, &provenance)?;
        let processing_steps = resolve(&txn, RecordKind::ProcessingStep, &provenance)?;
        let certifications = resolve::<Certification, _>(&txn, RecordKind::Certification, &provenance)?
            .into_iter()
            .map(|cert| cert.reconciled(now))
            .collect();
        let trace = require_record(&txn, &LedgerKey::trace(batch_id))?;
        let documents = resolve_documents(&txn, &provenance)?;

        Ok(ProvenanceReport {
            provenance,
            collection_events,
            quality_tests,
            processing_steps,
            certifications,
            trace,
            documents,
        })
    }

    /// Bind `qr_code` to the current state of a batch.
    pub fn create_qr_link(&self, qr_code: &str, batch_id: &str) -> Result<QrLink, ProvenanceError> {
        let key = LedgerKey::qr_link(qr_code);
        let batch_key = LedgerKey::provenance(batch_id);
        let mut txn = self.ledger.begin()?;
        let provenance: Provenance = require_record(&txn, &batch_key)?;

        let hash = fingerprint(&provenance, &batch_key)?;
        let link = QrLink::new(qr_code, batch_id, hash, self.clock.as_ref());
        insert_record(&mut txn, &key, &link)?;
        txn.commit()?;

        tracing::info!("Created QR link {} for batch {}", qr_code, batch_id);
        Ok(link)
    }

    pub fn get_qr_link(&self, qr_code: &str) -> Result<QrLink, ProvenanceError> {
        let txn = self.ledger.begin()?;
        require_record(&txn, &LedgerKey::qr_link(qr_code))
    }

    /// Deactivate a QR link. Already inactive links are left as they are.
    pub fn deactivate_qr_link(&self, qr_code: &str) -> Result<QrLink, ProvenanceError> {
        let key = LedgerKey::qr_link(qr_code);
        let mut txn = self.ledger.begin()?;
        let mut link: QrLink = require_record(&txn, &key)?;
        if !link.is_active {
            return Ok(link);
        }

        link.is_active = false;
        write_record(&mut txn, &key, &link)?;
        txn.commit()?;

        tracing::info!("Deactivated QR link {}", qr_code);
        Ok(link)
    }

    /// Consumer lookup: resolve a QR code and check it against the batch.
    pub fn verify_qr_link(&self, qr_code: &str) -> Result<QrVerification, ProvenanceError> {
        let txn = self.ledger.begin()?;
        let link: QrLink = require_record(&txn, &LedgerKey::qr_link(qr_code))?;
        let batch_key = LedgerKey::provenance(&link.batch_id);
        let provenance: Provenance = require_record(&txn, &batch_key)?;

        let current_hash = fingerprint(&provenance, &batch_key)?;
        let snapshot_current = current_hash == link.provenance_hash;
        let verified =
            link.is_active && snapshot_current && provenance.status != ProvenanceStatus::Recalled;
        let documents = resolve_documents(&txn, &provenance)?;
        tracing::debug!("Verified QR link {}: {}", qr_code, verified);

        Ok(QrVerification {
            link,
            provenance,
            documents,
            current_hash,
            snapshot_current,
            verified,
        })
    }
}

fn append_reference(
    provenance: &mut Provenance,
    kind: RecordKind,
    record_id: &str,
) -> Result<(), ProvenanceError> {
    if !provenance.attach(kind, record_id) {
        return Err(ProvenanceError::Duplicate {
            batch_id: provenance.batch_id.clone(),
            kind,
            record_id: record_id.to_string(),
        });
    }
    Ok(())
}

fn attached(kind: RecordKind, record_id: &str) -> TraceEvent {
    TraceEvent::Attached {
        record_kind: kind,
        record_id: record_id.to_string(),
    }
}

fn store_document<X: LedgerTxn>(
    txn: &mut X,
    kind: RecordKind,
    record_id: &str,
    document: Option<&serde_json::Value>,
) -> Result<(), ProvenanceError> {
    match document {
        Some(document) => insert_record(txn, &LedgerKey::document(kind, record_id), document),
        None => Ok(()),
    }
}

fn resolve_documents<X: LedgerTxn>(
    txn: &X,
    provenance: &Provenance,
) -> Result<OffChainDocuments, ProvenanceError> {
    let lookup = |kind: RecordKind| -> Result<BTreeMap<String, serde_json::Value>, ProvenanceError> {
        let mut documents = BTreeMap::new();
        for id in provenance.references(kind) {
            if let Some(document) = read_record(txn, &LedgerKey::document(kind, id))? {
                documents.insert(id.clone(), document);
            }
        }
        Ok(documents)
    };
    Ok(OffChainDocuments {
        collection_events: lookup(RecordKind::CollectionEvent)?,
        quality_tests: lookup(RecordKind::QualityTest)?,
    })
}

fn fingerprint(provenance: &Provenance, key: &LedgerKey) -> Result<String, ProvenanceError> {
    provenance
        .fingerprint()
        .map_err(|source| ProvenanceError::Serialization {
            key: key.clone(),
            source,
        })
}

fn resolve<T, X>(txn: &X, kind: RecordKind, provenance: &Provenance) -> Result<Vec<T>, ProvenanceError>
where
    T: serde::de::DeserializeOwned,
    X: LedgerTxn,
{
    provenance
        .references(kind)
        .iter()
        .map(|id| require_record(txn, &LedgerKey::record(kind, id)))
        .collect()
}

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::clock::Clock;
use crate::validation::Validator;

/// Kinds of leaf record that a provenance aggregate can reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordKind {
    CollectionEvent,
    QualityTest,
    ProcessingStep,
    Certification,
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RecordKind::CollectionEvent => "collection event",
            RecordKind::QualityTest => "quality test",
            RecordKind::ProcessingStep => "processing step",
            RecordKind::Certification => "certification",
        };
        f.write_str(name)
    }
}

/// Lifecycle status of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProvenanceStatus {
    Active,
    Completed,
    Recalled,
    Suspended,
}

impl ProvenanceStatus {
    /// COMPLETED and RECALLED admit no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, ProvenanceStatus::Completed | ProvenanceStatus::Recalled)
    }

    pub fn can_transition_to(self, next: ProvenanceStatus) -> bool {
        use ProvenanceStatus::*;
        matches!(
            (self, next),
            (Active, Completed) | (Active, Suspended) | (Active, Recalled) | (Suspended, Active)
        )
    }
}

impl std::fmt::Display for ProvenanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ProvenanceStatus::Active => "ACTIVE",
            ProvenanceStatus::Completed => "COMPLETED",
            ProvenanceStatus::Recalled => "RECALLED",
            ProvenanceStatus::Suspended => "SUSPENDED",
        };
        f.write_str(name)
    }
}

/// Caller-supplied fields of a collection event.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCollectionEvent {
    pub event_id: String,
    pub farmer_id: String,
    pub crop_id: String,
    pub geo_coordinates: String,
    pub details_hash: String,
}

/// A harvest recorded in the field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionEvent {
    pub event_id: String,
    pub farmer_id: String,
    pub crop_id: String,
    pub timestamp: i64,
    pub geo_coordinates: String,
    pub details_hash: String,
    pub geo_fence_valid: bool,
    pub season_valid: bool,
}

impl CollectionEvent {
    /// Stamp the event with the clock and compute its plausibility flags.
    pub fn record(input: NewCollectionEvent, clock: &dyn Clock, validator: &Validator) -> Self {
        let timestamp = clock.now();
        let geo_fence_valid = validator.validate_geo_fence(&input.geo_coordinates);
        let season_valid = validator.validate_season(&input.crop_id, timestamp);
        Self {
            event_id: input.event_id,
            farmer_id: input.farmer_id,
            crop_id: input.crop_id,
            timestamp,
            geo_coordinates: input.geo_coordinates,
            details_hash: input.details_hash,
            geo_fence_valid,
            season_valid,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewQualityTest {
    pub test_id: String,
    pub lab_id: String,
    pub batch_id: String,
    pub report_hash: String,
    pub test_type: String,
    pub result: bool,
}

/// A lab test run against a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityTest {
    pub test_id: String,
    pub lab_id: String,
    pub batch_id: String,
    pub result: bool,
    pub report_hash: String,
    pub timestamp: i64,
    pub test_type: String,
}

impl QualityTest {
    pub fn record(input: NewQualityTest, clock: &dyn Clock) -> Self {
        Self {
            test_id: input.test_id,
            lab_id: input.lab_id,
            batch_id: input.batch_id,
            result: input.result,
            report_hash: input.report_hash,
            timestamp: clock.now(),
            test_type: input.test_type,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProcessingStep {
    pub step_id: String,
    pub processor_id: String,
    pub batch_id: String,
    pub action: String,
    pub details_hash: String,
    pub quality_maintained: bool,
}

/// A processing action (drying, grinding, ...) applied to a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingStep {
    pub step_id: String,
    pub processor_id: String,
    pub batch_id: String,
    pub action: String,
    pub timestamp: i64,
    pub details_hash: String,
    /// Asserted by the processor, not verified here.
    pub quality_maintained: bool,
}

impl ProcessingStep {
    pub fn record(input: NewProcessingStep, clock: &dyn Clock) -> Self {
        Self {
            step_id: input.step_id,
            processor_id: input.processor_id,
            batch_id: input.batch_id,
            action: input.action,
            timestamp: clock.now(),
            details_hash: input.details_hash,
            quality_maintained: input.quality_maintained,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCertification {
    pub cert_id: String,
    pub batch_id: String,
    pub cert_type: String,
    pub issuer_hash: String,
    pub certificate_hash: String,
    pub expiry_date: i64,
}

/// A certificate issued for a batch.
///
/// `is_valid` is only a snapshot; use [`Certification::reconciled`] before
/// trusting it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Certification {
    pub cert_id: String,
    pub batch_id: String,
    pub cert_type: String,
    pub issuer_hash: String,
    pub certificate_hash: String,
    pub expiry_date: i64,
    pub is_valid: bool,
}

impl Certification {
    pub fn issue(input: NewCertification, clock: &dyn Clock) -> Self {
        let is_valid = Validator::certification_valid(input.expiry_date, clock.now());
        Self {
            cert_id: input.cert_id,
            batch_id: input.batch_id,
            cert_type: input.cert_type,
            issuer_hash: input.issuer_hash,
            certificate_hash: input.certificate_hash,
            expiry_date: input.expiry_date,
            is_valid,
        }
    }

    /// Recompute `is_valid` against the given time.
    pub fn reconciled(mut self, now: i64) -> Self {
        self.is_valid = Validator::certification_valid(self.expiry_date, now);
        self
    }
}

/// Consumer-facing lookup token bound to a provenance snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrLink {
    pub qr_code: String,
    pub batch_id: String,
    pub provenance_hash: String,
    pub created_at: i64,
    pub is_active: bool,
}

impl QrLink {
    pub fn new(
        qr_code: impl Into<String>,
        batch_id: impl Into<String>,
        provenance_hash: impl Into<String>,
        clock: &dyn Clock,
    ) -> Self {
        Self {
            qr_code: qr_code.into(),
            batch_id: batch_id.into(),
            provenance_hash: provenance_hash.into(),
            created_at: clock.now(),
            is_active: true,
        }
    }
}

/// The aggregate tying a batch to its records by ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Provenance {
    pub batch_id: String,
    pub collection_events: Vec<String>,
    pub quality_tests: Vec<String>,
    pub processing_steps: Vec<String>,
    pub certifications: Vec<String>,
    pub status: ProvenanceStatus,
    pub created_at: i64,
}

impl Provenance {
    pub fn new(batch_id: impl Into<String>, clock: &dyn Clock) -> Self {
        Self {
            batch_id: batch_id.into(),
            collection_events: Vec::new(),
            quality_tests: Vec::new(),
            processing_steps: Vec::new(),
            certifications: Vec::new(),
            status: ProvenanceStatus::Active,
            created_at: clock.now(),
        }
    }

    pub fn references(&self, kind: RecordKind) -> &[String] {
        match kind {
            RecordKind::CollectionEvent => &self.collection_events,
            RecordKind::QualityTest => &self.quality_tests,
            RecordKind::ProcessingStep => &self.processing_steps,
            RecordKind::Certification => &self.certifications,
        }
    }

    /// Append a reference. Returns false if the ID is already in the list.
    pub fn attach(&mut self, kind: RecordKind, record_id: &str) -> bool {
        let list = match kind {
            RecordKind::CollectionEvent => &mut self.collection_events,
            RecordKind::QualityTest => &mut self.quality_tests,
            RecordKind::ProcessingStep => &mut self.processing_steps,
            RecordKind::Certification => &mut self.certifications,
        };
        if list.iter().any(|id| id == record_id) {
            return false;
        }
        list.push(record_id.to_string());
        true
    }

    /// Hex SHA-256 of the canonical JSON encoding.
    pub fn fingerprint(&self) -> Result<String, serde_json::Error> {
        let bytes = serde_json::to_vec(self)?;
        let digest = Sha256::digest(&bytes);
        Ok(format!("{:x}", digest))
    }
}

/// What happened to a batch at one point of its trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TraceEvent {
    Created,
    #[serde(rename_all = "camelCase")]
    Attached {
        record_kind: RecordKind,
        record_id: String,
    },
    StatusChanged {
        from: ProvenanceStatus,
        to: ProvenanceStatus,
    },
}

/// One timestamped entry of a batch trace. Entries are only ever appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEntry {
    pub timestamp: i64,
    pub event: TraceEvent,
}

impl TraceEntry {
    pub fn new(event: TraceEvent, clock: &dyn Clock) -> Self {
        Self {
            timestamp: clock.now(),
            event,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::validation::GeoFence;

    fn validator() -> Validator {
        Validator::new(GeoFence::new(["26.9124,75.7873"]))
    }

    fn new_event(geo: &str) -> NewCollectionEvent {
        NewCollectionEvent {
            event_id: "E1".to_string(),
            farmer_id: "F1".to_string(),
            crop_id: "ashwagandha".to_string(),
            geo_coordinates: geo.to_string(),
            details_hash: "abc".to_string(),
        }
    }

    #[test]
    fn test_collection_event_flags() {
        let clock = FixedClock::new(1_700_000_000);
        let inside = CollectionEvent::record(new_event("26.9124,75.7873"), &clock, &validator());
        assert!(inside.geo_fence_valid);
        assert!(inside.season_valid);
        assert_eq!(inside.timestamp, 1_700_000_000);

        let outside = CollectionEvent::record(new_event("12.34,56.78"), &clock, &validator());
        assert!(!outside.geo_fence_valid);
    }

    #[test]
    fn test_collection_event_wire_names() {
        let clock = FixedClock::new(10);
        let event = CollectionEvent::record(new_event("26.9124,75.7873"), &clock, &validator());
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["eventId"], "E1");
        assert_eq!(json["geoCoordinates"], "26.9124,75.7873");
        assert_eq!(json["geoFenceValid"], true);
        assert_eq!(json["seasonValid"], true);
        assert_eq!(json["timestamp"], 10);
    }

    #[test]
    fn test_status_transitions() {
        use ProvenanceStatus::*;
        assert!(Active.can_transition_to(Completed));
        assert!(Active.can_transition_to(Suspended));
        assert!(Active.can_transition_to(Recalled));
        assert!(Suspended.can_transition_to(Active));

        assert!(!Suspended.can_transition_to(Completed));
        assert!(!Active.can_transition_to(Active));
        for next in [Active, Completed, Recalled, Suspended] {
            assert!(!Completed.can_transition_to(next));
            assert!(!Recalled.can_transition_to(next));
        }
        assert!(Completed.is_terminal());
        assert!(!Suspended.is_terminal());
    }

    #[test]
    fn test_status_wire_format() {
        assert_eq!(
            serde_json::to_string(&ProvenanceStatus::Suspended).unwrap(),
            "\"SUSPENDED\""
        );
        let kind: RecordKind = serde_json::from_str("\"QUALITY_TEST\"").unwrap();
        assert_eq!(kind, RecordKind::QualityTest);
    }

    #[test]
    fn test_provenance_attach_rejects_duplicates() {
        let mut provenance = Provenance::new("B1", &FixedClock::new(0));
        assert!(provenance.attach(RecordKind::QualityTest, "T1"));
        assert!(!provenance.attach(RecordKind::QualityTest, "T1"));
        assert!(provenance.attach(RecordKind::ProcessingStep, "T1"));

        assert_eq!(provenance.references(RecordKind::QualityTest), ["T1"]);
        assert_eq!(provenance.references(RecordKind::ProcessingStep), ["T1"]);
        assert!(provenance.references(RecordKind::Certification).is_empty());
    }

    #[test]
    fn test_fingerprint_tracks_state() {
        let mut provenance = Provenance::new("B1", &FixedClock::new(0));
        let before = provenance.fingerprint().unwrap();
        assert_eq!(before.len(), 64);
        assert_eq!(before, provenance.clone().fingerprint().unwrap());

        provenance.attach(RecordKind::CollectionEvent, "E1");
        assert_ne!(before, provenance.fingerprint().unwrap());
    }

    #[test]
    fn test_certification_reconciled() {
        let clock = FixedClock::new(100);
        let cert = Certification::issue(
            NewCertification {
                cert_id: "C1".to_string(),
                batch_id: "B1".to_string(),
                cert_type: "organic".to_string(),
                issuer_hash: "issuer".to_string(),
                certificate_hash: "cert".to_string(),
                expiry_date: 200,
            },
            &clock,
        );
        assert!(cert.is_valid);
        assert!(!cert.clone().reconciled(200).is_valid);
        assert!(cert.reconciled(199).is_valid);
    }

    #[test]
    fn test_records_roundtrip() {
        let clock = FixedClock::new(42);
        let mut provenance = Provenance::new("B1", &clock);
        let empty: Provenance =
            serde_json::from_slice(&serde_json::to_vec(&provenance).unwrap()).unwrap();
        assert_eq!(empty, provenance);

        provenance.attach(RecordKind::CollectionEvent, "E1");
        provenance.attach(RecordKind::QualityTest, "T1");
        provenance.attach(RecordKind::ProcessingStep, "S1");
        provenance.attach(RecordKind::Certification, "C1");
        provenance.status = ProvenanceStatus::Suspended;
        let full: Provenance =
            serde_json::from_slice(&serde_json::to_vec(&provenance).unwrap()).unwrap();
        assert_eq!(full, provenance);

        let test = QualityTest::record(
            NewQualityTest {
                test_id: "T1".to_string(),
                lab_id: "LAB1".to_string(),
                batch_id: "B1".to_string(),
                report_hash: "hash123".to_string(),
                test_type: "pesticide".to_string(),
                result: true,
            },
            &clock,
        );
        let decoded: QualityTest =
            serde_json::from_slice(&serde_json::to_vec(&test).unwrap()).unwrap();
        assert_eq!(decoded, test);

        let step = ProcessingStep::record(
            NewProcessingStep {
                step_id: "S1".to_string(),
                processor_id: "P1".to_string(),
                batch_id: "B1".to_string(),
                action: "drying".to_string(),
                details_hash: "d".to_string(),
                quality_maintained: false,
            },
            &clock,
        );
        let decoded: ProcessingStep =
            serde_json::from_slice(&serde_json::to_vec(&step).unwrap()).unwrap();
        assert_eq!(decoded, step);

        let link = QrLink::new("QR1", "B1", provenance.fingerprint().unwrap(), &clock);
        let decoded: QrLink = serde_json::from_slice(&serde_json::to_vec(&link).unwrap()).unwrap();
        assert_eq!(decoded, link);

        let event = CollectionEvent::record(new_event("12.34,56.78"), &clock, &validator());
        assert!(!event.geo_fence_valid);
        let decoded: CollectionEvent =
            serde_json::from_slice(&serde_json::to_vec(&event).unwrap()).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn test_certification_roundtrip() {
        let issue = |expiry_date| {
            Certification::issue(
                NewCertification {
                    cert_id: "C1".to_string(),
                    batch_id: "B1".to_string(),
                    cert_type: "organic".to_string(),
                    issuer_hash: "issuer".to_string(),
                    certificate_hash: "cert".to_string(),
                    expiry_date,
                },
                &FixedClock::new(1_000),
            )
        };

        let valid = issue(2_000);
        assert!(valid.is_valid);
        let decoded: Certification =
            serde_json::from_slice(&serde_json::to_vec(&valid).unwrap()).unwrap();
        assert_eq!(decoded, valid);

        let expired = issue(500);
        assert!(!expired.is_valid);
        let decoded: Certification =
            serde_json::from_slice(&serde_json::to_vec(&expired).unwrap()).unwrap();
        assert_eq!(decoded, expired);
    }

    #[test]
    fn test_trace_entry_wire_format() {
        let clock = FixedClock::new(7);
        let attached = TraceEntry::new(
            TraceEvent::Attached {
                record_kind: RecordKind::QualityTest,
                record_id: "T1".to_string(),
            },
            &clock,
        );
        let json = serde_json::to_value(&attached).unwrap();
        assert_eq!(json["timestamp"], 7);
        assert_eq!(json["event"]["type"], "ATTACHED");
        assert_eq!(json["event"]["recordKind"], "QUALITY_TEST");
        assert_eq!(json["event"]["recordId"], "T1");

        let changed = TraceEntry::new(
            TraceEvent::StatusChanged {
                from: ProvenanceStatus::Active,
                to: ProvenanceStatus::Recalled,
            },
            &clock,
        );
        let json = serde_json::to_value(&changed).unwrap();
        assert_eq!(json["event"]["type"], "STATUS_CHANGED");
        assert_eq!(json["event"]["to"], "RECALLED");

        let decoded: Vec<TraceEntry> =
            serde_json::from_slice(&serde_json::to_vec(&[attached.clone(), changed.clone()]).unwrap())
                .unwrap();
        assert_eq!(decoded, [attached, changed]);
    }
}

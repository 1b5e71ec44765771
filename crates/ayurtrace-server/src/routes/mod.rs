pub mod health;
pub mod provenance;
pub mod qr;
pub mod records;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json, Router,
};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use ayurtrace_core::{ProvenanceError, Validator};

use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(records::routes())
        .merge(provenance::routes())
        .merge(qr::routes())
        .merge(health::routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Map a service result to a JSON response.
pub(crate) fn respond<T: Serialize>(result: Result<T, ProvenanceError>, ok: StatusCode) -> Response {
    match result {
        Ok(value) => (ok, Json(value)).into_response(),
        Err(e) => error_response(e),
    }
}

pub(crate) fn error_response(e: ProvenanceError) -> Response {
    let status = match &e {
        ProvenanceError::NotFound(_) => StatusCode::NOT_FOUND,
        ProvenanceError::AlreadyExists(_)
        | ProvenanceError::DuplicateKey(_)
        | ProvenanceError::Duplicate { .. } => StatusCode::CONFLICT,
        ProvenanceError::InvalidTransition { .. } | ProvenanceError::BatchMismatch { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        ProvenanceError::Deserialization { .. }
        | ProvenanceError::Serialization { .. }
        | ProvenanceError::Ledger(_) => {
            tracing::error!("Ledger operation failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    message_response(status, e.to_string())
}

pub(crate) fn message_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

/// Reject empty IDs before they reach the ledger. Takes `(field, value)` pairs.
pub(crate) fn require_ids(ids: &[(&str, &str)]) -> Result<(), Response> {
    for (field, id) in ids {
        Validator::validate_record_id(field, id)
            .map_err(|e| message_response(StatusCode::BAD_REQUEST, e.to_string()))?;
    }
    Ok(())
}

/// Use the supplied hash, or hash the off-chain document if only that was
/// sent. When both are sent they must agree.
pub(crate) fn content_hash(
    hash: Option<String>,
    document: Option<&serde_json::Value>,
    field: &str,
) -> Result<String, Response> {
    let digest = document.map(|document| {
        format!("{:x}", Sha256::digest(document.to_string().as_bytes()))
    });
    match (hash, digest) {
        (Some(hash), Some(digest)) if hash != digest => Err(message_response(
            StatusCode::BAD_REQUEST,
            format!("{field}Hash does not match {field}"),
        )),
        (Some(hash), _) => Ok(hash),
        (None, Some(digest)) => Ok(digest),
        (None, None) => Err(message_response(
            StatusCode::BAD_REQUEST,
            format!("either {field}Hash or {field} is required"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_checks_supplied_hash() {
        let doc = serde_json::json!({ "moisture": 8 });
        assert_eq!(
            content_hash(Some("abc".to_string()), None, "details").unwrap(),
            "abc"
        );

        let response = content_hash(Some("abc".to_string()), Some(&doc), "details").unwrap_err();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let hash = content_hash(None, Some(&doc), "details").unwrap();
        assert_eq!(
            content_hash(Some(hash.clone()), Some(&doc), "details").unwrap(),
            hash
        );
    }

    #[test]
    fn test_require_ids() {
        assert!(require_ids(&[("batchId", "B1"), ("testId", "T1")]).is_ok());
        let response = require_ids(&[("batchId", "B1"), ("testId", "")]).unwrap_err();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_content_hash_of_document() {
        let doc = serde_json::json!({ "moisture": 8 });
        let hash = content_hash(None, Some(&doc), "details").unwrap();
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, content_hash(None, Some(&doc), "details").unwrap());
    }

    #[test]
    fn test_content_hash_missing() {
        let response = content_hash(None, None, "report").unwrap_err();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_error_status_mapping() {
        use ayurtrace_core::{LedgerError, LedgerKey, ProvenanceStatus};

        let not_found = error_response(ProvenanceError::NotFound(LedgerKey::provenance("B1")));
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);

        let exists = error_response(ProvenanceError::AlreadyExists("B1".to_string()));
        assert_eq!(exists.status(), StatusCode::CONFLICT);

        let transition = error_response(ProvenanceError::InvalidTransition {
            batch_id: "B1".to_string(),
            from: ProvenanceStatus::Completed,
            to: ProvenanceStatus::Active,
        });
        assert_eq!(transition.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let ledger = error_response(ProvenanceError::Ledger(LedgerError::Transaction(
            "disk full".to_string(),
        )));
        assert_eq!(ledger.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}

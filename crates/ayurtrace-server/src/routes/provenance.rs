use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use ayurtrace_core::{ProvenanceStatus, RecordKind};

use super::{require_ids, respond};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/provenance", post(create_provenance))
        .route("/api/provenance/{batch_id}", get(get_provenance))
        .route("/api/provenance/{batch_id}/report", get(get_report))
        .route("/api/provenance/{batch_id}/trace", get(get_trace))
        .route("/api/provenance/{batch_id}/records", post(attach_record))
        .route("/api/provenance/{batch_id}/status", post(transition_status))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProvenanceRequest {
    batch_id: String,
}

async fn create_provenance(
    State(state): State<AppState>,
    Json(req): Json<CreateProvenanceRequest>,
) -> Response {
    if let Err(response) = require_ids(&[("batchId", req.batch_id.as_str())]) {
        return response;
    }
    respond(
        state.service.create_provenance(&req.batch_id),
        StatusCode::CREATED,
    )
}

async fn get_provenance(State(state): State<AppState>, Path(batch_id): Path<String>) -> Response {
    respond(state.service.get_provenance(&batch_id), StatusCode::OK)
}

async fn get_report(State(state): State<AppState>, Path(batch_id): Path<String>) -> Response {
    respond(state.service.get_provenance_report(&batch_id), StatusCode::OK)
}

async fn get_trace(State(state): State<AppState>, Path(batch_id): Path<String>) -> Response {
    respond(state.service.get_provenance_trace(&batch_id), StatusCode::OK)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachRecordRequest {
    record_kind: RecordKind,
    record_id: String,
}

async fn attach_record(
    State(state): State<AppState>,
    Path(batch_id): Path<String>,
    Json(req): Json<AttachRecordRequest>,
) -> Response {
    if let Err(response) = require_ids(&[("recordId", req.record_id.as_str())]) {
        return response;
    }
    respond(
        state
            .service
            .attach_record(&batch_id, req.record_kind, &req.record_id),
        StatusCode::OK,
    )
}

#[derive(Debug, Deserialize)]
pub struct TransitionRequest {
    status: ProvenanceStatus,
}

async fn transition_status(
    State(state): State<AppState>,
    Path(batch_id): Path<String>,
    Json(req): Json<TransitionRequest>,
) -> Response {
    respond(
        state.service.transition_status(&batch_id, req.status),
        StatusCode::OK,
    )
}

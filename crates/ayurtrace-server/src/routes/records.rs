use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use ayurtrace_core::{NewCertification, NewCollectionEvent, NewProcessingStep, NewQualityTest};

use super::{content_hash, require_ids, respond};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/collection", post(record_collection_event))
        .route("/api/collection/{id}", get(get_collection_event))
        .route("/api/quality", post(record_quality_test))
        .route("/api/quality/{id}", get(get_quality_test))
        .route("/api/processing", post(record_processing_step))
        .route("/api/processing/{id}", get(get_processing_step))
        .route("/api/certifications", post(issue_certification))
        .route("/api/certifications/{id}", get(get_certification))
}

/// Collection event as sent by field apps. The ID is generated when
/// omitted, and `details` is hashed when no `detailsHash` is given. A
/// submitted `details` document is stored with the event.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordCollectionRequest {
    event_id: Option<String>,
    farmer_id: String,
    crop_id: String,
    geo_coordinates: String,
    details_hash: Option<String>,
    details: Option<serde_json::Value>,
}

async fn record_collection_event(
    State(state): State<AppState>,
    Json(req): Json<RecordCollectionRequest>,
) -> Response {
    let details_hash = match content_hash(req.details_hash, req.details.as_ref(), "details") {
        Ok(hash) => hash,
        Err(response) => return response,
    };
    let event_id = req
        .event_id
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    if let Err(response) = require_ids(&[("eventId", event_id.as_str())]) {
        return response;
    }
    let input = NewCollectionEvent {
        event_id,
        farmer_id: req.farmer_id,
        crop_id: req.crop_id,
        geo_coordinates: req.geo_coordinates,
        details_hash,
    };
    respond(
        state
            .service
            .record_collection_event_with_details(input, req.details.as_ref()),
        StatusCode::CREATED,
    )
}

async fn get_collection_event(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    respond(state.service.get_collection_event(&id), StatusCode::OK)
}

/// Lab result; `report` is hashed when no `reportHash` is given and stored
/// with the test.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordQualityRequest {
    test_id: Option<String>,
    lab_id: String,
    batch_id: String,
    test_type: String,
    result: bool,
    report_hash: Option<String>,
    report: Option<serde_json::Value>,
}

async fn record_quality_test(
    State(state): State<AppState>,
    Json(req): Json<RecordQualityRequest>,
) -> Response {
    let report_hash = match content_hash(req.report_hash, req.report.as_ref(), "report") {
        Ok(hash) => hash,
        Err(response) => return response,
    };
    let test_id = req.test_id.unwrap_or_else(|| Uuid::new_v4().to_string());
    if let Err(response) = require_ids(&[
        ("testId", test_id.as_str()),
        ("batchId", req.batch_id.as_str()),
    ]) {
        return response;
    }
    let input = NewQualityTest {
        test_id,
        lab_id: req.lab_id,
        batch_id: req.batch_id,
        report_hash,
        test_type: req.test_type,
        result: req.result,
    };
    respond(
        state
            .service
            .record_quality_test_with_report(input, req.report.as_ref()),
        StatusCode::CREATED,
    )
}

async fn get_quality_test(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    respond(state.service.get_quality_test(&id), StatusCode::OK)
}

async fn record_processing_step(
    State(state): State<AppState>,
    Json(input): Json<NewProcessingStep>,
) -> Response {
    if let Err(response) = require_ids(&[
        ("stepId", input.step_id.as_str()),
        ("batchId", input.batch_id.as_str()),
    ]) {
        return response;
    }
    respond(
        state.service.record_processing_step(input),
        StatusCode::CREATED,
    )
}

async fn get_processing_step(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    respond(state.service.get_processing_step(&id), StatusCode::OK)
}

async fn issue_certification(
    State(state): State<AppState>,
    Json(input): Json<NewCertification>,
) -> Response {
    if let Err(response) = require_ids(&[
        ("certId", input.cert_id.as_str()),
        ("batchId", input.batch_id.as_str()),
    ]) {
        return response;
    }
    respond(state.service.issue_certification(input), StatusCode::CREATED)
}

async fn get_certification(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    respond(state.service.get_certification(&id), StatusCode::OK)
}

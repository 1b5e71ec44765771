use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use super::{require_ids, respond};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/qr", post(create_qr_link))
        .route("/api/qr/{qr_code}/deactivate", post(deactivate_qr_link))
        .route("/api/verify/{qr_code}", get(verify_qr_link))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateQrRequest {
    qr_code: String,
    batch_id: String,
}

async fn create_qr_link(State(state): State<AppState>, Json(req): Json<CreateQrRequest>) -> Response {
    if let Err(response) = require_ids(&[
        ("qrCode", req.qr_code.as_str()),
        ("batchId", req.batch_id.as_str()),
    ]) {
        return response;
    }
    respond(
        state.service.create_qr_link(&req.qr_code, &req.batch_id),
        StatusCode::CREATED,
    )
}

async fn deactivate_qr_link(State(state): State<AppState>, Path(qr_code): Path<String>) -> Response {
    respond(state.service.deactivate_qr_link(&qr_code), StatusCode::OK)
}

/// Consumer lookup behind a printed QR code.
async fn verify_qr_link(State(state): State<AppState>, Path(qr_code): Path<String>) -> Response {
    respond(state.service.verify_qr_link(&qr_code), StatusCode::OK)
}

// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::sync::Arc;

use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, State};
use axum::http::header::{HeaderName, CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use log::{info, warn};
use serde_json::json;

use crate::job_engine::dispatcher::Completed;
use crate::job_engine::job::{ErrorKind, Payload};
use crate::transport::server::AppState;

/// Name of the multipart field that carries the upload.
pub const FILE_FIELD: &str = "file";

pub const ORIGINAL_SIZE_HEADER: HeaderName = HeaderName::from_static("x-original-size");
pub const CONVERTED_SIZE_HEADER: HeaderName = HeaderName::from_static("x-converted-size");
pub const CONVERSION_TIME_HEADER: HeaderName = HeaderName::from_static("x-conversion-time-ms");
pub const JOB_ID_HEADER: HeaderName = HeaderName::from_static("x-job-id");

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
        ErrorKind::Expired | ErrorKind::ResultTimeout => StatusCode::REQUEST_TIMEOUT,
        ErrorKind::Codec => StatusCode::INTERNAL_SERVER_ERROR,
        ErrorKind::QueueFull | ErrorKind::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// `POST /convert`
pub async fn convert(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let payload = match read_upload(multipart).await {
        Ok(payload) => payload,
        Err(response) => return response,
    };
    info!(
        "filename={} size={} Received file for conversion",
        payload.filename, payload.declared_size
    );

    match state.dispatcher.handle(payload).await {
        Ok(completed) => converted_response(completed),
        Err(err) => (status_for(err.kind), err.detail).into_response(),
    }
}

/// `GET /health`
pub async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "pool": state.dispatcher.stats(),
    }))
}

async fn read_upload(
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Payload, Response> {
    let mut multipart = multipart.map_err(|rejection| {
        warn!("Rejected upload: {rejection}");
        rejection.into_response()
    })?;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                warn!("Error reading multipart body: {e}");
                return Err((e.status(), e.body_text()).into_response());
            }
        };
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        let data = field.bytes().await.map_err(|e| {
            warn!("Error retrieving file: {e}");
            (e.status(), e.body_text()).into_response()
        })?;
        return Ok(Payload::new(filename, data.to_vec()));
    }

    Err((
        StatusCode::BAD_REQUEST,
        format!("Error retrieving file: missing form field '{FILE_FIELD}'"),
    )
        .into_response())
}

fn converted_response(completed: Completed) -> Response {
    let Completed {
        job_id,
        output,
        metrics,
    } = completed;
    (
        StatusCode::OK,
        [
            (CONTENT_TYPE, output.content_type.to_string()),
            (CONTENT_DISPOSITION, content_disposition(&output.output_name)),
            (ORIGINAL_SIZE_HEADER, metrics.input_bytes.to_string()),
            (CONVERTED_SIZE_HEADER, metrics.output_bytes.to_string()),
            (CONVERSION_TIME_HEADER, metrics.duration.as_millis().to_string()),
            (JOB_ID_HEADER, job_id.to_string()),
        ],
        output.data,
    )
        .into_response()
}

/// `attachment` disposition with a quoted ASCII `filename` and, for names that do not fit
/// into one, an RFC 6266 `filename*` with the UTF-8 name.
pub fn content_disposition(name: &str) -> String {
    let fallback: String = name
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii_graphic() || c == ' ' => c,
            _ => '_',
        })
        .collect();
    if fallback == name {
        format!("attachment; filename=\"{fallback}\"")
    } else {
        format!(
            "attachment; filename=\"{fallback}\"; filename*=UTF-8''{}",
            urlencoding::encode(name)
        )
    }
}

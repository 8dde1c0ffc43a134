//! HTTP routes and handlers

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, FromRequest, Multipart, Request, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Instant;
use tracing::{debug, info, warn};
use vigilis_classifiers::{BatchSummary, CacheStats};
use vigilis_core::{ClassificationResult, LogRecord, Tier};
use vigilis_telemetry::MetricsSnapshot;

use crate::csv_io::{self, CsvError};
use crate::state::AppState;

/// Multipart field carrying the CSV upload
const UPLOAD_FIELD: &str = "file";

pub fn create_router(state: AppState) -> Router {
    let body_limit = state.config.max_body_bytes;
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .route("/stats", get(stats))
        .route("/classify", post(classify))
        .route("/classify/batch", post(classify_batch))
        .route("/classify/csv", post(classify_csv))
        .fallback(fallback)
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}

async fn metrics(State(state): State<AppState>) -> String {
    state
        .metrics_handle
        .as_ref()
        .map(|handle| handle.render())
        .unwrap_or_default()
}

#[derive(Debug, Serialize)]
struct StatsResponse {
    metrics: MetricsSnapshot,
    cache: CacheStats,
}

async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse {
        metrics: state.metrics.snapshot(),
        cache: state.cascade.cache().stats(),
    })
}

/// One log line as submitted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogInput {
    #[serde(default)]
    pub source: Option<String>,
    pub log_message: String,
}

impl LogInput {
    fn into_record(self) -> LogRecord {
        match self.source {
            Some(source) => LogRecord::with_source(source, self.log_message),
            None => LogRecord::new(self.log_message),
        }
    }
}

/// One classified log line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifiedLog {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub source: Option<String>,
    pub log_message: String,
    pub label: String,
    pub tier: Tier,
    pub confidence: f32,
    pub latency_us: u64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
}

impl ClassifiedLog {
    fn new(record: &LogRecord, result: ClassificationResult) -> Self {
        Self {
            source: record.source().map(str::to_string),
            log_message: record.raw().to_string(),
            label: result.label,
            tier: result.tier,
            confidence: result.confidence,
            latency_us: result.latency_us,
            error: result.error,
        }
    }
}

#[derive(Debug, Deserialize)]
struct BatchRequest {
    logs: Vec<LogInput>,
}

#[derive(Debug, Serialize)]
struct BatchResponse {
    results: Vec<ClassifiedLog>,
    summary: BatchSummary,
}

async fn classify(
    State(state): State<AppState>,
    payload: Result<Json<LogInput>, JsonRejection>,
) -> Result<Json<ClassifiedLog>, AppError> {
    let started = Instant::now();
    state.metrics.record_request("POST", "classify");
    let outcome = classify_one(&state, payload).await;
    finish(&state, "classify", started, &outcome);
    outcome
}

async fn classify_one(
    state: &AppState,
    payload: Result<Json<LogInput>, JsonRejection>,
) -> Result<Json<ClassifiedLog>, AppError> {
    let Json(input) = payload?;
    if input.log_message.trim().is_empty() {
        return Err(AppError::InvalidRequest("log_message must not be empty".into()));
    }

    let record = input.into_record();
    state.metrics.record_input_length(record.raw().chars().count());
    let result = state.cascade.classify(&record).await;
    debug!(label = %result.label, tier = %result.tier, "Classified single record");

    Ok(Json(ClassifiedLog::new(&record, result)))
}

async fn classify_batch(
    State(state): State<AppState>,
    payload: Result<Json<BatchRequest>, JsonRejection>,
) -> Result<Json<BatchResponse>, AppError> {
    let started = Instant::now();
    state.metrics.record_request("POST", "batch");
    let outcome = classify_many(&state, payload).await;
    finish(&state, "batch", started, &outcome);
    outcome
}

async fn classify_many(
    state: &AppState,
    payload: Result<Json<BatchRequest>, JsonRejection>,
) -> Result<Json<BatchResponse>, AppError> {
    let Json(request) = payload?;
    if let Some(i) = request
        .logs
        .iter()
        .position(|log| log.log_message.trim().is_empty())
    {
        return Err(AppError::InvalidRequest(format!(
            "logs[{}].log_message must not be empty",
            i
        )));
    }

    let records: Vec<LogRecord> = request.logs.into_iter().map(LogInput::into_record).collect();
    for record in &records {
        state.metrics.record_input_length(record.raw().chars().count());
    }
    let outcome = state.cascade.classify_batch(&records).await;
    info!(
        total = outcome.summary.total,
        errors = outcome.summary.errors,
        elapsed_us = outcome.summary.elapsed_us,
        "Batch request classified"
    );

    let results = records
        .iter()
        .zip(outcome.results)
        .map(|(record, result)| ClassifiedLog::new(record, result))
        .collect();

    Ok(Json(BatchResponse {
        results,
        summary: outcome.summary,
    }))
}

/// Accepts either a raw CSV body or a multipart upload with a `file` field
async fn classify_csv(State(state): State<AppState>, request: Request) -> Result<Response, AppError> {
    let started = Instant::now();
    state.metrics.record_request("POST", "csv");
    let outcome = label_csv(&state, request).await;
    finish(&state, "csv", started, &outcome);
    outcome
}

async fn label_csv(state: &AppState, request: Request) -> Result<Response, AppError> {
    let body = if is_multipart(request.headers()) {
        let multipart = Multipart::from_request(request, state)
            .await
            .map_err(|e| AppError::InvalidRequest(e.body_text()))?;
        uploaded_csv(multipart).await?
    } else {
        String::from_request(request, state)
            .await
            .map_err(|e| AppError::InvalidRequest(e.body_text()))?
    };

    let records = csv_io::read_records(body.as_bytes())?;
    for record in &records {
        state.metrics.record_input_length(record.raw().chars().count());
    }
    let outcome = state.cascade.classify_batch(&records).await;
    info!(
        total = outcome.summary.total,
        errors = outcome.summary.errors,
        "CSV request classified"
    );

    let output = csv_io::labelled_to_string(&records, &outcome.results)?;
    Ok(([(header::CONTENT_TYPE, "text/csv; charset=utf-8")], output).into_response())
}

fn is_multipart(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("multipart/form-data"))
}

async fn uploaded_csv(mut multipart: Multipart) -> Result<String, AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::InvalidRequest(e.body_text()))?
    {
        if field.name() == Some(UPLOAD_FIELD) {
            return field
                .text()
                .await
                .map_err(|e| AppError::InvalidRequest(e.body_text()));
        }
    }
    Err(AppError::InvalidRequest(format!(
        "multipart upload must include a '{}' field",
        UPLOAD_FIELD
    )))
}

fn finish<T>(state: &AppState, route: &'static str, started: Instant, outcome: &Result<T, AppError>) {
    if let Err(err) = outcome {
        state.metrics.record_request_error(err.kind());
    }
    state.metrics.record_request_latency(route, started.elapsed());
}

async fn fallback() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "Not found")
}

/// Error handling
#[derive(Debug)]
pub enum AppError {
    InvalidRequest(String),
    InternalError(String),
}

impl AppError {
    /// Error type reported in the body and in request metrics
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::InvalidRequest(_) => "invalid_request_error",
            AppError::InternalError(_) => "internal_error",
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::InvalidRequest(rejection.body_text())
    }
}

impl From<CsvError> for AppError {
    fn from(err: CsvError) -> Self {
        match err {
            CsvError::Io(e) => AppError::InternalError(e.to_string()),
            other => AppError::InvalidRequest(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let (status, message) = match self {
            AppError::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::InternalError(msg) => {
                warn!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = json!({
            "error": {
                "message": message,
                "type": kind,
            }
        });

        (status, Json(body)).into_response()
    }
}

//! HTTP routes and handlers

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use mailguard_core::stream::keep_alive_comment;
use mailguard_core::{event_channel, CollectingSink, ComplianceResult, IterationRecord, StreamEvent, Verdict};
use mailguard_policy::{ReviewRequest, RunFailure, RunReport, StepRecord, DEFAULT_GOAL};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, info, warn, Instrument};

use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/metrics", get(metrics))
        .route("/api/run-agent", post(run_agent))
        .route("/api/run-agent-sync", post(run_agent_sync))
        .route("/api/check-compliance", post(check_compliance))
        .route("/api/policy/:category", get(get_policy))
        .route("/api/redact-pii", post(redact_pii))
        .route("/api/rewrite", post(rewrite))
        .fallback(fallback)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Body of the run endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRequest {
    pub email_text: String,
    #[serde(default)]
    pub goal: Option<String>,
}

impl RunRequest {
    fn into_review(self) -> Result<ReviewRequest, AppError> {
        if self.email_text.trim().is_empty() {
            return Err(AppError::InvalidRequest("email_text must not be empty".to_string()));
        }
        let goal = self
            .goal
            .filter(|g| !g.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_GOAL.to_string());
        Ok(ReviewRequest::new(self.email_text).with_goal(goal))
    }
}

impl From<&ReviewRequest> for RunRequest {
    fn from(request: &ReviewRequest) -> Self {
        Self {
            email_text: request.email.clone(),
            goal: Some(request.goal.clone()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct EmailCheckRequest {
    email_text: String,
}

#[derive(Debug, Deserialize)]
struct RedactRequest {
    text: String,
}

#[derive(Debug, Serialize)]
struct CheckResponse {
    #[serde(flatten)]
    result: ComplianceResult,
    summary: String,
}

#[derive(Debug, Serialize)]
struct RewriteResponse {
    rewritten: String,
    changes: Vec<Change>,
}

#[derive(Debug, Serialize)]
struct Change {
    original: String,
    replacement: String,
    reason: &'static str,
}

#[derive(Debug, Serialize)]
struct SyncRunResponse {
    final_email: String,
    passed: bool,
    verdict: Verdict,
    /// One record per policy decision
    iterations: Vec<StepRecord>,
    history: Vec<IterationRecord>,
    /// Number of decision steps, the length of `iterations`
    total_iterations: usize,
    /// Loop iteration the run ended in
    final_iteration: u32,
}

#[derive(Debug, Serialize)]
struct SyncRunFailure {
    error: String,
    final_email: String,
    iterations: Vec<StepRecord>,
}

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn metrics(State(state): State<AppState>) -> String {
    state.metrics_handle.render()
}

/// Stream a review run as server-sent events
///
/// The run lives in its own task and writes into a bounded channel; the
/// response body drains it. A client that disconnects drops the receiver,
/// which stops the run at its next step.
async fn run_agent(
    State(state): State<AppState>,
    Json(req): Json<RunRequest>,
) -> Result<Response, AppError> {
    let request = req.into_review()?;
    let run_id = uuid::Uuid::new_v4();
    metrics::counter!("mailguard_requests_total", "endpoint" => "run_agent").increment(1);
    info!(%run_id, chars = request.email.len(), "Starting streamed review");

    let (mut sink, rx) = event_channel(state.config.stream.channel_capacity);
    let engine = state.engine.clone();
    tokio::spawn(
        async move {
            let result = engine.run(&request, &mut sink).await;
            record_run(&result);
        }
        .instrument(tracing::info_span!("review_run", %run_id)),
    );

    let keep_alive = Duration::from_secs(state.config.stream.keep_alive_secs.max(1));
    let body = futures::stream::unfold(rx, move |mut rx| async move {
        match tokio::time::timeout(keep_alive, rx.recv()).await {
            Ok(Some(event)) => Some((encode_event(&event), rx)),
            Ok(None) => None,
            Err(_) => {
                debug!("Sending keep-alive");
                Some((Ok(Bytes::from(keep_alive_comment("keep-alive"))), rx))
            }
        }
    });

    let mut response = Response::new(Body::from_stream(body));
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/event-stream"),
    );
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));

    Ok(response)
}

/// Run a review to completion and return the outcome as one document
async fn run_agent_sync(
    State(state): State<AppState>,
    Json(req): Json<RunRequest>,
) -> Result<Response, AppError> {
    let request = req.into_review()?;
    metrics::counter!("mailguard_requests_total", "endpoint" => "run_agent_sync").increment(1);

    let mut sink = CollectingSink::new();
    let result = state.engine.run(&request, &mut sink).await;
    record_run(&result);
    debug!(events = sink.events().len(), "Synchronous review finished");

    let response = match result {
        Ok(report) => Json(SyncRunResponse {
            final_email: report.final_email,
            passed: report.passed,
            verdict: report.verdict,
            total_iterations: report.steps.len(),
            final_iteration: report.iterations,
            iterations: report.steps,
            history: report.history,
        })
        .into_response(),
        Err(failure) => Json(SyncRunFailure {
            error: failure.error.to_string(),
            final_email: failure.final_email,
            iterations: failure.steps,
        })
        .into_response(),
    };

    Ok(response)
}

async fn check_compliance(
    State(state): State<AppState>,
    Json(req): Json<EmailCheckRequest>,
) -> Json<CheckResponse> {
    metrics::counter!("mailguard_requests_total", "endpoint" => "check_compliance").increment(1);
    let result = state.tools().check(&req.email_text);
    Json(CheckResponse {
        summary: result.summary(),
        result,
    })
}

/// Unknown categories get the "not found" document, not an error status
async fn get_policy(
    State(state): State<AppState>,
    Path(category): Path<String>,
) -> Json<mailguard_core::PolicyDocument> {
    Json(state.tools().get_policy(&category))
}

async fn redact_pii(
    State(state): State<AppState>,
    Json(req): Json<RedactRequest>,
) -> Json<mailguard_core::RedactionOutcome> {
    metrics::counter!("mailguard_requests_total", "endpoint" => "redact_pii").increment(1);
    Json(state.tools().redact(&req.text))
}

/// Redaction-only rewrite with a change list
async fn rewrite(
    State(state): State<AppState>,
    Json(req): Json<EmailCheckRequest>,
) -> Json<RewriteResponse> {
    let outcome = state.tools().redact(&req.email_text);
    let changes = outcome
        .redactions
        .into_iter()
        .map(|r| Change {
            original: r.original_span,
            replacement: r.replacement,
            reason: "PII redaction",
        })
        .collect();

    Json(RewriteResponse {
        rewritten: outcome.redacted,
        changes,
    })
}

async fn fallback() -> AppError {
    AppError::NotFound("no such route".to_string())
}

fn encode_event(event: &StreamEvent) -> mailguard_core::Result<Bytes> {
    Ok(Bytes::from(event.to_record()?.encode()))
}

fn record_run(result: &Result<RunReport, RunFailure>) {
    match result {
        Ok(report) => {
            metrics::counter!("mailguard_runs_total", "verdict" => report.verdict.as_str())
                .increment(1);
            metrics::histogram!("mailguard_iterations").record(f64::from(report.iterations));
            metrics::histogram!("mailguard_decisions").record(report.steps.len() as f64);
        }
        Err(failure) => {
            warn!(kind = failure.error.kind(), "Review run ended with an error");
            metrics::counter!("mailguard_errors_total", "kind" => failure.error.kind())
                .increment(1);
        }
    }
}

/// Error handling
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error("{0}")]
    NotFound(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, kind) = match &self {
            AppError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request_error"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found_error"),
        };

        let body = json!({
            "error": {
                "message": self.to_string(),
                "type": kind,
            }
        });

        (status, Json(body)).into_response()
    }
}

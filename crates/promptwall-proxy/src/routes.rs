//! HTTP routes and handlers

use axum::{
    body::Body,
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use promptwall_core::{Decision, Error};
use promptwall_policy::{Group, GroupSelector, Policy, PolicyDraft, ResolvedGroupSummary};
use promptwall_telemetry::{GroupBy, LogQuery, LogRecord, MetricsQuery, MetricsSnapshot, MetricsSummary, TimeRange};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::{debug, error};

use crate::pipeline::SanitizeRequest;
use crate::state::AppState;

/// Header carrying the decision status on streamed `/chat` responses
pub const STATUS_HEADER: &str = "x-promptwall-status";

pub fn create_router(state: AppState) -> Router {
    let body_limit = state.body_limit;

    Router::new()
        .route("/health", get(health_check))
        .route("/sanitize", post(sanitize))
        .route("/chat", post(chat))
        .route("/policies", get(list_policies).post(create_policy))
        .route(
            "/policies/:id",
            get(get_policy).put(update_policy).delete(delete_policy),
        )
        .route("/groups", get(list_groups).post(create_group))
        .route("/groups/:id", get(get_group).put(rename_group).delete(delete_group))
        .route(
            "/groups/:id/policies",
            get(group_policies).put(replace_group_policies),
        )
        .route(
            "/groups/:id/policies/:policy_id",
            post(add_group_policy).delete(remove_group_policy),
        )
        .route("/metrics", get(metrics_summary))
        .route("/metrics/prometheus", get(prometheus))
        .route("/logs", get(recent_logs))
        .route("/stats", get(stats))
        .fallback(fallback)
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}

async fn sanitize(
    State(state): State<AppState>,
    payload: Result<Json<SanitizeRequest>, JsonRejection>,
) -> Result<Json<Decision>, AppError> {
    let Json(request) = payload?;
    Ok(Json(state.pipeline.process(&request).await?))
}

/// Sanitize, then stream the generation for anything not blocked
async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<SanitizeRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(request) = payload?;
    let decision = state.pipeline.process(&request).await?;

    if decision.is_blocked() {
        return Ok(Json(decision).into_response());
    }
    let prompt = decision.forwardable_prompt().unwrap_or(&decision.original_prompt);

    debug!(generator = state.generator.name(), status = %decision.status, "Forwarding prompt");
    let fragments = state.generator.generate(prompt).await.map_err(|e| {
        metrics::counter!("promptwall_oracle_failures_total", "oracle" => "generation").increment(1);
        e
    })?;
    let body = Body::from_stream(fragments.map(|fragment| fragment.map(Bytes::from)));

    let mut response = Response::new(body);
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(STATUS_HEADER, HeaderValue::from_static(decision.status.as_str()));
    Ok(response)
}

async fn list_policies(State(state): State<AppState>) -> Result<Json<Vec<Policy>>, AppError> {
    Ok(Json(state.store().list_policies().await?))
}

async fn create_policy(
    State(state): State<AppState>,
    payload: Result<Json<PolicyDraft>, JsonRejection>,
) -> Result<(StatusCode, Json<Policy>), AppError> {
    let Json(draft) = payload?;
    let policy = state.store().create_policy(draft).await?;
    Ok((StatusCode::CREATED, Json(policy)))
}

async fn get_policy(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Policy>, AppError> {
    state
        .store()
        .get_policy(&id)
        .await?
        .map(Json)
        .ok_or_else(|| Error::PolicyNotFound(id).into())
}

async fn update_policy(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<PolicyDraft>, JsonRejection>,
) -> Result<Json<Policy>, AppError> {
    let Json(draft) = payload?;
    Ok(Json(state.store().update_policy(&id, draft).await?))
}

async fn delete_policy(State(state): State<AppState>, Path(id): Path<String>) -> Result<StatusCode, AppError> {
    if state.store().delete_policy(&id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(Error::PolicyNotFound(id).into())
    }
}

#[derive(Debug, Deserialize)]
struct GroupName {
    name: String,
}

#[derive(Debug, Deserialize)]
struct GroupMembership {
    policy_ids: Vec<String>,
}

async fn list_groups(State(state): State<AppState>) -> Result<Json<Vec<Group>>, AppError> {
    Ok(Json(state.store().list_groups().await?))
}

async fn create_group(
    State(state): State<AppState>,
    payload: Result<Json<GroupName>, JsonRejection>,
) -> Result<(StatusCode, Json<Group>), AppError> {
    let Json(body) = payload?;
    let group = state.store().create_group(&body.name).await?;
    Ok((StatusCode::CREATED, Json(group)))
}

async fn get_group(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Group>, AppError> {
    state
        .store()
        .get_group(&id)
        .await?
        .map(Json)
        .ok_or_else(|| Error::GroupNotFound(id).into())
}

async fn rename_group(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<GroupName>, JsonRejection>,
) -> Result<Json<Group>, AppError> {
    let Json(body) = payload?;
    Ok(Json(state.store().rename_group(&id, &body.name).await?))
}

async fn delete_group(State(state): State<AppState>, Path(id): Path<String>) -> Result<StatusCode, AppError> {
    if state.store().delete_group(&id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(Error::GroupNotFound(id).into())
    }
}

/// The group's active policies, as the pipeline would see them now
async fn group_policies(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ResolvedGroupSummary>, AppError> {
    // Resolve strictly by id here; a name fallback would let a group whose
    // name equals another group's id shadow it.
    if state.store().get_group(&id).await?.is_none() {
        return Err(Error::GroupNotFound(id).into());
    }
    state
        .store()
        .resolve_group(&GroupSelector::by_id(id.as_str()))
        .await?
        .map(|resolved| Json(resolved.summary()))
        .ok_or_else(|| Error::GroupNotFound(id).into())
}

async fn replace_group_policies(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<GroupMembership>, JsonRejection>,
) -> Result<Json<Group>, AppError> {
    let Json(body) = payload?;
    Ok(Json(state.store().update_group_policies(&id, body.policy_ids).await?))
}

async fn add_group_policy(
    State(state): State<AppState>,
    Path((id, policy_id)): Path<(String, String)>,
) -> Result<Json<Group>, AppError> {
    Ok(Json(state.store().add_policy_to_group(&id, &policy_id).await?))
}

async fn remove_group_policy(
    State(state): State<AppState>,
    Path((id, policy_id)): Path<(String, String)>,
) -> Result<Json<Group>, AppError> {
    Ok(Json(state.store().remove_policy_from_group(&id, &policy_id).await?))
}

/// `/metrics` query string
#[derive(Debug, Default, Deserialize)]
pub struct MetricsParams {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    /// `1h`, `24h`, `7d` or `all`, ending at `to` (default now); ignored when `from` is given
    pub range: Option<String>,
    pub group_by: Option<String>,
}

impl MetricsParams {
    pub fn into_query(self, now: DateTime<Utc>) -> Result<MetricsQuery, AppError> {
        let mut query = match (&self.from, &self.range) {
            (None, Some(range)) => {
                let range: TimeRange = range.parse().map_err(AppError::InvalidRequest)?;
                MetricsQuery::new().range(range, self.to.unwrap_or(now))
            }
            _ => MetricsQuery {
                from: self.from,
                to: self.to,
                group_by: None,
            },
        };

        if let Some(group_by) = &self.group_by {
            let group_by: GroupBy = group_by.parse().map_err(AppError::InvalidRequest)?;
            query = query.group_by(group_by);
        }
        Ok(query)
    }
}

async fn metrics_summary(
    State(state): State<AppState>,
    params: Result<Query<MetricsParams>, QueryRejection>,
) -> Result<Json<MetricsSummary>, AppError> {
    let Query(params) = params?;
    let query = params.into_query(Utc::now())?;

    let sink = state.pipeline.sink().clone();
    let summary = tokio::task::spawn_blocking(move || sink.query(&query))
        .await
        .map_err(|e| Error::internal(format!("metrics query task failed: {}", e)))??;
    Ok(Json(summary))
}

/// `/logs` query string
#[derive(Debug, Default, Deserialize)]
pub struct LogParams {
    pub status: Option<String>,
    pub agent_id: Option<String>,
    pub limit: Option<usize>,
}

impl LogParams {
    pub fn into_query(self) -> Result<LogQuery, AppError> {
        let mut query = LogQuery::new();
        if let Some(status) = self.status.as_deref().filter(|s| !s.trim().is_empty()) {
            query = query.status(status.parse().map_err(AppError::InvalidRequest)?);
        }
        if let Some(agent_id) = self.agent_id {
            query = query.agent(agent_id);
        }
        if let Some(limit) = self.limit {
            query = query.limit(limit);
        }
        Ok(query)
    }
}

async fn recent_logs(
    State(state): State<AppState>,
    params: Result<Query<LogParams>, QueryRejection>,
) -> Result<Json<Vec<LogRecord>>, AppError> {
    let Query(params) = params?;
    let query = params.into_query()?;

    let sink = state.pipeline.sink().clone();
    let logs = tokio::task::spawn_blocking(move || sink.query_logs(&query))
        .await
        .map_err(|e| Error::internal(format!("log query task failed: {}", e)))??;
    Ok(Json(logs))
}

async fn prometheus(State(state): State<AppState>) -> Response {
    match &state.prometheus {
        Some(handle) => handle.render().into_response(),
        None => (StatusCode::NOT_FOUND, "Prometheus exporter not installed").into_response(),
    }
}

#[derive(Debug, Serialize)]
struct StatsResponse {
    #[serde(flatten)]
    snapshot: MetricsSnapshot,
    avg_latency_us: u64,
    block_rate: f64,
}

async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let snapshot = state.metrics().snapshot();
    Json(StatsResponse {
        avg_latency_us: snapshot.avg_latency_us(),
        block_rate: snapshot.block_rate(),
        snapshot,
    })
}

async fn fallback() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "Not found")
}

/// Error handling
#[derive(Debug)]
pub enum AppError {
    /// Malformed query parameter
    InvalidRequest(String),
    /// Body or query string the extractor refused, with its status
    Rejected { status: StatusCode, message: String },
    Domain(Error),
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppError::InvalidRequest(msg) | AppError::Rejected { message: msg, .. } => {
                write!(f, "invalid request: {}", msg)
            }
            AppError::Domain(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for AppError {}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        AppError::Domain(err)
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Rejected {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::Rejected {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl AppError {
    fn status_and_message(&self) -> (StatusCode, &'static str, String) {
        match self {
            AppError::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, "invalid_request_error", msg.clone()),
            AppError::Rejected { status, message } => (*status, "invalid_request_error", message.clone()),
            AppError::Domain(err) => {
                let status = match err {
                    Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
                    Error::PolicyCompile { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                    Error::GroupNotFound(_) | Error::PolicyNotFound(_) => StatusCode::NOT_FOUND,
                    Error::PolicyInUse { .. } | Error::DuplicateGroup(_) => StatusCode::CONFLICT,
                    Error::OracleUnavailable(_) => {
                        return (
                            StatusCode::SERVICE_UNAVAILABLE,
                            err.kind(),
                            "upstream oracle unavailable".to_string(),
                        )
                    }
                    _ => {
                        error!(error = %err, "Request failed");
                        return (StatusCode::INTERNAL_SERVER_ERROR, err.kind(), "internal error".to_string());
                    }
                };
                (status, err.kind(), err.to_string())
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, kind, message) = self.status_and_message();

        let body = json!({
            "error": {
                "message": message,
                "type": kind,
            }
        });

        (status, Json(body)).into_response()
    }
}

/**
 * API REST TELEMON - Serveur HTTP du kernel
 *
 * RÔLE :
 * Expose la façade Telemetry en JSON pour tableaux de bord et scripts.
 * Aucune logique métier ici : chaque route appelle une opération de la façade.
 *
 * ROUTES :
 * - GET  /health, /system/health, /status
 * - GET  /state, /state/value?topic=
 * - GET  /window
 * - GET  /usage?from=&to= (RFC 3339) ou /usage?from_day=&to_day=, /usage/span
 * - POST /toggle?topic=
 *
 * ERREURS :
 * 400 plage invalide, 404 topic non commutable ou historique vide,
 * 503 broker non connecté, 502 publication refusée par le client.
 */

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use telemon_core::{
    DayMark, FacadeError, LinkDiagnostics, PublishError, Reading, Telemetry, UsageError, UsageRange,
    UsageSummary,
};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::warn;

use crate::health::{HealthTracker, KernelHealth};

/// Number of slider marks in /usage/span.
const SPAN_MARKS: u32 = 5;

#[derive(Clone)]
pub struct AppState {
    pub telemetry: Arc<Telemetry>,
    pub health_tracker: HealthTracker,
}

type ApiError = (StatusCode, Json<Value>);

#[derive(Debug, Serialize)]
struct TopicView {
    topic: String,
    value: String,
}

#[derive(Debug, Serialize)]
struct SpanView {
    span: Option<UsageRange>,
    days: i64,
    marks: Vec<DayMark>,
}

#[derive(Debug, Deserialize)]
struct TopicParams {
    topic: String,
}

#[derive(Debug, Deserialize)]
struct UsageParams {
    from: Option<String>,
    to: Option<String>,
    from_day: Option<i64>,
    to_day: Option<i64>,
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/system/health", get(get_system_health))
        .route("/status", get(get_status))
        .route("/state", get(get_state))
        .route("/state/value", get(get_value))
        .route("/window", get(get_window))
        .route("/usage", get(get_usage))
        .route("/usage/span", get(get_usage_span))
        .route("/toggle", post(toggle))
        .with_state(app_state)
}

fn api_error(code: StatusCode, msg: impl std::fmt::Display) -> ApiError {
    (code, Json(json!({ "ok": false, "msg": msg.to_string() })))
}

fn usage_error(err: UsageError) -> ApiError {
    let code = match err {
        UsageError::InvertedRange { .. } | UsageError::DayOutOfRange(_) => StatusCode::BAD_REQUEST,
        UsageError::EmptyHistory => StatusCode::NOT_FOUND,
    };
    api_error(code, err)
}

fn facade_error(err: FacadeError) -> ApiError {
    match err {
        FacadeError::NotSwitchable(_) => api_error(StatusCode::NOT_FOUND, err),
        FacadeError::Publish(PublishError::NotConnected(_)) => api_error(StatusCode::SERVICE_UNAVAILABLE, err),
        FacadeError::Publish(PublishError::Rejected(_)) => {
            warn!("[http] {err}");
            api_error(StatusCode::BAD_GATEWAY, err)
        }
        FacadeError::Usage(usage) => usage_error(usage),
    }
}

// GET /system/health
async fn get_system_health(State(app): State<AppState>) -> Json<KernelHealth> {
    Json(app.health_tracker.get_health(&app.telemetry))
}

// GET /status (lien broker)
async fn get_status(State(app): State<AppState>) -> Json<LinkDiagnostics> {
    Json(app.telemetry.status())
}

// GET /state (tous les topics)
async fn get_state(State(app): State<AppState>) -> Json<Vec<TopicView>> {
    let list = app
        .telemetry
        .state_snapshot()
        .into_iter()
        .map(|(topic, value)| TopicView { topic, value })
        .collect();
    Json(list)
}

// GET /state/value?topic=
async fn get_value(State(app): State<AppState>, Query(params): Query<TopicParams>) -> Json<TopicView> {
    let value = app.telemetry.current_value(&params.topic);
    Json(TopicView {
        topic: params.topic,
        value,
    })
}

// GET /window (dernière heure du canal suivi)
async fn get_window(State(app): State<AppState>) -> Json<Vec<Reading>> {
    Json(app.telemetry.window_snapshot())
}

// GET /usage
async fn get_usage(
    State(app): State<AppState>,
    Query(params): Query<UsageParams>,
) -> Result<Json<UsageSummary>, ApiError> {
    let telemetry = &app.telemetry;
    let summary = match params {
        UsageParams { from: Some(from), to: Some(to), from_day: None, to_day: None } => {
            telemetry
                .aggregate_between(parse_instant(&from)?, parse_instant(&to)?)
                .map_err(usage_error)?
        }
        UsageParams { from: None, to: None, from_day: Some(from), to_day: Some(to) } => {
            telemetry.aggregate_days(from, to).map_err(usage_error)?
        }
        UsageParams { from: None, to: None, from_day: None, to_day: None } => {
            let span = telemetry.history_span().ok_or_else(|| usage_error(UsageError::EmptyHistory))?;
            telemetry.aggregate(span)
        }
        _ => {
            return Err(api_error(
                StatusCode::BAD_REQUEST,
                "give both from and to, or both from_day and to_day",
            ))
        }
    };
    Ok(Json(summary))
}

fn parse_instant(raw: &str) -> Result<OffsetDateTime, ApiError> {
    OffsetDateTime::parse(raw, &Rfc3339)
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, format!("invalid timestamp {raw:?}: {e}")))
}

// GET /usage/span (bornes de l'historique pour le slider)
async fn get_usage_span(State(app): State<AppState>) -> Json<SpanView> {
    let telemetry = &app.telemetry;
    let span = telemetry.history_span();
    Json(SpanView {
        span,
        days: span.map(|s| (s.end - s.start).whole_days()).unwrap_or(0),
        marks: telemetry.history_marks(SPAN_MARKS),
    })
}

// POST /toggle?topic=
async fn toggle(
    State(app): State<AppState>,
    Query(params): Query<TopicParams>,
) -> Result<Json<Value>, ApiError> {
    let sent = app.telemetry.toggle(&params.topic).map_err(facade_error)?;
    Ok(Json(json!({ "ok": true, "topic": params.topic, "sent": sent })))
}

use axum::{Json, extract::State, http::StatusCode};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::db::schema::SchemaSnapshot;
use crate::db::{ConnectionDescriptor, ConnectionError};
use crate::pipeline::TurnReport;
use crate::pipeline::conversation::Turn;
use crate::pipeline::session::Session;
use crate::pipeline::synthesizer::SynthesisError;
use crate::web::state::AppState;

type ApiError = (StatusCode, String);

// Request types

#[derive(Debug, Deserialize, Clone)]
pub struct QuestionRequest {
    pub question: String,
}

// Response types

#[derive(Debug, Serialize)]
pub struct ConnectResponse {
    pub database: String,
    pub tables: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct TranslateResponse {
    pub question: String,
    pub sql: String,
}

#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub version: String,
    pub uptime_seconds: i64,
    /// A turn holds the session; session fields are left empty.
    pub busy: bool,
    pub connected: bool,
    pub database: Option<String>,
    pub connected_at: Option<DateTime<Utc>>,
    pub turn_count: usize,
    pub llm_backend: String,
}

// API Implementations

pub async fn connect(
    state: State<Arc<AppState>>,
    Json(descriptor): Json<ConnectionDescriptor>,
) -> Result<Json<ConnectResponse>, ApiError> {
    info!("Connecting to {}", descriptor.redacted_url());

    let (session, schema) = Session::open(descriptor, state.config.schema.sample_rows)
        .await
        .map_err(connection_error)?;

    let response = ConnectResponse {
        database: session.descriptor().redacted_url(),
        tables: schema.table_names().into_iter().map(String::from).collect(),
    };

    // A new connection starts a new conversation
    *state.session.lock().await = Some(session);
    Ok(Json(response))
}

pub async fn disconnect(state: State<Arc<AppState>>) -> StatusCode {
    match state.session.lock().await.take() {
        Some(session) => {
            info!("Disconnected from {}", session.descriptor().redacted_url());
            StatusCode::NO_CONTENT
        }
        None => StatusCode::NOT_FOUND,
    }
}

pub async fn chat(
    state: State<Arc<AppState>>,
    Json(payload): Json<QuestionRequest>,
) -> Result<Json<TurnReport>, ApiError> {
    let question = require_question(&payload.question)?;

    let mut guard = state.session.lock().await;
    let session = guard.as_mut().ok_or_else(not_connected)?;

    info!("Chat question: {}", question);
    let report = session.ask(&state.pipeline, question).await;
    Ok(Json(report))
}

pub async fn history(state: State<Arc<AppState>>) -> Result<Json<Vec<Turn>>, ApiError> {
    let guard = state.session.lock().await;
    let session = guard.as_ref().ok_or_else(not_connected)?;
    Ok(Json(session.conversation().turns().to_vec()))
}

/// SQL only. Uses the connected schema when there is one.
pub async fn translate(
    state: State<Arc<AppState>>,
    Json(payload): Json<QuestionRequest>,
) -> Result<Json<TranslateResponse>, ApiError> {
    let question = require_question(&payload.question)?;

    let schema = {
        let guard = state.session.lock().await;
        match guard.as_ref() {
            Some(session) => {
                let snapshot = session.schema().await.map_err(connection_error)?;
                Some((snapshot, session.database().kind()))
            }
            None => None,
        }
    };

    let query = state
        .pipeline
        .translate(question, schema)
        .await
        .map_err(|e| {
            warn!("Translation failed: {}", e);
            match e {
                SynthesisError::NoSqlFound { .. } => (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()),
                SynthesisError::Generation(_) => (StatusCode::BAD_GATEWAY, e.to_string()),
                SynthesisError::Prompt(_) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
            }
        })?;

    Ok(Json(TranslateResponse {
        question: query.question,
        sql: query.sql,
    }))
}

pub async fn get_schema(state: State<Arc<AppState>>) -> Result<Json<SchemaSnapshot>, ApiError> {
    let guard = state.session.lock().await;
    let session = guard.as_ref().ok_or_else(not_connected)?;
    let schema = session.schema().await.map_err(connection_error)?;
    Ok(Json(schema))
}

pub async fn system_status(state: State<Arc<AppState>>) -> Json<SystemStatus> {
    let now = chrono::Utc::now();
    let uptime = now.signed_duration_since(state.startup_time).num_seconds();

    let mut status = SystemStatus {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: uptime,
        busy: false,
        connected: false,
        database: None,
        connected_at: None,
        turn_count: 0,
        llm_backend: state.config.llm.backend.clone(),
    };

    // Never queue behind a running turn
    match state.session.try_lock() {
        Ok(guard) => {
            if let Some(session) = guard.as_ref() {
                status.connected = true;
                status.database = Some(session.descriptor().redacted_url());
                status.connected_at = Some(session.connected_at());
                status.turn_count = session.conversation().len();
            }
        }
        Err(_) => status.busy = true,
    }

    Json(status)
}

// Helpers

fn require_question(question: &str) -> Result<&str, ApiError> {
    let question = question.trim();
    if question.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Question must not be empty".to_string()));
    }
    Ok(question)
}

fn not_connected() -> ApiError {
    (
        StatusCode::CONFLICT,
        "No database connected; POST /api/connect first".to_string(),
    )
}

fn connection_error(e: ConnectionError) -> ApiError {
    error!("Database connection error: {}", e);
    let status = match e {
        ConnectionError::InvalidDescriptor(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::BAD_GATEWAY,
    };
    (status, e.to_string())
}

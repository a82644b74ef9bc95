use axum::{extract::rejection::JsonRejection, extract::State, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::notifications::EmailRequest;
use crate::AppState;

use super::error::ApiError;
use super::validation::{validate_email_request, validate_recipient};

#[derive(Debug, Serialize, Deserialize)]
pub struct SendEmailResponse {
    pub success: bool,
    #[serde(rename = "type")]
    pub kind: String,
    pub message_id: String,
}

#[derive(Debug, Deserialize)]
pub struct TestEmailRequest {
    pub to: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TestEmailResponse {
    pub success: bool,
    pub message_id: String,
    pub to: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub environment: String,
    pub realtime: bool,
    pub timestamp: String,
}

/// Liveness check. Never touches SMTP or Supabase.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        environment: state.config.environment.to_string(),
        realtime: state.realtime_enabled,
        timestamp: Utc::now().to_rfc3339(),
    })
}

/// Send one templated email on behalf of a trusted caller
pub async fn send_email(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<EmailRequest>, JsonRejection>,
) -> Result<Json<SendEmailResponse>, ApiError> {
    let Json(request) = payload?;
    validate_email_request(&request)?;

    tracing::info!(kind = %request, to = %request.recipient(), "Manual email requested");

    let message_id = state.notifications.dispatch(&request).await?;

    Ok(Json(SendEmailResponse {
        success: true,
        kind: request.kind().to_string(),
        message_id,
    }))
}

/// Send the fixed test message to verify SMTP delivery end to end
pub async fn test_email(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<TestEmailRequest>, JsonRejection>,
) -> Result<Json<TestEmailResponse>, ApiError> {
    let Json(request) = payload?;
    let to = request.to.trim().to_string();
    validate_recipient("to", &to)?;

    tracing::info!(to = %to, "Test email requested");

    let message_id = state.notifications.send_test(&to).await?;

    Ok(Json(TestEmailResponse {
        success: true,
        message_id,
        to,
    }))
}

//! # Handlers
//!
//! Thin translation between HTTP and the tip and admin services.

use axum::{
    extract::{rejection::JsonRejection, rejection::PathRejection, Path, State},
    http::{header::CONTENT_TYPE, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use domains::models::{Ban, PublicTip, SubmissionOutcome, SubmissionRequest};
use domains::ports::Clock;
use domains::AppError;
use serde::{Deserialize, Serialize};
use serde_json::json;
use services::AdminGrant;
use tracing::info;
use uuid::Uuid;

use crate::error::ApiError;
use crate::middleware::{header_str, ClientInfo, ADMIN_TOKEN_HEADER};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct SubmitTipBody {
    pub tip_content: String,
}

#[derive(Debug, Serialize)]
pub struct TipListing {
    pub tips: Vec<PublicTip>,
    pub count: usize,
}

#[derive(Debug, Deserialize)]
pub struct BanBody {
    #[serde(default)]
    pub identifier: Option<String>,
    #[serde(default)]
    pub tip_id: Option<Uuid>,
    pub duration_minutes: i64,
    pub reason: String,
}

pub async fn submit_tip(
    State(state): State<AppState>,
    client: ClientInfo,
    body: Result<Json<SubmitTipBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = body.map_err(|e| {
        state.metrics.record_submission("invalid");
        ApiError::MalformedRequest(e.body_text())
    })?;

    let request = SubmissionRequest {
        content: body.tip_content,
        network_address: client.network_address,
        client_signature: client.client_signature,
        session_token: client.session_token,
    };

    let outcome = match state.tips.submit(request).await {
        Ok(outcome) => outcome,
        Err(err) => {
            state.metrics.record_submission(match &err {
                AppError::ValidationError(_) => "invalid",
                AppError::DependencyUnavailable(_) => "unavailable",
                _ => "error",
            });
            return Err(err.into());
        }
    };
    state.metrics.record_submission(outcome.label());

    let now = state.clock.now();
    let response = match outcome {
        SubmissionOutcome::Accepted(receipt) => {
            let mut response = Json(json!({
                "status": "success",
                "tip_id": receipt.tip_id,
                "identity_hash": receipt.identity_hash,
                "moderated": receipt.moderated,
                "reason": receipt.reason,
            }))
            .into_response();
            response
                .headers_mut()
                .insert("X-RateLimit-Remaining", HeaderValue::from(receipt.remaining));
            response
        }
        SubmissionOutcome::Rejected { reason } => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "status": "rejected", "reason": reason })),
        )
            .into_response(),
        SubmissionOutcome::RateLimited { reset_at } => {
            let mut response = (
                StatusCode::TOO_MANY_REQUESTS,
                Json(json!({
                    "status": "rate_limited",
                    "reason": "Too many tips submitted, try again later",
                    "reset_at": reset_at,
                })),
            )
                .into_response();
            let retry_after = (reset_at - now).num_seconds().max(1);
            let headers = response.headers_mut();
            headers.insert("X-RateLimit-Remaining", HeaderValue::from(0u32));
            headers.insert("X-RateLimit-Reset", HeaderValue::from(reset_at.timestamp()));
            headers.insert("Retry-After", HeaderValue::from(retry_after));
            response
        }
        SubmissionOutcome::Banned { reason, expires_at } => (
            StatusCode::FORBIDDEN,
            Json(json!({
                "status": "banned",
                "reason": reason,
                "expires_at": expires_at,
            })),
        )
            .into_response(),
    };
    Ok(response)
}

pub async fn list_tips(State(state): State<AppState>) -> Json<TipListing> {
    let tips = state.tips.list_recent().await;
    Json(TipListing {
        count: tips.len(),
        tips,
    })
}

pub async fn get_tip(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<PublicTip>, ApiError> {
    let Path(id) = id.map_err(|e| ApiError::MalformedRequest(e.body_text()))?;
    Ok(Json(state.tips.get_tip(id).await?))
}

async fn authorize(state: &AppState, headers: &HeaderMap) -> Result<AdminGrant, ApiError> {
    let presented = header_str(headers, ADMIN_TOKEN_HEADER).unwrap_or_default();
    Ok(state.admin.authorize(presented).await?)
}

#[derive(Debug, Serialize)]
pub struct SubmitterView {
    pub tip_id: Uuid,
    pub network_address: String,
    pub client_signature: String,
    pub captured_at: DateTime<Utc>,
    pub session_token: Option<String>,
}

pub async fn reveal_submitter(
    State(state): State<AppState>,
    headers: HeaderMap,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<SubmitterView>, ApiError> {
    let grant = authorize(&state, &headers).await?;
    let Path(tip_id) = id.map_err(|e| ApiError::MalformedRequest(e.body_text()))?;

    let metadata = state.admin.reveal_submitter(&grant, tip_id).await?;
    state.metrics.record_admin_action("reveal");
    Ok(Json(SubmitterView {
        tip_id,
        network_address: metadata.network_address,
        client_signature: metadata.client_signature,
        captured_at: metadata.captured_at,
        session_token: metadata.session_token,
    }))
}

pub async fn create_ban(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<BanBody>, JsonRejection>,
) -> Result<(StatusCode, Json<Ban>), ApiError> {
    let grant = authorize(&state, &headers).await?;
    let Json(body) = body.map_err(|e| ApiError::MalformedRequest(e.body_text()))?;
    let duration = chrono::Duration::try_minutes(body.duration_minutes).ok_or_else(|| {
        ApiError::MalformedRequest("duration_minutes is out of range".to_string())
    })?;

    let ban = match (body.identifier, body.tip_id) {
        (Some(identifier), None) => {
            state
                .admin
                .ban_identifier(&grant, &identifier, duration, &body.reason)
                .await?
        }
        (None, Some(tip_id)) => {
            state
                .admin
                .ban_submitter(&grant, tip_id, duration, &body.reason)
                .await?
        }
        _ => {
            return Err(ApiError::MalformedRequest(
                "exactly one of identifier or tip_id is required".to_string(),
            ))
        }
    };
    state.metrics.record_admin_action("ban");
    Ok((StatusCode::CREATED, Json(ban)))
}

pub async fn list_bans(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Ban>>, ApiError> {
    let grant = authorize(&state, &headers).await?;
    Ok(Json(state.admin.active_bans(&grant).await))
}

pub async fn lift_ban(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(identifier): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let grant = authorize(&state, &headers).await?;
    let removed = state.admin.lift_ban(&grant, &identifier).await?;
    state.metrics.record_admin_action("unban");
    Ok(Json(json!({ "status": "unbanned", "removed": removed })))
}

/// Hands the next batch of accepted tips to a downstream consumer.
pub async fn take_pending(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    authorize(&state, &headers).await?;
    let tip_ids = state.tips.take_pending_batch().await;
    info!(count = tip_ids.len(), "pending batch requested");
    Ok(Json(json!({ "count": tip_ids.len(), "tip_ids": tip_ids })))
}

pub async fn last_interaction(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    authorize(&state, &headers).await?;
    Ok(Json(json!({ "context": state.tips.last_interaction().await })))
}

pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let degraded = state.bans.is_degraded();
    Json(json!({
        "status": if degraded { "degraded" } else { "ok" },
        "ban_store_degraded": degraded,
    }))
}

pub async fn metrics(State(state): State<AppState>) -> Result<Response, ApiError> {
    let body = state.metrics.render().map_err(|_| ApiError::Metrics)?;
    Ok((
        [(
            CONTENT_TYPE,
            "application/openmetrics-text; version=1.0.0; charset=utf-8",
        )],
        body,
    )
        .into_response())
}

use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use crate::app_state::AppState;
use crate::auth::AuthenticatedUser;
use crate::error::AppError;
use crate::models::{non_blank, Decision, JoinRequestView};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    pub team_id: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RespondRequest {
    pub action: String,
}

// POST /api/join-requests
pub async fn submit_join_request(
    data: web::Data<AppState>,
    user: AuthenticatedUser,
    body: web::Json<SubmitRequest>,
) -> Result<HttpResponse, AppError> {
    let SubmitRequest { team_id, message } = body.into_inner();
    let team_id = non_blank(team_id.as_deref())
        .ok_or_else(|| AppError::validation("Team ID is required"))?;
    let request = data
        .lifecycle
        .submit_join_request(&team_id, user.id(), message, Utc::now())
        .await?;
    Ok(HttpResponse::Created().json(json!({
        "success": true,
        "message": "Join request sent successfully",
        "joinRequest": JoinRequestView::from(&request),
    })))
}

// GET /api/join-requests/team/{team_id}
pub async fn team_join_requests(
    data: web::Data<AppState>,
    user: AuthenticatedUser,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let requests = data.lifecycle.team_join_requests(&path, user.id()).await?;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "joinRequests": requests })))
}

// PATCH /api/join-requests/{request_id}/respond
pub async fn respond_to_join_request(
    data: web::Data<AppState>,
    user: AuthenticatedUser,
    path: web::Path<String>,
    body: web::Json<RespondRequest>,
) -> Result<HttpResponse, AppError> {
    let decision = Decision::from_action(&body.action)
        .ok_or_else(|| AppError::validation(r#"Action must be either "approve" or "reject""#))?;
    let request = data
        .lifecycle
        .respond_to_join_request(&path, user.id(), decision, Utc::now())
        .await?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": format!("Join request {}", request.status.as_str()),
        "joinRequest": JoinRequestView::from(&request),
    })))
}

// GET /api/join-requests/user
pub async fn user_join_requests(
    data: web::Data<AppState>,
    user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    let requests = data.lifecycle.user_join_requests(user.id()).await?;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "joinRequests": requests })))
}

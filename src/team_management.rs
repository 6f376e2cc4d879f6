use actix_web::{web, HttpResponse};
use chrono::Utc;
use log::debug;
use serde_json::json;

use crate::app_state::AppState;
use crate::auth::AuthenticatedUser;
use crate::error::AppError;
use crate::models::{NewTeam, TeamView};

// GET /api/teams
pub async fn list_teams(data: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let teams = data.lifecycle.list_teams().await?;
    let teams: Vec<TeamView> = teams.iter().map(TeamView::from).collect();
    Ok(HttpResponse::Ok().json(json!({ "success": true, "teams": teams })))
}

// POST /api/teams
pub async fn create_team(
    data: web::Data<AppState>,
    user: AuthenticatedUser,
    body: web::Json<NewTeam>,
) -> Result<HttpResponse, AppError> {
    debug!("create_team called by {} with {:?}", user.id(), body);
    let team = data
        .lifecycle
        .create_team(user.id(), body.into_inner(), Utc::now())
        .await?;
    Ok(HttpResponse::Created().json(json!({
        "success": true,
        "message": "Team created successfully",
        "team": TeamView::from(&team),
    })))
}

// GET /api/teams/{team_id}
pub async fn get_team(
    data: web::Data<AppState>,
    user: AuthenticatedUser,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let details = data.lifecycle.team_details(&path, user.id()).await?;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "details": details })))
}

// GET /api/join-requests/joinedevent
/// Teams the caller belongs to, with their member counts.
pub async fn user_teams(
    data: web::Data<AppState>,
    user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    let teams = data.lifecycle.teams_of_user(user.id()).await?;
    let teams: Vec<TeamView> = teams.iter().map(TeamView::from).collect();
    Ok(HttpResponse::Ok().json(json!({ "success": true, "teams": teams })))
}

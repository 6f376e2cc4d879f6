use actix_web::{web, HttpResponse};
use chrono::Utc;
use log::error;
use serde_json::json;

use crate::app_state::AppState;
use crate::auth::AuthenticatedUser;
use crate::chat_server::TeamMessagePosted;
use crate::error::AppError;
use crate::models::{NewMessage, Team};

/// Everyone who can read the team channel except the sender.
fn recipients(team: &Team, sender_id: &str) -> Vec<String> {
    let mut ids: Vec<String> = team
        .members
        .iter()
        .chain(std::iter::once(&team.created_by))
        .filter(|id| id.as_str() != sender_id)
        .cloned()
        .collect();
    ids.sort();
    ids.dedup();
    ids
}

// GET /api/messages/{team_id}
pub async fn get_messages(
    data: web::Data<AppState>,
    user: AuthenticatedUser,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let messages = data.lifecycle.team_messages(&path, user.id()).await?;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "messages": messages })))
}

// POST /api/messages/{team_id}
pub async fn create_message(
    data: web::Data<AppState>,
    user: AuthenticatedUser,
    path: web::Path<String>,
    body: web::Json<NewMessage>,
) -> Result<HttpResponse, AppError> {
    let (team, view) = data
        .lifecycle
        .post_message(&path, user.id(), body.into_inner(), Utc::now())
        .await?;

    match serde_json::to_string(&json!({ "type": "teamMessage", "message": &view })) {
        Ok(payload) => data.chat_server.do_send(TeamMessagePosted {
            recipients: recipients(&team, user.id()),
            payload,
        }),
        // The message is stored; live delivery is best effort.
        Err(e) => error!("Could not encode message {} for relay: {}", view.id, e),
    }

    Ok(HttpResponse::Created().json(json!({ "success": true, "message": view })))
}

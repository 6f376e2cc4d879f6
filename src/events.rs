use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use crate::app_state::AppState;
use crate::auth::AuthenticatedUser;
use crate::error::AppError;
use crate::models::{non_blank, EventView, NewEvent};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterTeamRequest {
    pub team_id: Option<String>,
}

// GET /api/events
pub async fn list_events(data: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let now = Utc::now();
    let events: Vec<EventView> = data
        .lifecycle
        .list_events()
        .await?
        .iter()
        .map(|event| EventView::at(event, now))
        .collect();
    Ok(HttpResponse::Ok().json(json!({ "success": true, "count": events.len(), "events": events })))
}

// POST /api/events
pub async fn create_event(
    data: web::Data<AppState>,
    user: AuthenticatedUser,
    body: web::Json<NewEvent>,
) -> Result<HttpResponse, AppError> {
    let now = Utc::now();
    let event = data
        .lifecycle
        .create_event(user.id(), body.into_inner(), now)
        .await?;
    Ok(HttpResponse::Created().json(json!({
        "success": true,
        "message": "Event created successfully",
        "event": EventView::at(&event, now),
    })))
}

// GET /api/events/{id}
pub async fn get_event(
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let event = data.lifecycle.get_event(&path).await?;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "event": EventView::at(&event, Utc::now()) })))
}

// PATCH /api/events/{id}
pub async fn register_team(
    data: web::Data<AppState>,
    user: AuthenticatedUser,
    path: web::Path<String>,
    body: web::Json<RegisterTeamRequest>,
) -> Result<HttpResponse, AppError> {
    let team_id = non_blank(body.team_id.as_deref())
        .ok_or_else(|| AppError::validation("Team ID is required"))?;
    let event = data
        .lifecycle
        .register_team_for_event(&path, &team_id, user.id(), Utc::now())
        .await?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "Team successfully joined the event",
        "eventParticipants": event.participants,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app_state::testing::{self, TEST_SECRET};
    use crate::auth::{create_jwt, Authentication};
    use actix_web::{http::StatusCode, test as actix_test, App};
    use chrono::Duration;

    fn bearer(user: &str) -> (&'static str, String) {
        let token = create_jwt(user, TEST_SECRET, 1, Utc::now()).unwrap();
        ("Authorization", format!("Bearer {token}"))
    }

    fn event_body(max_team_size: u32) -> serde_json::Value {
        let now = Utc::now();
        json!({
            "title": "Rust Jam",
            "description": "Two days of crabs",
            "category": "hackathon",
            "dates": {
                "registrationStarts": now - Duration::days(1),
                "registrationEnds": now + Duration::days(5),
                "eventStart": now + Duration::days(10),
                "eventEnd": now + Duration::days(12),
            },
            "participantRules": { "minTeamSize": 1, "maxTeamSize": max_team_size },
            "eventLogistics": { "eventMode": "online" },
        })
    }

    #[actix_web::test]
    async fn team_registers_once_for_an_open_event() {
        let app = actix_test::init_service(
            App::new()
                .wrap(Authentication::new(TEST_SECRET))
                .app_data(web::Data::new(testing::state()))
                .configure(crate::routes),
        )
        .await;

        let req = actix_test::TestRequest::post()
            .uri("/api/events")
            .insert_header(bearer("org"))
            .set_json(event_body(4))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let body: serde_json::Value = actix_test::read_body_json(resp).await;
        let event_id = body["event"]["id"].as_str().unwrap().to_string();
        assert_eq!(body["event"]["status"], "registrationOpen");
        assert_eq!(body["event"]["participantRules"]["maxParticipants"], 500);

        let req = actix_test::TestRequest::post()
            .uri("/api/teams")
            .insert_header(bearer("alice"))
            .set_json(json!({ "teamName": "Crabs", "teamAim": "win", "maxMembers": 4 }))
            .to_request();
        let body: serde_json::Value = actix_test::call_and_read_body_json(&app, req).await;
        let team_id = body["team"]["id"].as_str().unwrap().to_string();
        assert_eq!(body["team"]["membersCount"], 1);

        let register = || {
            actix_test::TestRequest::patch()
                .uri(&format!("/api/events/{event_id}"))
                .insert_header(bearer("alice"))
                .set_json(json!({ "teamId": team_id }))
                .to_request()
        };
        let resp = actix_test::call_service(&app, register()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: serde_json::Value = actix_test::read_body_json(resp).await;
        assert_eq!(body["eventParticipants"], json!([team_id]));

        let resp = actix_test::call_service(&app, register()).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        let body: serde_json::Value = actix_test::read_body_json(resp).await;
        assert_eq!(body["message"], "Team already joined this event");

        let req = actix_test::TestRequest::get()
            .uri(&format!("/api/events/{event_id}"))
            .to_request();
        let body: serde_json::Value = actix_test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["event"]["participantsCount"], 1);
    }

    #[actix_web::test]
    async fn request_validation_maps_to_bad_request() {
        let app = actix_test::init_service(
            App::new()
                .wrap(Authentication::new(TEST_SECRET))
                .app_data(web::Data::new(testing::state()))
                .configure(crate::routes),
        )
        .await;

        let req = actix_test::TestRequest::patch()
            .uri("/api/events/whatever")
            .insert_header(bearer("alice"))
            .set_json(json!({}))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = actix_test::read_body_json(resp).await;
        assert_eq!(body["code"], "VALIDATION_ERROR");

        let req = actix_test::TestRequest::post()
            .uri("/api/events")
            .insert_header(bearer("org"))
            .set_json(json!({ "title": "No dates", "dates": "soon" }))
            .to_request();
        assert_eq!(actix_test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

        let req = actix_test::TestRequest::post()
            .uri("/api/events")
            .set_json(event_body(4))
            .to_request();
        assert_eq!(actix_test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn accepts_browser_form_payload() {
        let app = actix_test::init_service(
            App::new()
                .wrap(Authentication::new(TEST_SECRET))
                .app_data(web::Data::new(testing::state()))
                .configure(crate::routes),
        )
        .await;

        let req = actix_test::TestRequest::post()
            .uri("/api/events")
            .insert_header(bearer("org"))
            .set_json(json!({
                "title": "Campus Hack",
                "description": "Build something",
                "dates": {
                    "registrationStarts": "2030-01-01T10:00",
                    "registrationEnds": "2030-01-05T18:30",
                    "eventStart": "2030-01-10T09:00",
                    "eventEnd": "2030-01-11T17:00",
                },
                "location": "Main hall",
                "category": "hackathon",
                "tags": ["web", "ai"],
                "participantRules": {
                    "minTeamSize": "2",
                    "maxTeamSize": "4",
                    "maxParticipants": null,
                    "registrationFee": 0,
                    "eligibilityCriteria": "",
                },
                "eventLogistics": {
                    "eventMode": "offline",
                    "venueDetails": "Main hall",
                    "contactInformation": "",
                },
                "prizesAndRewards": { "prizes": "Cash", "certificates": true },
            }))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let body: serde_json::Value = actix_test::read_body_json(resp).await;
        assert_eq!(body["event"]["dates"]["registrationStarts"], "2030-01-01T10:00:00Z");
        assert_eq!(body["event"]["dates"]["registrationEnds"], "2030-01-05T18:30:00Z");
        assert_eq!(body["event"]["participantRules"]["minTeamSize"], 2);
        assert_eq!(body["event"]["participantRules"]["maxTeamSize"], 4);
        assert_eq!(body["event"]["participantRules"]["maxParticipants"], 500);
        assert_eq!(body["event"]["status"], "upcoming");
    }

    #[actix_web::test]
    async fn public_listing_ignores_an_expired_token() {
        let app = actix_test::init_service(
            App::new()
                .wrap(Authentication::new(TEST_SECRET))
                .app_data(web::Data::new(testing::state()))
                .configure(crate::routes),
        )
        .await;
        let expired = create_jwt("alice", TEST_SECRET, 1, Utc::now() - Duration::days(3)).unwrap();

        for uri in ["/api/events", "/api/teams"] {
            let req = actix_test::TestRequest::get()
                .uri(uri)
                .insert_header(("Authorization", format!("Bearer {expired}")))
                .to_request();
            assert_eq!(actix_test::call_service(&app, req).await.status(), StatusCode::OK);
        }

        let req = actix_test::TestRequest::post()
            .uri("/api/events")
            .insert_header(("Authorization", format!("Bearer {expired}")))
            .set_json(event_body(4))
            .to_request();
        assert_eq!(actix_test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);
    }
}

// src/main.rs

mod access;
mod app_state;
mod auth;
mod chat;
mod chat_server;
mod config;
mod eligibility;
mod error;
mod events;
mod join_requests;
mod lifecycle;
mod models;
mod store;
mod team_management;
mod user_management;
mod web_socket_server;

use std::sync::Arc;

use actix::Actor;
use actix_cors::Cors;
use actix_web::{http, middleware::Logger, web, App, HttpServer};
use env_logger::Env;
use log::{error, info};

use crate::app_state::AppState;
use crate::auth::{register, signin, signout, Authentication};
use crate::chat::{create_message, get_messages};
use crate::error::AppError;
use crate::events::{create_event, get_event, list_events, register_team};
use crate::join_requests::{
    respond_to_join_request, submit_join_request, team_join_requests, user_join_requests,
};
use crate::store::MongoStore;
use crate::team_management::{create_team, get_team, list_teams, user_teams};
use crate::user_management::{forget_password, profile, update_profile, upload_avatar};
use crate::web_socket_server::ws_index;

/// Mounts every route. Shared with the HTTP tests.
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(|err, _| {
        AppError::validation(err.to_string()).into()
    }))
    .service(
        web::scope("/api")
            // USERS
            .service(
                web::scope("/users")
                    .route("/register", web::post().to(register))
                    .route("/signin", web::post().to(signin))
                    .route("/signout", web::get().to(signout))
                    .route("/profile", web::get().to(profile))
                    .route("/update", web::patch().to(update_profile))
                    .route("/forgetpassword", web::patch().to(forget_password))
                    .route("/upload-avatar", web::post().to(upload_avatar)),
            )
            // TEAMS
            .service(
                web::scope("/teams")
                    .route("", web::get().to(list_teams))
                    .route("", web::post().to(create_team))
                    .route("/{team_id}", web::get().to(get_team)),
            )
            // EVENTS
            .service(
                web::scope("/events")
                    .route("", web::get().to(list_events))
                    .route("", web::post().to(create_event))
                    .route("/{id}", web::get().to(get_event))
                    .route("/{id}", web::patch().to(register_team)),
            )
            // JOIN REQUESTS
            .service(
                web::scope("/join-requests")
                    .route("", web::post().to(submit_join_request))
                    .route("/user", web::get().to(user_join_requests))
                    .route("/joinedevent", web::get().to(user_teams))
                    .route("/team/{team_id}", web::get().to(team_join_requests))
                    .route("/{request_id}/respond", web::patch().to(respond_to_join_request)),
            )
            // MESSAGES
            .service(
                web::scope("/messages")
                    .route("/{team_id}", web::get().to(get_messages))
                    .route("/{team_id}", web::post().to(create_message)),
            ),
    )
    // WEBSOCKET route for real-time
    .service(web::resource("/ws").route(web::get().to(ws_index)));
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let config = match config::Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            return Err(std::io::Error::new(std::io::ErrorKind::InvalidInput, e));
        }
    };
    let store = match MongoStore::connect(&config.mongo_uri, &config.database_name).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!("Could not connect to MongoDB: {}", e);
            return Err(std::io::Error::new(std::io::ErrorKind::Other, e));
        }
    };
    let chat_server = chat_server::ChatServer::new().start();
    let state = AppState::new(store, chat_server, config.clone());

    info!("Server running at http://{}", config.bind_address);
    info!("Allowed CORS Origin: {}", config.frontend_origin);

    let secret = config.jwt_secret.clone();
    let frontend_origin = config.frontend_origin.clone();
    HttpServer::new(move || {
        let cors = Cors::default()
            .allowed_origin(&frontend_origin)
            .allowed_methods(vec!["GET", "POST", "PUT", "PATCH", "DELETE", "OPTIONS"])
            .allowed_headers(vec![
                http::header::CONTENT_TYPE,
                http::header::ACCEPT,
                http::header::AUTHORIZATION,
            ])
            .supports_credentials()
            .max_age(3600);

        App::new()
            .wrap(Authentication::new(secret.clone()))
            .wrap(cors)
            .wrap(Logger::default())
            .app_data(web::Data::new(state.clone()))
            .configure(routes)
    })
    .bind(&config.bind_address)?
    .run()
    .await
}

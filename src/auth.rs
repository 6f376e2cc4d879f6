//! Accounts, session tokens and the authentication middleware.

use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::OnceLock;
use std::task::{Context, Poll};

use actix_web::{
    body::{BoxBody, MessageBody},
    cookie::{time::Duration as CookieDuration, Cookie},
    dev::{Payload, Service, ServiceRequest, ServiceResponse, Transform},
    http, web, Error, FromRequest, HttpMessage, HttpRequest, HttpResponse,
};
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::{DateTime, Duration, Utc};
use futures::future::{ok, ready, Ready};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use log::{debug, info, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::app_state::AppState;
use crate::error::{AppError, AppResult};
use crate::models::user::DEFAULT_PROFILE_PICTURE;
use crate::models::{new_id, User, UserView};

pub const SESSION_COOKIE: &str = "user";
pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
}

pub fn create_jwt(
    user_id: &str,
    secret: &str,
    ttl_hours: i64,
    now: DateTime<Utc>,
) -> AppResult<String> {
    let claims = Claims {
        sub: user_id.to_string(),
        exp: (now + Duration::hours(ttl_hours)).timestamp().max(0) as usize,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))
        .map_err(|e| AppError::Infrastructure(format!("Token encoding failed: {e}")))
}

/// Returns the user id carried by a valid, unexpired token.
pub fn verify_jwt(token: &str, secret: &str) -> Result<String, jsonwebtoken::errors::Error> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(data.claims.sub)
}

fn session_cookie(token: String, ttl_hours: i64) -> Cookie<'static> {
    Cookie::build(SESSION_COOKIE, token)
        .path("/")
        .http_only(true)
        .max_age(CookieDuration::hours(ttl_hours))
        .finish()
}

// MIDDLEWARE

/// Identity of the caller, placed in request extensions by
/// [`Authentication`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser(pub String);

impl AuthenticatedUser {
    pub fn id(&self) -> &str {
        &self.0
    }
}

impl FromRequest for AuthenticatedUser {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(
            req.extensions()
                .get::<AuthenticatedUser>()
                .cloned()
                .ok_or_else(|| AppError::unauthorized("User not authenticated")),
        )
    }
}

/// Resolves the session token into an [`AuthenticatedUser`].
///
/// The bearer header is tried first, then the `user` cookie. A token that
/// fails verification leaves the request anonymous; protected handlers
/// answer 401 through the [`AuthenticatedUser`] extractor.
pub struct Authentication {
    secret: Rc<String>,
}

impl Authentication {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: Rc::new(secret.into()),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for Authentication
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Transform = AuthMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(AuthMiddleware {
            service,
            secret: self.secret.clone(),
        })
    }
}

pub struct AuthMiddleware<S> {
    service: S,
    secret: Rc<String>,
}

fn bearer_token(req: &ServiceRequest) -> Option<String> {
    let value = req.headers().get(http::header::AUTHORIZATION)?.to_str().ok()?;
    value
        .strip_prefix("Bearer ")
        .map(|token| token.trim().to_string())
}

impl<S, B> Service<ServiceRequest> for AuthMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let bearer = bearer_token(&req);
        let cookie = req.cookie(SESSION_COOKIE).map(|c| c.value().to_string());
        for token in bearer.into_iter().chain(cookie) {
            match verify_jwt(&token, &self.secret) {
                Ok(user_id) => {
                    req.extensions_mut().insert(AuthenticatedUser(user_id));
                    break;
                }
                Err(e) => debug!("Ignoring session token: {}", e),
            }
        }

        let fut = self.service.call(req);
        Box::pin(async move {
            let res = fut.await?;
            Ok(res.map_into_boxed_body())
        })
    }
}

// VALIDATION

pub fn validate_username(username: &str) -> AppResult<()> {
    static USERNAME_REGEX: OnceLock<Regex> = OnceLock::new();
    if username.is_empty() {
        return Err(AppError::validation("Username is required"));
    }
    if username.chars().count() > 32 {
        return Err(AppError::validation("Username must be at most 32 characters long"));
    }
    let regex = USERNAME_REGEX
        .get_or_init(|| Regex::new(r"^[\w.\- ]+$").expect("username regex is valid"));
    if !regex.is_match(username) {
        return Err(AppError::validation(
            "Username can only contain letters, numbers, spaces, dots, dashes and underscores",
        ));
    }
    Ok(())
}

pub fn validate_email(email: &str) -> AppResult<()> {
    static EMAIL_REGEX: OnceLock<Regex> = OnceLock::new();
    if email.is_empty() {
        return Err(AppError::validation("Email is required"));
    }
    let regex = EMAIL_REGEX.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
            .expect("email regex is valid")
    });
    if !regex.is_match(email) {
        return Err(AppError::validation("Invalid email format"));
    }
    Ok(())
}

pub fn validate_password(password: &str) -> AppResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters long"
        )));
    }
    Ok(())
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Hashes off the async workers; bcrypt is deliberately slow.
pub async fn hash_password(password: String) -> AppResult<String> {
    web::block(move || hash(password, DEFAULT_COST))
        .await
        .map_err(|e| AppError::Infrastructure(e.to_string()))?
        .map_err(|e| AppError::Infrastructure(format!("Password hashing failed: {e}")))
}

async fn password_matches(password: String, password_hash: String) -> AppResult<bool> {
    web::block(move || verify(password, &password_hash))
        .await
        .map_err(|e| AppError::Infrastructure(e.to_string()))?
        .map_err(|e| AppError::Infrastructure(format!("Password check failed: {e}")))
}

// HANDLERS

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

fn signed_in(
    data: &AppState,
    status: http::StatusCode,
    message: &str,
    user: &User,
) -> AppResult<HttpResponse> {
    let token = create_jwt(&user.id, &data.config.jwt_secret, data.config.token_ttl_hours, Utc::now())?;
    Ok(HttpResponse::build(status)
        .cookie(session_cookie(token.clone(), data.config.token_ttl_hours))
        .json(json!({
            "success": true,
            "message": message,
            "token": token,
            "user": UserView::from(user),
        })))
}

// POST /api/users/register
pub async fn register(
    data: web::Data<AppState>,
    body: web::Json<RegisterRequest>,
) -> Result<HttpResponse, AppError> {
    let RegisterRequest {
        username,
        email,
        password,
    } = body.into_inner();
    let username = username.trim().to_string();
    let email = normalize_email(&email);
    validate_username(&username)?;
    validate_email(&email)?;
    validate_password(&password)?;

    if data.store.find_user_by_email(&email).await?.is_some()
        || data.store.find_user_by_username(&username).await?.is_some()
    {
        return Err(AppError::conflict("User already exists"));
    }

    let now = Utc::now();
    let user = User {
        id: new_id(),
        username,
        email,
        password_hash: hash_password(password).await?,
        age: None,
        gender: None,
        role: None,
        role_description: None,
        location: None,
        profile_picture: DEFAULT_PROFILE_PICTURE.to_string(),
        experience: 0,
        created_at: now,
        updated_at: now,
    };
    data.store.insert_user(&user).await?;
    info!("User {} registered", user.id);
    signed_in(&data, http::StatusCode::CREATED, "User registered successfully", &user)
}

// POST /api/users/signin
pub async fn signin(
    data: web::Data<AppState>,
    body: web::Json<SignInRequest>,
) -> Result<HttpResponse, AppError> {
    let SignInRequest { email, password } = body.into_inner();
    let email = normalize_email(&email);
    let invalid = || AppError::unauthorized("Invalid email or password");

    let user = data.store.find_user_by_email(&email).await?.ok_or_else(invalid)?;
    if !password_matches(password, user.password_hash.clone()).await? {
        warn!("Failed sign-in for user {}", user.id);
        return Err(invalid());
    }
    debug!("User {} signed in", user.id);
    signed_in(&data, http::StatusCode::OK, "Signed in successfully", &user)
}

// GET /api/users/signout
pub async fn signout() -> HttpResponse {
    let mut cookie = Cookie::build(SESSION_COOKIE, "").path("/").finish();
    cookie.make_removal();
    HttpResponse::Ok()
        .cookie(cookie)
        .json(json!({ "success": true, "message": "Signed out successfully" }))
}

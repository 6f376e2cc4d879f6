use actix_web::{web, HttpResponse};
use chrono::Utc;
use log::info;
use serde::Deserialize;
use serde_json::json;

use crate::app_state::AppState;
use crate::auth::{
    hash_password, normalize_email, validate_email, validate_password, validate_username,
    AuthenticatedUser,
};
use crate::error::AppError;
use crate::models::user::Gender;
use crate::models::{non_blank, User, UserUpdate, UserView};

pub const MAX_AGE: i64 = 120;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub age: Option<i64>,
    pub gender: Option<Gender>,
    pub role: Option<String>,
    pub role_description: Option<String>,
    pub location: Option<String>,
    pub experience: Option<i64>,
}

impl UpdateProfileRequest {
    /// Validates field formats and converts to a store update.
    fn into_update(self) -> Result<UserUpdate, AppError> {
        let username = non_blank(self.username.as_deref());
        if let Some(username) = &username {
            validate_username(username)?;
        }
        let email = self.email.as_deref().map(normalize_email).filter(|e| !e.is_empty());
        if let Some(email) = &email {
            validate_email(email)?;
        }
        let age = self
            .age
            .map(|age| {
                u8::try_from(age)
                    .ok()
                    .filter(|age| i64::from(*age) <= MAX_AGE)
                    .ok_or_else(|| AppError::validation(format!("Age must be between 0 and {MAX_AGE}")))
            })
            .transpose()?;
        let experience = self
            .experience
            .map(|years| {
                u32::try_from(years)
                    .map_err(|_| AppError::validation("Experience must not be negative"))
            })
            .transpose()?;

        Ok(UserUpdate {
            username,
            email,
            age,
            gender: self.gender,
            role: non_blank(self.role.as_deref()),
            role_description: non_blank(self.role_description.as_deref()),
            location: non_blank(self.location.as_deref()),
            experience,
            ..Default::default()
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub email: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvatarRequest {
    pub profile_picture: String,
}

async fn load_user(data: &AppState, user_id: &str) -> Result<User, AppError> {
    data.store
        .find_user(user_id)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))
}

async fn apply_update(data: &AppState, user_id: &str, update: &UserUpdate) -> Result<User, AppError> {
    data.store
        .update_user(user_id, update, Utc::now())
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))
}

// GET /api/users/profile
pub async fn profile(
    data: web::Data<AppState>,
    user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    let user = load_user(&data, user.id()).await?;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "user": UserView::from(&user) })))
}

// PATCH /api/users/update
pub async fn update_profile(
    data: web::Data<AppState>,
    user: AuthenticatedUser,
    body: web::Json<UpdateProfileRequest>,
) -> Result<HttpResponse, AppError> {
    let update = body.into_inner().into_update()?;
    if update.is_empty() {
        return Err(AppError::validation("No update data provided"));
    }
    let current = load_user(&data, user.id()).await?;

    if let Some(username) = &update.username {
        if let Some(other) = data.store.find_user_by_username(username).await? {
            if other.id != current.id {
                return Err(AppError::conflict("Username already taken"));
            }
        }
    }
    if let Some(email) = &update.email {
        if let Some(other) = data.store.find_user_by_email(email).await? {
            if other.id != current.id {
                return Err(AppError::conflict("Email already taken"));
            }
        }
    }

    let updated = apply_update(&data, user.id(), &update).await?;
    info!("User {} updated their profile", updated.id);
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "Profile updated successfully",
        "user": UserView::from(&updated),
    })))
}

// PATCH /api/users/forgetpassword
pub async fn forget_password(
    data: web::Data<AppState>,
    user: AuthenticatedUser,
    body: web::Json<ResetPasswordRequest>,
) -> Result<HttpResponse, AppError> {
    let ResetPasswordRequest {
        email,
        new_password,
    } = body.into_inner();
    let current = load_user(&data, user.id()).await?;
    if normalize_email(&email) != current.email {
        return Err(AppError::forbidden("You can only reset your own password"));
    }
    validate_password(&new_password)?;

    let update = UserUpdate {
        password_hash: Some(hash_password(new_password).await?),
        ..Default::default()
    };
    apply_update(&data, &current.id, &update).await?;
    info!("User {} reset their password", current.id);
    Ok(HttpResponse::Ok().json(json!({ "success": true, "message": "Password updated successfully" })))
}

fn is_picture_reference(value: &str) -> bool {
    value.starts_with("https://") || value.starts_with("http://") || value.starts_with('/')
}

// POST /api/users/upload-avatar
pub async fn upload_avatar(
    data: web::Data<AppState>,
    user: AuthenticatedUser,
    body: web::Json<AvatarRequest>,
) -> Result<HttpResponse, AppError> {
    let picture = body.into_inner().profile_picture.trim().to_string();
    if picture.is_empty() {
        return Err(AppError::validation("No file uploaded"));
    }
    if !is_picture_reference(&picture) {
        return Err(AppError::validation("profilePicture must be a URL or an absolute path"));
    }

    let update = UserUpdate {
        profile_picture: Some(picture),
        ..Default::default()
    };
    let updated = apply_update(&data, user.id(), &update).await?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "Profile picture updated",
        "user": UserView::from(&updated),
    })))
}

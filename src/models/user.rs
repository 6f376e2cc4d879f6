use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PROFILE_PICTURE: &str =
    "https://cdn.vectorstock.com/i/1000v/92/16/default-profile-picture-avatar-user-icon-vector-46389216.jpg";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    Male,
    Female,
    Other,
}

/// Stored account document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id")]
    pub id: String,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub age: Option<u8>,
    pub gender: Option<Gender>,
    pub role: Option<String>,
    pub role_description: Option<String>,
    pub location: Option<String>,
    pub profile_picture: String,
    #[serde(default)]
    pub experience: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Public projection of a user; never includes the password hash.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: String,
    pub username: String,
    pub email: String,
    pub age: Option<u8>,
    pub gender: Option<Gender>,
    pub role: Option<String>,
    pub role_description: Option<String>,
    pub location: Option<String>,
    pub profile_picture: String,
    pub experience: u32,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserView {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            username: user.username.clone(),
            email: user.email.clone(),
            age: user.age,
            gender: user.gender,
            role: user.role.clone(),
            role_description: user.role_description.clone(),
            location: user.location.clone(),
            profile_picture: user.profile_picture.clone(),
            experience: user.experience,
            created_at: user.created_at,
        }
    }
}

/// Applicant details shown to a team creator reviewing join requests.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicantProfile {
    pub id: String,
    pub username: String,
    pub email: String,
    pub profile_picture: String,
    pub role: Option<String>,
    pub experience: u32,
    pub location: Option<String>,
    pub age: Option<u8>,
    pub gender: Option<Gender>,
}

impl From<&User> for ApplicantProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            username: user.username.clone(),
            email: user.email.clone(),
            profile_picture: user.profile_picture.clone(),
            role: user.role.clone(),
            experience: user.experience,
            location: user.location.clone(),
            age: user.age,
            gender: user.gender,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SenderProfile {
    pub id: String,
    pub username: String,
    pub email: String,
    pub profile_picture: String,
}

impl From<&User> for SenderProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            username: user.username.clone(),
            email: user.email.clone(),
            profile_picture: user.profile_picture.clone(),
        }
    }
}

/// Partial update applied to a stored user. `None` leaves the field as is.
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub username: Option<String>,
    pub email: Option<String>,
    pub age: Option<u8>,
    pub gender: Option<Gender>,
    pub role: Option<String>,
    pub role_description: Option<String>,
    pub location: Option<String>,
    pub experience: Option<u32>,
    pub profile_picture: Option<String>,
    pub password_hash: Option<String>,
}

impl UserUpdate {
    pub fn is_empty(&self) -> bool {
        self.username.is_none()
            && self.email.is_none()
            && self.age.is_none()
            && self.gender.is_none()
            && self.role.is_none()
            && self.role_description.is_none()
            && self.location.is_none()
            && self.experience.is_none()
            && self.profile_picture.is_none()
            && self.password_hash.is_none()
    }

    #[cfg(test)]
    pub fn apply(&self, user: &mut User, now: DateTime<Utc>) {
        if let Some(username) = &self.username {
            user.username = username.clone();
        }
        if let Some(email) = &self.email {
            user.email = email.clone();
        }
        if let Some(age) = self.age {
            user.age = Some(age);
        }
        if let Some(gender) = self.gender {
            user.gender = Some(gender);
        }
        if let Some(role) = &self.role {
            user.role = Some(role.clone());
        }
        if let Some(desc) = &self.role_description {
            user.role_description = Some(desc.clone());
        }
        if let Some(location) = &self.location {
            user.location = Some(location.clone());
        }
        if let Some(experience) = self.experience {
            user.experience = experience;
        }
        if let Some(picture) = &self.profile_picture {
            user.profile_picture = picture.clone();
        }
        if let Some(hash) = &self.password_hash {
            user.password_hash = hash.clone();
        }
        user.updated_at = now;
    }
}

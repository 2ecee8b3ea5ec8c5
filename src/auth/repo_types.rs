use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::validation::Gender;

/// User record in the database.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub username: String,
    pub gender: i16,
    pub password_hash: String,
    pub profile_pic: String,
    pub email_verified: bool,
    pub fcm_token: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Fields needed to insert a user; the store assigns id and timestamps.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub name: String,
    pub username: String,
    pub gender: Gender,
    pub password_hash: String,
    pub profile_pic: String,
    pub email_verified: bool,
}

/// Partial profile update; `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct ProfileChanges {
    pub name: Option<String>,
    pub username: Option<String>,
    pub gender: Option<Gender>,
    pub profile_pic: Option<String>,
}

impl ProfileChanges {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.username.is_none()
            && self.gender.is_none()
            && self.profile_pic.is_none()
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct OneTimePassword {
    pub email: String,
    pub code: i32,
    pub expires_at: OffsetDateTime,
    pub verified: bool,
}

/// Public part of the user returned to the client.
#[derive(Debug, Clone, Serialize)]
pub struct PublicUser {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub username: String,
    pub gender: i16,
    pub profile_pic: String,
    pub is_email_verified: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<User> for PublicUser {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            email: u.email,
            name: u.name,
            username: u.username,
            gender: u.gender,
            profile_pic: u.profile_pic,
            is_email_verified: u.email_verified,
            created_at: u.created_at,
            updated_at: u.updated_at,
        }
    }
}

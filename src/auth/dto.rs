use serde::{Deserialize, Serialize};

use crate::auth::{repo_types::PublicUser, validation::OtpInput};

/// Body of sendOTP, resendOTP and forgot_password.
#[derive(Debug, Deserialize)]
pub struct EmailRequest {
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyOtpRequest {
    #[serde(default)]
    pub email: String,
    pub otp: Option<OtpInput>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    #[serde(default)]
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    #[serde(default)]
    pub email: String,
    pub otp: Option<OtpInput>,
    #[serde(default, alias = "newPassword")]
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    #[serde(default, alias = "oldPassword")]
    pub old_password: String,
    #[serde(default, alias = "newPassword")]
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct SaveFcmTokenRequest {
    #[serde(default, alias = "fcmToken")]
    pub fcm_token: String,
}

/// Parsed registration form.
#[derive(Debug)]
pub struct RegisterInput {
    pub name: String,
    pub email: String,
    pub username: String,
    pub password: String,
    pub gender: String,
}

/// Parsed profile-update form; absent fields are left unchanged.
#[derive(Debug, Default)]
pub struct ProfileUpdateInput {
    pub name: Option<String>,
    pub username: Option<String>,
    pub gender: Option<String>,
}

/// Returned after login and token refresh. The access token goes out as
/// `token`, the name existing mobile clients read.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    #[serde(rename = "token")]
    pub access_token: String,
    pub refresh_token: String,
    pub user: PublicUser,
}

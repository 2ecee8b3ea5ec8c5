use axum::extract::FromRef;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    auth::{
        dto::{
            AuthResponse, ChangePasswordRequest, LoginRequest, ProfileUpdateInput, RegisterInput,
            ResetPasswordRequest,
        },
        jwt::JwtKeys,
        otp::OtpManager,
        password::{hash_password_blocking, verify_password_blocking},
        repo::EmailTaken,
        repo_types::{NewUser, ProfileChanges, PublicUser, User},
        validation::{
            parse_otp_code, require_email, require_strong_password, Gender, OtpInput,
        },
    },
    error::{AppError, AppResult},
    media::services::{ensure_image, upload_object, StoredObject, UploadItem},
    notifications::{is_plausible_device_token, BROADCAST_TOPIC},
    state::AppState,
};

fn issue_tokens(state: &AppState, user: User) -> AppResult<AuthResponse> {
    let keys = JwtKeys::from_ref(state);
    let access_token = keys.sign_access(user.id, &user.email)?;
    let refresh_token = keys.sign_refresh(user.id, &user.email)?;
    Ok(AuthResponse {
        access_token,
        refresh_token,
        user: user.into(),
    })
}

fn require_otp(otp: Option<&OtpInput>) -> AppResult<u32> {
    let otp = otp.ok_or_else(|| AppError::validation("6 digit OTP is required"))?;
    parse_otp_code(otp)
}

async fn upload_profile_pic(state: &AppState, pic: UploadItem) -> AppResult<StoredObject> {
    upload_object(state.storage.as_ref(), "profiles", pic)
        .await
        .map_err(|e| {
            error!(error = %e, "profile picture upload failed");
            AppError::upstream("Failed to upload profile image")
        })
}

/// Best effort; an orphaned object is only logged.
async fn discard_object(state: &AppState, obj: &StoredObject) {
    if let Err(e) = state.storage.delete_object(&obj.key).await {
        warn!(error = %e, key = %obj.key, "failed to remove orphaned upload");
    }
}

pub async fn send_otp(state: &AppState, raw_email: &str) -> AppResult<()> {
    let email = require_email(raw_email)?;
    OtpManager::from_ref(state).issue(&email).await
}

pub async fn resend_otp(state: &AppState, raw_email: &str) -> AppResult<()> {
    let email = require_email(raw_email)?;
    OtpManager::from_ref(state).resend(&email).await
}

pub async fn verify_otp(state: &AppState, raw_email: &str, otp: Option<&OtpInput>) -> AppResult<()> {
    let email = require_email(raw_email)?;
    let code = require_otp(otp)?;
    OtpManager::from_ref(state).verify(&email, code).await
}

pub async fn register(
    state: &AppState,
    input: RegisterInput,
    profile_pic: Option<UploadItem>,
) -> AppResult<PublicUser> {
    let RegisterInput {
        name,
        email,
        username,
        password,
        gender,
    } = input;
    if [&name, &email, &username, &password, &gender]
        .iter()
        .any(|v| v.trim().is_empty())
    {
        return Err(AppError::validation("Fill all input fields"));
    }

    let email = require_email(&email)?;
    require_strong_password(&password)?;
    let gender: Gender = gender.parse()?;
    let pic = profile_pic.ok_or_else(|| AppError::validation("Upload profile Picture"))?;
    ensure_image(&pic)?;

    if state.store.find_user_by_email(&email).await?.is_some() {
        warn!(%email, "register existing email");
        return Err(AppError::validation("User already exists"));
    }

    let otp = OtpManager::from_ref(state);
    otp.require_verified(&email).await?;

    let stored = upload_profile_pic(state, pic).await?;
    let password_hash = hash_password_blocking(password).await?;

    let created = state
        .store
        .create_user(NewUser {
            email: email.clone(),
            name: name.trim().to_string(),
            username: username.trim().to_string(),
            gender,
            password_hash,
            profile_pic: stored.url.clone(),
            email_verified: true,
        })
        .await;
    let user = match created {
        Ok(u) => u,
        Err(e) => {
            discard_object(state, &stored).await;
            if e.downcast_ref::<EmailTaken>().is_some() {
                warn!(%email, "register lost race for email");
                return Err(AppError::validation("User already exists"));
            }
            return Err(e.into());
        }
    };

    otp.consume(&email).await?;
    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok(user.into())
}

pub async fn login(state: &AppState, req: LoginRequest) -> AppResult<AuthResponse> {
    if req.email.trim().is_empty() || req.password.is_empty() {
        return Err(AppError::validation("Email and password are required"));
    }
    let email = require_email(&req.email)?;

    let user = state
        .store
        .find_user_by_email(&email)
        .await?
        .ok_or_else(|| {
            warn!(%email, "login unknown email");
            AppError::not_found("User not found, please register")
        })?;

    if !verify_password_blocking(req.password, user.password_hash.clone()).await? {
        warn!(%email, user_id = %user.id, "login invalid password");
        return Err(AppError::unauthorized("Invalid user credential"));
    }

    info!(user_id = %user.id, %email, "user logged in");
    issue_tokens(state, user)
}

pub async fn user_details(state: &AppState, user_id: Uuid) -> AppResult<PublicUser> {
    let user = state
        .store
        .find_user_by_id(user_id)
        .await?
        .ok_or_else(|| AppError::unauthorized("User not found"))?;
    Ok(user.into())
}

pub async fn update_profile(
    state: &AppState,
    user_id: Uuid,
    input: ProfileUpdateInput,
    profile_pic: Option<UploadItem>,
) -> AppResult<PublicUser> {
    let mut changes = ProfileChanges {
        name: input.name,
        username: input.username,
        gender: input.gender.as_deref().map(str::parse::<Gender>).transpose()?,
        profile_pic: None,
    };
    if changes.is_empty() && profile_pic.is_none() {
        return Err(AppError::validation("Nothing to update"));
    }

    if let Some(pic) = &profile_pic {
        ensure_image(pic)?;
    }
    let stored = match profile_pic {
        Some(pic) => Some(upload_profile_pic(state, pic).await?),
        None => None,
    };
    changes.profile_pic = stored.as_ref().map(|s| s.url.clone());

    let updated = match state.store.update_profile(user_id, changes).await {
        Ok(Some(u)) => u,
        Ok(None) => {
            if let Some(obj) = &stored {
                discard_object(state, obj).await;
            }
            return Err(AppError::not_found("User not found"));
        }
        Err(e) => {
            if let Some(obj) = &stored {
                discard_object(state, obj).await;
            }
            return Err(e.into());
        }
    };

    info!(%user_id, "profile updated");
    Ok(updated.into())
}

pub async fn refresh(state: &AppState, refresh_token: &str) -> AppResult<AuthResponse> {
    if refresh_token.trim().is_empty() {
        return Err(AppError::validation("Refresh token is required"));
    }
    let keys = JwtKeys::from_ref(state);
    let claims = keys.verify_refresh(refresh_token.trim()).map_err(|e| {
        warn!(error = %e, "refresh rejected");
        AppError::unauthorized("Invalid or expired refresh token")
    })?;

    let user = state
        .store
        .find_user_by_id(claims.sub)
        .await?
        .ok_or_else(|| AppError::unauthorized("User not found"))?;
    issue_tokens(state, user)
}

pub async fn forgot_password(state: &AppState, raw_email: &str) -> AppResult<()> {
    let email = require_email(raw_email)?;
    OtpManager::from_ref(state).issue_reset(&email).await
}

pub async fn reset_password(state: &AppState, req: ResetPasswordRequest) -> AppResult<()> {
    let email = require_email(&req.email)?;
    let code = require_otp(req.otp.as_ref())?;
    require_strong_password(&req.new_password)?;

    let otp = OtpManager::from_ref(state);
    otp.require_code(&email, code).await?;

    let user = state
        .store
        .find_user_by_email(&email)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;

    let hash = hash_password_blocking(req.new_password).await?;
    state.store.update_password(user.id, &hash).await?;
    otp.consume(&email).await?;

    info!(user_id = %user.id, %email, "password reset");
    Ok(())
}

pub async fn change_password(
    state: &AppState,
    user_id: Uuid,
    req: ChangePasswordRequest,
) -> AppResult<()> {
    if req.old_password.is_empty() || req.new_password.is_empty() {
        return Err(AppError::validation("Old and new password are required"));
    }

    let user = state
        .store
        .find_user_by_id(user_id)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;

    if !verify_password_blocking(req.old_password.clone(), user.password_hash.clone()).await? {
        warn!(%user_id, "change password with wrong old password");
        return Err(AppError::unauthorized("Old password is incorrect"));
    }
    require_strong_password(&req.new_password)?;
    if req.new_password == req.old_password {
        return Err(AppError::validation(
            "New password must be different from the old password",
        ));
    }

    let hash = hash_password_blocking(req.new_password).await?;
    state.store.update_password(user.id, &hash).await?;
    info!(%user_id, "password changed");
    Ok(())
}

pub async fn save_fcm_token(state: &AppState, user_id: Uuid, token: &str) -> AppResult<()> {
    let token = token.trim();
    if !is_plausible_device_token(token) {
        return Err(AppError::validation("A valid FCM token is required"));
    }

    state
        .notifier
        .subscribe_to_topic(token, BROADCAST_TOPIC)
        .await
        .map_err(|e| {
            error!(error = %e, %user_id, "topic subscription failed");
            AppError::upstream("Failed to subscribe device to notifications")
        })?;

    if !state.store.set_fcm_token(user_id, token).await? {
        return Err(AppError::not_found("User not found"));
    }
    info!(%user_id, "fcm token saved");
    Ok(())
}

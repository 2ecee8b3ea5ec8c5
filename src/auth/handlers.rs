use axum::{
    extract::{DefaultBodyLimit, State},
    routing::{get, patch, post},
    Router,
};
use tracing::instrument;

use crate::{
    auth::{
        dto::{
            AuthResponse, ChangePasswordRequest, EmailRequest, LoginRequest, ProfileUpdateInput,
            RefreshRequest, RegisterInput, ResetPasswordRequest, SaveFcmTokenRequest,
            VerifyOtpRequest,
        },
        extractors::AuthUser,
        repo_types::PublicUser,
        services,
    },
    error::AppResult,
    extract::ApiJson,
    media::{form::ImageForm, services::MAX_IMAGE_BYTES},
    response::ApiResponse,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    let forms = Router::new()
        .route("/auth/register", post(register))
        .route("/auth/user/update_profile", patch(update_profile))
        .layer(DefaultBodyLimit::max(MAX_IMAGE_BYTES + 1024 * 1024));

    Router::new()
        .route("/auth/sendOTP", post(send_otp))
        .route("/auth/resendOTP", post(resend_otp))
        .route("/auth/verifyOTP", post(verify_otp))
        .route("/auth/login", post(login))
        .route("/auth/user/details", get(user_details))
        .route("/auth/refresh_token", post(refresh))
        .route("/auth/forgot_password", post(forgot_password))
        .route("/auth/reset_password", post(reset_password))
        .route("/auth/change_password", post(change_password))
        .route("/auth/save_FCM_Token", post(save_fcm_token))
        .merge(forms)
}

#[instrument(skip(state, payload))]
pub async fn send_otp(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<EmailRequest>,
) -> AppResult<ApiResponse<()>> {
    services::send_otp(&state, &payload.email).await?;
    Ok(ApiResponse::message("OTP sent successfully"))
}

#[instrument(skip(state, payload))]
pub async fn resend_otp(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<EmailRequest>,
) -> AppResult<ApiResponse<()>> {
    services::resend_otp(&state, &payload.email).await?;
    Ok(ApiResponse::message("OTP resent successfully"))
}

#[instrument(skip(state, payload))]
pub async fn verify_otp(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<VerifyOtpRequest>,
) -> AppResult<ApiResponse<()>> {
    services::verify_otp(&state, &payload.email, payload.otp.as_ref()).await?;
    Ok(ApiResponse::message("OTP verified successfully"))
}

/// POST /auth/register (multipart: name, email, username, password, gender, profile_pic)
#[instrument(skip(state, form))]
pub async fn register(
    State(state): State<AppState>,
    ImageForm(mut form): ImageForm,
) -> AppResult<ApiResponse<PublicUser>> {
    let field = |name: &str| form.text(name).unwrap_or_default().to_string();
    let input = RegisterInput {
        name: field("name"),
        email: field("email"),
        username: field("username"),
        password: field("password"),
        gender: field("gender"),
    };
    let pic = form.take_file("profile_pic");

    let user = services::register(&state, input, pic).await?;
    Ok(ApiResponse::with_data(
        "User verified and registered successfully",
        user,
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<LoginRequest>,
) -> AppResult<ApiResponse<AuthResponse>> {
    let res = services::login(&state, payload).await?;
    Ok(ApiResponse::with_data("login success", res))
}

#[instrument(skip(state), fields(user_id = %user.id))]
pub async fn user_details(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<ApiResponse<PublicUser>> {
    let details = services::user_details(&state, user.id).await?;
    Ok(ApiResponse::with_data(
        "User details fetched successfully",
        details,
    ))
}

/// PATCH /auth/user/update_profile (multipart, every field optional)
#[instrument(skip(state, form), fields(user_id = %user.id))]
pub async fn update_profile(
    State(state): State<AppState>,
    user: AuthUser,
    ImageForm(mut form): ImageForm,
) -> AppResult<ApiResponse<PublicUser>> {
    let field = |name: &str| form.text(name).map(str::to_string);
    let input = ProfileUpdateInput {
        name: field("name"),
        username: field("username"),
        gender: field("gender"),
    };
    let pic = form.take_file("profile_pic");

    let updated = services::update_profile(&state, user.id, input, pic).await?;
    Ok(ApiResponse::with_data("Profile updated successfully", updated))
}

#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<RefreshRequest>,
) -> AppResult<ApiResponse<AuthResponse>> {
    let res = services::refresh(&state, &payload.refresh_token).await?;
    Ok(ApiResponse::with_data("Token refreshed successfully", res))
}

#[instrument(skip(state, payload))]
pub async fn forgot_password(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<EmailRequest>,
) -> AppResult<ApiResponse<()>> {
    services::forgot_password(&state, &payload.email).await?;
    Ok(ApiResponse::message("Password reset OTP sent successfully"))
}

#[instrument(skip(state, payload))]
pub async fn reset_password(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<ResetPasswordRequest>,
) -> AppResult<ApiResponse<()>> {
    services::reset_password(&state, payload).await?;
    Ok(ApiResponse::message("Password reset successfully"))
}

#[instrument(skip(state, payload), fields(user_id = %user.id))]
pub async fn change_password(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(payload): ApiJson<ChangePasswordRequest>,
) -> AppResult<ApiResponse<()>> {
    services::change_password(&state, user.id, payload).await?;
    Ok(ApiResponse::message("Password changed successfully"))
}

#[instrument(skip(state, payload), fields(user_id = %user.id))]
pub async fn save_fcm_token(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(payload): ApiJson<SaveFcmTokenRequest>,
) -> AppResult<ApiResponse<()>> {
    services::save_fcm_token(&state, user.id, &payload.fcm_token).await?;
    Ok(ApiResponse::message("FCM token saved successfully"))
}

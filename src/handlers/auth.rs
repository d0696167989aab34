use axum::{extract::State, Extension, Json};
use chrono::Utc;
use serde::Deserialize;
use validator::Validate;

use crate::auth::middleware::AuthUser;
use crate::auth::verification::{ChallengeIssued, SignedIn};
use crate::error::{AppError, AppResult};
use crate::models::user::UserProfile;
use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct EmailRequest {
    #[validate(
        email(message = "Invalid email format"),
        length(max = 254, message = "Email too long")
    )]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct VerifyCodeRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(equal = 6, message = "Code must be 6 digits"))]
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct ConsumeMagicLinkRequest {
    pub token: String,
}

pub async fn request_code(
    State(state): State<AppState>,
    Json(body): Json<EmailRequest>,
) -> AppResult<Json<ChallengeIssued>> {
    body.validate()?;
    let issued = state.verification().request_code(&body.email, Utc::now()).await?;
    Ok(Json(issued))
}

pub async fn verify_code(
    State(state): State<AppState>,
    Json(body): Json<VerifyCodeRequest>,
) -> AppResult<Json<SignedIn>> {
    body.validate()?;
    let signed_in = state
        .verification()
        .verify_code(&body.email, &body.code, Utc::now())
        .await?;
    Ok(Json(signed_in))
}

pub async fn request_magic_link(
    State(state): State<AppState>,
    Json(body): Json<EmailRequest>,
) -> AppResult<Json<ChallengeIssued>> {
    body.validate()?;
    let issued = state
        .verification()
        .request_magic_link(&body.email, Utc::now())
        .await?;
    Ok(Json(issued))
}

pub async fn consume_magic_link(
    State(state): State<AppState>,
    Json(body): Json<ConsumeMagicLinkRequest>,
) -> AppResult<Json<SignedIn>> {
    if body.token.trim().is_empty() {
        return Err(AppError::Validation("Token is required".into()));
    }
    let signed_in = state
        .verification()
        .consume_magic_link(&body.token, Utc::now())
        .await?;
    Ok(Json(signed_in))
}

pub async fn me(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> AppResult<Json<UserProfile>> {
    let user = state
        .accounts
        .find_user(auth_user.id)
        .await?
        .ok_or(AppError::NotFound("User not found".into()))?;

    Ok(Json(user.into()))
}

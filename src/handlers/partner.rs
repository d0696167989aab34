use axum::{extract::State, Extension, Json};
use serde_json::json;
use validator::Validate;

use crate::auth::middleware::AuthUser;
use crate::auth::verification::normalize_email;
use crate::error::{AppError, AppResult};
use crate::handlers::auth::EmailRequest;
use crate::handlers::ws::broadcast;
use crate::models::user::UserProfile;
use crate::AppState;

pub async fn link_partner(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(body): Json<EmailRequest>,
) -> AppResult<Json<UserProfile>> {
    body.validate()?;
    let email = normalize_email(&body.email)?;

    let partner = state
        .accounts
        .find_user_by_email(&email)
        .await?
        .ok_or(AppError::NotFound("No user with that email".into()))?;

    if partner.id == auth_user.id {
        return Err(AppError::Validation("You cannot partner with yourself".into()));
    }

    state.accounts.link_partners(auth_user.id, partner.id).await?;
    tracing::info!(user_id = %auth_user.id, partner_id = %partner.id, "Partners linked");

    broadcast(
        &state,
        &[auth_user.id, partner.id],
        "partner_linked",
        json!({ "user_id": auth_user.id, "partner_id": partner.id }),
    );

    let user = state
        .accounts
        .find_user(auth_user.id)
        .await?
        .ok_or(AppError::NotFound("User not found".into()))?;
    Ok(Json(user.into()))
}

pub async fn unlink_partner(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> AppResult<Json<serde_json::Value>> {
    let former = state.accounts.unlink_partner(auth_user.id).await?;

    if let Some(former) = former {
        tracing::info!(user_id = %auth_user.id, partner_id = %former, "Partners unlinked");
        broadcast(
            &state,
            &[auth_user.id, former],
            "partner_unlinked",
            json!({ "user_id": auth_user.id }),
        );
    }

    Ok(Json(json!({ "unlinked": former.is_some() })))
}

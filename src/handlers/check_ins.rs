use axum::{
    extract::{Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use crate::auth::middleware::AuthUser;
use crate::error::AppResult;
use crate::handlers::ws::{broadcast, notify_couple};
use crate::models::achievement::Achievement;
use crate::models::check_in::{CheckIn, CheckInQuery, CheckInStatus, SubmitCheckInRequest};
use crate::services::engagement::CheckInOutcome;
use crate::AppState;

pub async fn submit_check_in(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(body): Json<SubmitCheckInRequest>,
) -> AppResult<(StatusCode, Json<CheckInOutcome>)> {
    let outcome = state
        .engagement_service()
        .submit_check_in(auth_user.id, body, Utc::now())
        .await?;

    let payload = json!({
        "user_id": auth_user.id,
        "check_in_date": outcome.check_in.check_in_date,
        "streak": outcome.streak.current_streak,
    });
    if outcome.check_in.is_shared {
        notify_couple(&state, auth_user.id, "check_in_created", payload).await;
    } else {
        broadcast(&state, &[auth_user.id], "check_in_created", payload);
    }
    announce_unlocks(&state, auth_user.id, &outcome.newly_unlocked);

    Ok((StatusCode::CREATED, Json(outcome)))
}

pub async fn list_check_ins(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Query(query): Query<CheckInQuery>,
) -> AppResult<Json<Vec<CheckIn>>> {
    let check_ins = state
        .engagement_service()
        .list_check_ins(auth_user.id, &query, Utc::now())
        .await?;
    Ok(Json(check_ins))
}

pub async fn check_in_status(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> AppResult<Json<CheckInStatus>> {
    let status = state
        .engagement_service()
        .check_in_status(auth_user.id, Utc::now())
        .await?;
    Ok(Json(status))
}

pub async fn partner_check_ins(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Query(query): Query<CheckInQuery>,
) -> AppResult<Json<Vec<CheckIn>>> {
    let check_ins = state
        .engagement_service()
        .partner_check_ins(auth_user.id, &query, Utc::now())
        .await?;
    Ok(Json(check_ins))
}

pub(crate) fn announce_unlocks(state: &AppState, user_id: Uuid, unlocked: &[Achievement]) {
    for achievement in unlocked {
        broadcast(
            state,
            &[user_id],
            "achievement_unlocked",
            json!({
                "user_id": user_id,
                "achievement": achievement,
            }),
        );
    }
}

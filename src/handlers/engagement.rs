use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::Utc;
use serde_json::json;

use crate::auth::middleware::AuthUser;
use crate::error::{AppError, AppResult};
use crate::handlers::check_ins::announce_unlocks;
use crate::handlers::ws::notify_couple;
use crate::models::achievement::Achievement;
use crate::models::activity::RecordActivityRequest;
use crate::models::streak::{Streak, StreakType};
use crate::services::couple_score::CoupleScore;
use crate::services::engagement::{ActivityOutcome, EngagementSnapshot, StreakRefresh};
use crate::AppState;

pub async fn record_activity(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(body): Json<RecordActivityRequest>,
) -> AppResult<(StatusCode, Json<ActivityOutcome>)> {
    let outcome = state
        .engagement_service()
        .record_activity(auth_user.id, body.kind, Utc::now())
        .await?;

    notify_couple(
        &state,
        auth_user.id,
        "activity_recorded",
        json!({
            "user_id": auth_user.id,
            "kind": outcome.activity.kind,
            "streak": outcome.streak.current_streak,
        }),
    )
    .await;
    announce_unlocks(&state, auth_user.id, &outcome.newly_unlocked);

    Ok((StatusCode::CREATED, Json(outcome)))
}

pub async fn list_streaks(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> AppResult<Json<Vec<Streak>>> {
    let (streaks, newly_unlocked) = state
        .engagement_service()
        .refresh_streaks(auth_user.id, Utc::now())
        .await?;
    announce_unlocks(&state, auth_user.id, &newly_unlocked);
    Ok(Json(streaks))
}

pub async fn recompute_streak(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(kind): Path<String>,
) -> AppResult<Json<StreakRefresh>> {
    let kind: StreakType = kind
        .parse()
        .map_err(|_| AppError::Validation(format!("Unknown streak type: {}", kind)))?;

    let refreshed = state
        .engagement_service()
        .refresh_streak(auth_user.id, kind, Utc::now())
        .await?;
    announce_unlocks(&state, auth_user.id, &refreshed.newly_unlocked);
    Ok(Json(refreshed))
}

pub async fn list_achievements(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> AppResult<Json<Vec<Achievement>>> {
    let achievements = state.engagement_service().achievements(auth_user.id).await?;
    Ok(Json(achievements))
}

pub async fn couple_score(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> AppResult<Json<CoupleScore>> {
    let score = state.engagement_service().couple_score(auth_user.id).await?;
    Ok(Json(score))
}

pub async fn snapshot(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> AppResult<Json<EngagementSnapshot>> {
    let snapshot = state
        .engagement_service()
        .snapshot(auth_user.id, Utc::now())
        .await?;
    announce_unlocks(&state, auth_user.id, &snapshot.newly_unlocked);
    Ok(Json(snapshot))
}

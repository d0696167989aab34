use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::models::achievement::Achievement;
use crate::models::activity::ActivityEvent;
use crate::models::check_in::{CheckIn, CheckInQuery, CheckInStatus, NewCheckIn, SubmitCheckInRequest};
use crate::models::streak::{Streak, StreakType};
use crate::services::achievements::{AchievementBook, UserStats};
use crate::services::calendar::Calendar;
use crate::services::couple_score::{self, CoupleScore, ScoreInputs};
use crate::services::streak;
use crate::store::EngagementStore;

/// Default history window for list endpoints.
const DEFAULT_WINDOW_DAYS: i64 = 30;

#[derive(Debug, Serialize)]
pub struct CheckInOutcome {
    pub check_in: CheckIn,
    pub streak: Streak,
    pub newly_unlocked: Vec<Achievement>,
}

#[derive(Debug, Serialize)]
pub struct ActivityOutcome {
    pub activity: ActivityEvent,
    pub streak: Streak,
    pub newly_unlocked: Vec<Achievement>,
}

#[derive(Debug, Serialize)]
pub struct StreakRefresh {
    #[serde(flatten)]
    pub streak: Streak,
    pub newly_unlocked: Vec<Achievement>,
}

#[derive(Debug, Serialize)]
pub struct EngagementSnapshot {
    pub status: CheckInStatus,
    pub streaks: Vec<Streak>,
    pub achievements: Vec<Achievement>,
    pub newly_unlocked: Vec<Achievement>,
    pub achievement_points: i32,
    pub couple_score: CoupleScore,
    pub stats: UserStats,
}

/// Check-in → streak → achievements → couple score, over one store.
#[derive(Clone)]
pub struct EngagementService {
    store: Arc<dyn EngagementStore>,
    calendar: Calendar,
}

impl EngagementService {
    pub fn new(store: Arc<dyn EngagementStore>, calendar: Calendar) -> Self {
        Self { store, calendar }
    }

    pub async fn submit_check_in(
        &self,
        user_id: Uuid,
        payload: SubmitCheckInRequest,
        now: DateTime<Utc>,
    ) -> AppResult<CheckInOutcome> {
        payload.validate()?;
        let today = self.calendar.today(now);

        let check_in = match self
            .store
            .insert_check_in(NewCheckIn {
                user_id,
                check_in_date: today,
                payload,
                created_at: now,
            })
            .await
        {
            Ok(check_in) => check_in,
            Err(e @ AppError::DuplicateCheckIn { .. }) => {
                tracing::info!(user_id = %user_id, date = %today, "Duplicate check-in rejected");
                return Err(e);
            }
            Err(e) => return Err(e),
        };
        tracing::info!(user_id = %user_id, date = %today, mood = ?check_in.mood, "Check-in recorded");

        let streak = self.recompute(user_id, StreakType::DailyCheckin, now).await?;
        let newly_unlocked = self.evaluate_achievements(user_id, now).await?;

        Ok(CheckInOutcome {
            check_in,
            streak,
            newly_unlocked,
        })
    }

    pub async fn check_in_status(&self, user_id: Uuid, now: DateTime<Utc>) -> AppResult<CheckInStatus> {
        let today = self.calendar.today(now);
        let check_in = self.store.find_check_in(user_id, today).await?;
        let dates = self.activity_dates(user_id, StreakType::DailyCheckin).await?;
        let computed = streak::compute(&dates, today);

        Ok(CheckInStatus {
            has_checked_in: check_in.is_some(),
            check_in,
            streak: computed.current_streak,
            next_check_in_time: self.calendar.next_day_start(now),
        })
    }

    pub async fn list_check_ins(
        &self,
        user_id: Uuid,
        query: &CheckInQuery,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<CheckIn>> {
        let (start, end) = self.window(query, now)?;
        self.store.list_check_ins(user_id, start, end).await
    }

    /// The partner's check-ins they chose to share. Private entries stay
    /// hidden.
    pub async fn partner_check_ins(
        &self,
        user_id: Uuid,
        query: &CheckInQuery,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<CheckIn>> {
        let partner_id = self
            .store
            .partner_of(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("No partner linked".into()))?;
        let (start, end) = self.window(query, now)?;

        let shared = self
            .store
            .list_check_ins(partner_id, start, end)
            .await?
            .into_iter()
            .filter(|c| c.is_shared)
            .collect();
        Ok(shared)
    }

    /// Recompute and persist one streak.
    pub async fn recompute(&self, user_id: Uuid, kind: StreakType, now: DateTime<Utc>) -> AppResult<Streak> {
        let streak = self.streak_view(user_id, kind, now).await?;
        let saved = self.store.save_streak(&streak).await?;
        tracing::debug!(
            user_id = %user_id,
            kind = kind.as_str(),
            current = saved.current_streak,
            longest = saved.longest_streak,
            "Streak recomputed"
        );
        Ok(saved)
    }

    pub async fn streaks(&self, user_id: Uuid, now: DateTime<Utc>) -> AppResult<Vec<Streak>> {
        let mut streaks = Vec::with_capacity(StreakType::ALL.len());
        for kind in StreakType::ALL {
            streaks.push(self.recompute(user_id, kind, now).await?);
        }
        Ok(streaks)
    }

    /// Recompute one streak, then unlock whatever the fresh numbers earn.
    pub async fn refresh_streak(
        &self,
        user_id: Uuid,
        kind: StreakType,
        now: DateTime<Utc>,
    ) -> AppResult<StreakRefresh> {
        let streak = self.recompute(user_id, kind, now).await?;
        let newly_unlocked = self.evaluate_achievements(user_id, now).await?;
        Ok(StreakRefresh {
            streak,
            newly_unlocked,
        })
    }

    /// Recompute every streak, then unlock whatever the fresh numbers earn.
    pub async fn refresh_streaks(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<(Vec<Streak>, Vec<Achievement>)> {
        let streaks = self.streaks(user_id, now).await?;
        let stats = self.stats_from(user_id, &streaks).await?;
        let newly_unlocked = self.unlock_new(user_id, &stats, now).await?;
        Ok((streaks, newly_unlocked))
    }

    pub async fn record_activity(
        &self,
        user_id: Uuid,
        kind: StreakType,
        now: DateTime<Utc>,
    ) -> AppResult<ActivityOutcome> {
        if kind == StreakType::DailyCheckin {
            return Err(AppError::Validation(
                "Daily check-ins are submitted through the check-in endpoint".into(),
            ));
        }

        let activity = self
            .store
            .insert_activity(ActivityEvent {
                id: Uuid::new_v4(),
                user_id,
                kind,
                activity_date: self.calendar.today(now),
                created_at: now,
            })
            .await?;
        tracing::info!(user_id = %user_id, kind = kind.as_str(), "Activity recorded");

        let streak = self.recompute(user_id, kind, now).await?;
        let newly_unlocked = self.evaluate_achievements(user_id, now).await?;

        Ok(ActivityOutcome {
            activity,
            streak,
            newly_unlocked,
        })
    }

    pub async fn stats(&self, user_id: Uuid, now: DateTime<Utc>) -> AppResult<UserStats> {
        let mut views = Vec::with_capacity(StreakType::ALL.len());
        for kind in StreakType::ALL {
            views.push(self.streak_view(user_id, kind, now).await?);
        }
        self.stats_from(user_id, &views).await
    }

    /// Stats over already recomputed streaks, one per type.
    async fn stats_from(&self, user_id: Uuid, streaks: &[Streak]) -> AppResult<UserStats> {
        let check_ins = self.store.all_check_ins(user_id).await?;
        let mut stats = UserStats {
            total_check_ins: check_ins.len() as i64,
            shared_check_ins: check_ins.iter().filter(|c| c.is_shared).count() as i64,
            gratitude_entries: check_ins.iter().filter(|c| c.gratitude.is_some()).count() as i64,
            activity: self.store.activity_counts(user_id).await?,
            ..Default::default()
        };

        for streak in streaks {
            if streak.kind == StreakType::DailyCheckin {
                stats.current_check_in_streak = streak.current_streak;
                stats.longest_check_in_streak = streak.longest_streak;
            }
            stats.longest_streaks.insert(streak.kind, streak.longest_streak);
        }

        Ok(stats)
    }

    /// Re-scan the catalogue against fresh stats and persist new unlocks.
    pub async fn evaluate_achievements(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<Achievement>> {
        let stats = self.stats(user_id, now).await?;
        self.unlock_new(user_id, &stats, now).await
    }

    async fn unlock_new(
        &self,
        user_id: Uuid,
        stats: &UserStats,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<Achievement>> {
        let unlocked = self.store.unlocked_achievements(user_id).await?;
        let mut book = AchievementBook::with_unlocked(&unlocked);

        let mut newly_unlocked = Vec::new();
        for achievement in book.evaluate(stats, now) {
            // A concurrent evaluation may have won the insert.
            if self.store.record_unlock(user_id, achievement.id, now).await? {
                tracing::info!(
                    user_id = %user_id,
                    achievement = achievement.id,
                    points = achievement.points,
                    "Achievement unlocked"
                );
                newly_unlocked.push(achievement);
            }
        }
        Ok(newly_unlocked)
    }

    pub async fn achievements(&self, user_id: Uuid) -> AppResult<Vec<Achievement>> {
        let unlocked = self.store.unlocked_achievements(user_id).await?;
        Ok(AchievementBook::with_unlocked(&unlocked).into_achievements())
    }

    pub async fn couple_score(&self, user_id: Uuid) -> AppResult<CoupleScore> {
        let mine = self.score_inputs(user_id).await?;
        let partner = match self.store.partner_of(user_id).await? {
            Some(partner_id) => Some(self.score_inputs(partner_id).await?),
            None => None,
        };
        Ok(couple_score::combine(&mine, partner.as_ref()))
    }

    /// Everything a client needs to render the engagement dashboard.
    pub async fn snapshot(&self, user_id: Uuid, now: DateTime<Utc>) -> AppResult<EngagementSnapshot> {
        let streaks = self.streaks(user_id, now).await?;
        let stats = self.stats_from(user_id, &streaks).await?;
        let newly_unlocked = self.unlock_new(user_id, &stats, now).await?;
        let unlocked = self.store.unlocked_achievements(user_id).await?;
        let book = AchievementBook::with_unlocked(&unlocked);

        Ok(EngagementSnapshot {
            status: self.check_in_status(user_id, now).await?,
            streaks,
            achievement_points: book.unlocked_points(),
            achievements: book.into_achievements(),
            newly_unlocked,
            couple_score: self.couple_score(user_id).await?,
            stats,
        })
    }

    async fn score_inputs(&self, user_id: Uuid) -> AppResult<ScoreInputs> {
        Ok(ScoreInputs {
            user_id,
            check_ins: self.store.all_check_ins(user_id).await?.len() as i64,
            activity: self.store.activity_counts(user_id).await?,
        })
    }

    async fn activity_dates(&self, user_id: Uuid, kind: StreakType) -> AppResult<Vec<NaiveDate>> {
        match kind {
            StreakType::DailyCheckin => Ok(self
                .store
                .all_check_ins(user_id)
                .await?
                .into_iter()
                .map(|c| c.check_in_date)
                .collect()),
            _ => self.store.activity_dates(user_id, kind).await,
        }
    }

    /// Stored streak with a fresh computation folded in, not yet persisted.
    async fn streak_view(&self, user_id: Uuid, kind: StreakType, now: DateTime<Utc>) -> AppResult<Streak> {
        let today = self.calendar.today(now);
        let dates = self.activity_dates(user_id, kind).await?;
        let stored = self
            .store
            .find_streak(user_id, kind)
            .await?
            .unwrap_or_else(|| Streak::empty(user_id, kind, now));
        Ok(streak::apply(stored, streak::compute(&dates, today), now))
    }

    fn window(&self, query: &CheckInQuery, now: DateTime<Utc>) -> AppResult<(NaiveDate, NaiveDate)> {
        let end = query.end_date.unwrap_or_else(|| self.calendar.today(now));
        let start = query
            .start_date
            .unwrap_or_else(|| end - Duration::days(DEFAULT_WINDOW_DAYS));
        if start > end {
            return Err(AppError::Validation("start_date must not be after end_date".into()));
        }
        Ok((start, end))
    }
}

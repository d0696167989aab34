//! Persistence seams.
//!
//! Handlers and services only see these traits. `postgres` backs them with
//! sqlx; `memory` keeps everything in process for local runs and tests.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::achievement::UnlockedAchievement;
use crate::models::activity::{ActivityCounts, ActivityEvent};
use crate::models::check_in::{CheckIn, NewCheckIn};
use crate::models::streak::{Streak, StreakType};
use crate::models::user::{AuthChallenge, ChallengePurpose, User};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait EngagementStore: Send + Sync {
    async fn ping(&self) -> AppResult<()>;

    /// Append a check-in. Fails with `DuplicateCheckIn` when the user already
    /// has one for that calendar date; the check and the write are atomic.
    async fn insert_check_in(&self, check_in: NewCheckIn) -> AppResult<CheckIn>;

    async fn find_check_in(&self, user_id: Uuid, date: NaiveDate) -> AppResult<Option<CheckIn>>;

    /// Check-ins within `[start, end]`, newest first.
    async fn list_check_ins(
        &self,
        user_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
    ) -> AppResult<Vec<CheckIn>>;

    /// Every check-in the user ever made, newest first.
    async fn all_check_ins(&self, user_id: Uuid) -> AppResult<Vec<CheckIn>>;

    async fn insert_activity(&self, event: ActivityEvent) -> AppResult<ActivityEvent>;

    async fn activity_dates(&self, user_id: Uuid, kind: StreakType) -> AppResult<Vec<NaiveDate>>;

    async fn activity_counts(&self, user_id: Uuid) -> AppResult<ActivityCounts>;

    async fn find_streak(&self, user_id: Uuid, kind: StreakType) -> AppResult<Option<Streak>>;

    /// Upsert by (user, kind). The stored longest streak never decreases.
    async fn save_streak(&self, streak: &Streak) -> AppResult<Streak>;

    async fn unlocked_achievements(&self, user_id: Uuid) -> AppResult<Vec<UnlockedAchievement>>;

    /// Insert-if-absent. Returns false when the achievement was already
    /// unlocked for this user.
    async fn record_unlock(
        &self,
        user_id: Uuid,
        achievement_id: &str,
        unlocked_at: DateTime<Utc>,
    ) -> AppResult<bool>;

    async fn partner_of(&self, user_id: Uuid) -> AppResult<Option<Uuid>>;
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn find_user(&self, user_id: Uuid) -> AppResult<Option<User>>;

    async fn find_user_by_email(&self, email: &str) -> AppResult<Option<User>>;

    async fn find_or_create_user(&self, email: &str, now: DateTime<Utc>) -> AppResult<User>;

    /// Link two users symmetrically. `Conflict` if either already has a
    /// partner.
    async fn link_partners(&self, a: Uuid, b: Uuid) -> AppResult<()>;

    /// Clear the link on both sides. Returns the former partner, if any.
    async fn unlink_partner(&self, user_id: Uuid) -> AppResult<Option<Uuid>>;

    /// Store a new challenge, superseding any unconsumed one for the same
    /// email and purpose.
    async fn insert_challenge(&self, challenge: AuthChallenge) -> AppResult<()>;

    /// Atomically mark the matching active challenge consumed and return it.
    async fn consume_challenge(
        &self,
        purpose: ChallengePurpose,
        secret_hash: &str,
        email: Option<&str>,
        now: DateTime<Utc>,
    ) -> AppResult<Option<AuthChallenge>>;

    /// Count a wrong guess against the active challenge for `email`. The
    /// challenge is burned on the `max_attempts`-th miss. Returns the guesses
    /// left, or None when no challenge was active.
    async fn record_failed_attempt(
        &self,
        purpose: ChallengePurpose,
        email: &str,
        max_attempts: i32,
        now: DateTime<Utc>,
    ) -> AppResult<Option<i32>>;

    /// Delete expired or consumed challenges. Returns how many were removed.
    async fn purge_challenges(&self, now: DateTime<Utc>) -> AppResult<u64>;
}

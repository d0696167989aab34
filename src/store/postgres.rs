use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{AccountStore, EngagementStore};
use crate::error::{AppError, AppResult};
use crate::models::achievement::UnlockedAchievement;
use crate::models::activity::{ActivityCounts, ActivityEvent};
use crate::models::check_in::{CheckIn, NewCheckIn};
use crate::models::streak::{Streak, StreakType};
use crate::models::user::{AuthChallenge, ChallengePurpose, User};

#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl EngagementStore for PgStore {
    async fn ping(&self) -> AppResult<()> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.db)
            .await?;
        Ok(())
    }

    async fn insert_check_in(&self, check_in: NewCheckIn) -> AppResult<CheckIn> {
        let date = check_in.check_in_date;
        let row = check_in.into_check_in(Uuid::new_v4());

        // The unique key on (user_id, check_in_date) makes this the single
        // arbiter for concurrent submissions.
        let inserted = sqlx::query_as::<_, CheckIn>(
            r#"
            INSERT INTO check_ins
                (id, user_id, check_in_date, mood, energy, note, gratitude, partner_message, is_shared, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (user_id, check_in_date) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(row.id)
        .bind(row.user_id)
        .bind(row.check_in_date)
        .bind(row.mood)
        .bind(row.energy)
        .bind(&row.note)
        .bind(&row.gratitude)
        .bind(&row.partner_message)
        .bind(row.is_shared)
        .bind(row.created_at)
        .fetch_optional(&self.db)
        .await?;

        inserted.ok_or(AppError::DuplicateCheckIn { date })
    }

    async fn find_check_in(&self, user_id: Uuid, date: NaiveDate) -> AppResult<Option<CheckIn>> {
        let row = sqlx::query_as::<_, CheckIn>(
            "SELECT * FROM check_ins WHERE user_id = $1 AND check_in_date = $2",
        )
        .bind(user_id)
        .bind(date)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }

    async fn list_check_ins(
        &self,
        user_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
    ) -> AppResult<Vec<CheckIn>> {
        let rows = sqlx::query_as::<_, CheckIn>(
            r#"
            SELECT * FROM check_ins
            WHERE user_id = $1 AND check_in_date BETWEEN $2 AND $3
            ORDER BY check_in_date DESC
            "#,
        )
        .bind(user_id)
        .bind(start)
        .bind(end)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn all_check_ins(&self, user_id: Uuid) -> AppResult<Vec<CheckIn>> {
        let rows = sqlx::query_as::<_, CheckIn>(
            "SELECT * FROM check_ins WHERE user_id = $1 ORDER BY check_in_date DESC",
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn insert_activity(&self, event: ActivityEvent) -> AppResult<ActivityEvent> {
        let row = sqlx::query_as::<_, ActivityEvent>(
            r#"
            INSERT INTO activity_events (id, user_id, kind, activity_date, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(event.id)
        .bind(event.user_id)
        .bind(event.kind)
        .bind(event.activity_date)
        .bind(event.created_at)
        .fetch_one(&self.db)
        .await?;
        Ok(row)
    }

    async fn activity_dates(&self, user_id: Uuid, kind: StreakType) -> AppResult<Vec<NaiveDate>> {
        let dates = sqlx::query_scalar::<_, NaiveDate>(
            r#"
            SELECT DISTINCT activity_date FROM activity_events
            WHERE user_id = $1 AND kind = $2
            ORDER BY activity_date DESC
            "#,
        )
        .bind(user_id)
        .bind(kind)
        .fetch_all(&self.db)
        .await?;
        Ok(dates)
    }

    async fn activity_counts(&self, user_id: Uuid) -> AppResult<ActivityCounts> {
        let rows = sqlx::query_as::<_, (StreakType, i64)>(
            r#"
            SELECT kind, COUNT(*) FROM activity_events
            WHERE user_id = $1
            GROUP BY kind
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;

        let mut counts = ActivityCounts::default();
        for (kind, count) in rows {
            counts.add(kind, count);
        }
        Ok(counts)
    }

    async fn find_streak(&self, user_id: Uuid, kind: StreakType) -> AppResult<Option<Streak>> {
        let row = sqlx::query_as::<_, Streak>(
            "SELECT * FROM streaks WHERE user_id = $1 AND kind = $2",
        )
        .bind(user_id)
        .bind(kind)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }

    async fn save_streak(&self, streak: &Streak) -> AppResult<Streak> {
        let row = sqlx::query_as::<_, Streak>(
            r#"
            INSERT INTO streaks
                (id, user_id, kind, current_streak, longest_streak, goal, last_activity_date, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (user_id, kind) DO UPDATE SET
                current_streak = EXCLUDED.current_streak,
                longest_streak = GREATEST(streaks.longest_streak, EXCLUDED.longest_streak),
                goal = EXCLUDED.goal,
                last_activity_date = EXCLUDED.last_activity_date,
                updated_at = EXCLUDED.updated_at
            RETURNING *
            "#,
        )
        .bind(streak.id)
        .bind(streak.user_id)
        .bind(streak.kind)
        .bind(streak.current_streak)
        .bind(streak.longest_streak)
        .bind(streak.goal)
        .bind(streak.last_activity_date)
        .bind(streak.updated_at)
        .fetch_one(&self.db)
        .await?;
        Ok(row)
    }

    async fn unlocked_achievements(&self, user_id: Uuid) -> AppResult<Vec<UnlockedAchievement>> {
        let rows = sqlx::query_as::<_, UnlockedAchievement>(
            "SELECT * FROM user_achievements WHERE user_id = $1 ORDER BY unlocked_at ASC",
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn record_unlock(
        &self,
        user_id: Uuid,
        achievement_id: &str,
        unlocked_at: DateTime<Utc>,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO user_achievements (user_id, achievement_id, unlocked_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, achievement_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(achievement_id)
        .bind(unlocked_at)
        .execute(&self.db)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn partner_of(&self, user_id: Uuid) -> AppResult<Option<Uuid>> {
        let partner = sqlx::query_scalar::<_, Option<Uuid>>(
            "SELECT partner_id FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(partner.flatten())
    }
}

#[async_trait]
impl AccountStore for PgStore {
    async fn find_user(&self, user_id: Uuid) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    async fn find_or_create_user(&self, email: &str, now: DateTime<Utc>) -> AppResult<User> {
        let candidate = User::new(email, now);
        // No-op update so RETURNING yields the existing row on conflict.
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, email, name, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $4)
            ON CONFLICT (email) DO UPDATE SET email = users.email
            RETURNING *
            "#,
        )
        .bind(candidate.id)
        .bind(&candidate.email)
        .bind(&candidate.name)
        .bind(now)
        .fetch_one(&self.db)
        .await?;
        Ok(user)
    }

    async fn link_partners(&self, a: Uuid, b: Uuid) -> AppResult<()> {
        let mut tx = self.db.begin().await?;

        for (id, partner) in [(a, b), (b, a)] {
            let result = sqlx::query(
                r#"
                UPDATE users SET partner_id = $2, updated_at = NOW()
                WHERE id = $1 AND partner_id IS NULL
                "#,
            )
            .bind(id)
            .bind(partner)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() != 1 {
                tx.rollback().await?;
                return Err(AppError::Conflict("Already linked to a partner".into()));
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn unlink_partner(&self, user_id: Uuid) -> AppResult<Option<Uuid>> {
        let mut tx = self.db.begin().await?;

        let partner = sqlx::query_scalar::<_, Option<Uuid>>(
            "SELECT partner_id FROM users WHERE id = $1 FOR UPDATE",
        )
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?
        .flatten();

        if let Some(partner) = partner {
            sqlx::query(
                "UPDATE users SET partner_id = NULL, updated_at = NOW() WHERE id = ANY($1)",
            )
            .bind(vec![user_id, partner])
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(partner)
    }

    async fn insert_challenge(&self, challenge: AuthChallenge) -> AppResult<()> {
        let mut tx = self.db.begin().await?;

        sqlx::query(
            r#"
            UPDATE auth_challenges SET consumed_at = $3
            WHERE email = $1 AND purpose = $2 AND consumed_at IS NULL
            "#,
        )
        .bind(&challenge.email)
        .bind(challenge.purpose)
        .bind(challenge.created_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO auth_challenges (id, email, purpose, secret_hash, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(challenge.id)
        .bind(&challenge.email)
        .bind(challenge.purpose)
        .bind(&challenge.secret_hash)
        .bind(challenge.expires_at)
        .bind(challenge.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn consume_challenge(
        &self,
        purpose: ChallengePurpose,
        secret_hash: &str,
        email: Option<&str>,
        now: DateTime<Utc>,
    ) -> AppResult<Option<AuthChallenge>> {
        let challenge = sqlx::query_as::<_, AuthChallenge>(
            r#"
            UPDATE auth_challenges SET consumed_at = $4
            WHERE purpose = $1
              AND secret_hash = $2
              AND ($3::text IS NULL OR email = $3)
              AND consumed_at IS NULL
              AND expires_at > $4
            RETURNING *
            "#,
        )
        .bind(purpose)
        .bind(secret_hash)
        .bind(email)
        .bind(now)
        .fetch_optional(&self.db)
        .await?;
        Ok(challenge)
    }

    async fn record_failed_attempt(
        &self,
        purpose: ChallengePurpose,
        email: &str,
        max_attempts: i32,
        now: DateTime<Utc>,
    ) -> AppResult<Option<i32>> {
        let left = sqlx::query_scalar::<_, i32>(
            r#"
            UPDATE auth_challenges SET
                failed_attempts = failed_attempts + 1,
                consumed_at = CASE
                    WHEN failed_attempts + 1 >= $3 THEN $4
                    ELSE consumed_at
                END
            WHERE email = $1
              AND purpose = $2
              AND consumed_at IS NULL
              AND expires_at > $4
            RETURNING GREATEST($3 - failed_attempts, 0)
            "#,
        )
        .bind(email)
        .bind(purpose)
        .bind(max_attempts)
        .bind(now)
        .fetch_optional(&self.db)
        .await?;
        Ok(left)
    }

    async fn purge_challenges(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let result = sqlx::query(
            "DELETE FROM auth_challenges WHERE consumed_at IS NOT NULL OR expires_at <= $1",
        )
        .bind(now)
        .execute(&self.db)
        .await?;
        Ok(result.rows_affected())
    }
}

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{AccountStore, EngagementStore};
use crate::error::{AppError, AppResult};
use crate::models::achievement::UnlockedAchievement;
use crate::models::activity::{ActivityCounts, ActivityEvent};
use crate::models::check_in::{CheckIn, NewCheckIn};
use crate::models::streak::{Streak, StreakType};
use crate::models::user::{AuthChallenge, ChallengePurpose, User};

#[derive(Default)]
struct MemoryState {
    check_ins: HashMap<(Uuid, NaiveDate), CheckIn>,
    activities: Vec<ActivityEvent>,
    streaks: HashMap<(Uuid, StreakType), Streak>,
    unlocks: HashMap<(Uuid, String), DateTime<Utc>>,
    users: HashMap<Uuid, User>,
    challenges: Vec<AuthChallenge>,
}

/// In-process store. Used when no `DATABASE_URL` is configured and by tests.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn newest_first(mut check_ins: Vec<CheckIn>) -> Vec<CheckIn> {
    check_ins.sort_by(|a, b| b.check_in_date.cmp(&a.check_in_date));
    check_ins
}

#[async_trait]
impl EngagementStore for MemoryStore {
    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }

    async fn insert_check_in(&self, check_in: NewCheckIn) -> AppResult<CheckIn> {
        let mut state = self.state.lock().await;
        let key = (check_in.user_id, check_in.check_in_date);
        if state.check_ins.contains_key(&key) {
            return Err(AppError::DuplicateCheckIn {
                date: check_in.check_in_date,
            });
        }
        let row = check_in.into_check_in(Uuid::new_v4());
        state.check_ins.insert(key, row.clone());
        Ok(row)
    }

    async fn find_check_in(&self, user_id: Uuid, date: NaiveDate) -> AppResult<Option<CheckIn>> {
        let state = self.state.lock().await;
        Ok(state.check_ins.get(&(user_id, date)).cloned())
    }

    async fn list_check_ins(
        &self,
        user_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
    ) -> AppResult<Vec<CheckIn>> {
        let state = self.state.lock().await;
        let rows = state
            .check_ins
            .values()
            .filter(|c| c.user_id == user_id && c.check_in_date >= start && c.check_in_date <= end)
            .cloned()
            .collect();
        Ok(newest_first(rows))
    }

    async fn all_check_ins(&self, user_id: Uuid) -> AppResult<Vec<CheckIn>> {
        let state = self.state.lock().await;
        let rows = state
            .check_ins
            .values()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect();
        Ok(newest_first(rows))
    }

    async fn insert_activity(&self, event: ActivityEvent) -> AppResult<ActivityEvent> {
        let mut state = self.state.lock().await;
        state.activities.push(event.clone());
        Ok(event)
    }

    async fn activity_dates(&self, user_id: Uuid, kind: StreakType) -> AppResult<Vec<NaiveDate>> {
        let state = self.state.lock().await;
        Ok(state
            .activities
            .iter()
            .filter(|a| a.user_id == user_id && a.kind == kind)
            .map(|a| a.activity_date)
            .collect())
    }

    async fn activity_counts(&self, user_id: Uuid) -> AppResult<ActivityCounts> {
        let state = self.state.lock().await;
        let mut counts = ActivityCounts::default();
        for event in state.activities.iter().filter(|a| a.user_id == user_id) {
            counts.add(event.kind, 1);
        }
        Ok(counts)
    }

    async fn find_streak(&self, user_id: Uuid, kind: StreakType) -> AppResult<Option<Streak>> {
        let state = self.state.lock().await;
        Ok(state.streaks.get(&(user_id, kind)).cloned())
    }

    async fn save_streak(&self, streak: &Streak) -> AppResult<Streak> {
        let mut state = self.state.lock().await;
        let key = (streak.user_id, streak.kind);
        let mut row = streak.clone();
        if let Some(existing) = state.streaks.get(&key) {
            row.id = existing.id;
            row.longest_streak = row.longest_streak.max(existing.longest_streak);
        }
        state.streaks.insert(key, row.clone());
        Ok(row)
    }

    async fn unlocked_achievements(&self, user_id: Uuid) -> AppResult<Vec<UnlockedAchievement>> {
        let state = self.state.lock().await;
        Ok(state
            .unlocks
            .iter()
            .filter(|((uid, _), _)| *uid == user_id)
            .map(|((uid, id), at)| UnlockedAchievement {
                user_id: *uid,
                achievement_id: id.clone(),
                unlocked_at: *at,
            })
            .collect())
    }

    async fn record_unlock(
        &self,
        user_id: Uuid,
        achievement_id: &str,
        unlocked_at: DateTime<Utc>,
    ) -> AppResult<bool> {
        let mut state = self.state.lock().await;
        let key = (user_id, achievement_id.to_string());
        if state.unlocks.contains_key(&key) {
            return Ok(false);
        }
        state.unlocks.insert(key, unlocked_at);
        Ok(true)
    }

    async fn partner_of(&self, user_id: Uuid) -> AppResult<Option<Uuid>> {
        let state = self.state.lock().await;
        Ok(state.users.get(&user_id).and_then(|u| u.partner_id))
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn find_user(&self, user_id: Uuid) -> AppResult<Option<User>> {
        let state = self.state.lock().await;
        Ok(state.users.get(&user_id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let state = self.state.lock().await;
        Ok(state.users.values().find(|u| u.email == email).cloned())
    }

    async fn find_or_create_user(&self, email: &str, now: DateTime<Utc>) -> AppResult<User> {
        let mut state = self.state.lock().await;
        if let Some(user) = state.users.values().find(|u| u.email == email) {
            return Ok(user.clone());
        }
        let user = User::new(email, now);
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn link_partners(&self, a: Uuid, b: Uuid) -> AppResult<()> {
        let mut state = self.state.lock().await;
        let (Some(left), Some(right)) = (state.users.get(&a), state.users.get(&b)) else {
            return Err(AppError::NotFound("User not found".into()));
        };
        if left.partner_id.is_some() || right.partner_id.is_some() {
            return Err(AppError::Conflict("Already linked to a partner".into()));
        }
        let now = Utc::now();
        for (id, partner) in [(a, b), (b, a)] {
            if let Some(user) = state.users.get_mut(&id) {
                user.partner_id = Some(partner);
                user.updated_at = now;
            }
        }
        Ok(())
    }

    async fn unlink_partner(&self, user_id: Uuid) -> AppResult<Option<Uuid>> {
        let mut state = self.state.lock().await;
        let partner = state.users.get(&user_id).and_then(|u| u.partner_id);
        if let Some(partner) = partner {
            let now = Utc::now();
            for id in [user_id, partner] {
                if let Some(user) = state.users.get_mut(&id) {
                    user.partner_id = None;
                    user.updated_at = now;
                }
            }
        }
        Ok(partner)
    }

    async fn insert_challenge(&self, challenge: AuthChallenge) -> AppResult<()> {
        let mut state = self.state.lock().await;
        let now = challenge.created_at;
        for existing in state.challenges.iter_mut().filter(|c| {
            c.email == challenge.email && c.purpose == challenge.purpose && c.consumed_at.is_none()
        }) {
            existing.consumed_at = Some(now);
        }
        state.challenges.push(challenge);
        Ok(())
    }

    async fn consume_challenge(
        &self,
        purpose: ChallengePurpose,
        secret_hash: &str,
        email: Option<&str>,
        now: DateTime<Utc>,
    ) -> AppResult<Option<AuthChallenge>> {
        let mut state = self.state.lock().await;
        let found = state.challenges.iter_mut().find(|c| {
            c.purpose == purpose
                && c.secret_hash == secret_hash
                && email.map_or(true, |e| c.email == e)
                && c.is_active(now)
        });
        Ok(found.map(|challenge| {
            challenge.consumed_at = Some(now);
            challenge.clone()
        }))
    }

    async fn record_failed_attempt(
        &self,
        purpose: ChallengePurpose,
        email: &str,
        max_attempts: i32,
        now: DateTime<Utc>,
    ) -> AppResult<Option<i32>> {
        let mut state = self.state.lock().await;
        let active = state
            .challenges
            .iter_mut()
            .find(|c| c.purpose == purpose && c.email == email && c.is_active(now));
        Ok(active.map(|challenge| {
            challenge.failed_attempts += 1;
            if challenge.failed_attempts >= max_attempts {
                challenge.consumed_at = Some(now);
            }
            (max_attempts - challenge.failed_attempts).max(0)
        }))
    }

    async fn purge_challenges(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let mut state = self.state.lock().await;
        let before = state.challenges.len();
        state.challenges.retain(|c| c.is_active(now));
        Ok((before - state.challenges.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn challenge(email: &str, purpose: ChallengePurpose, hash: &str, now: DateTime<Utc>) -> AuthChallenge {
        AuthChallenge {
            id: Uuid::new_v4(),
            email: email.into(),
            purpose,
            secret_hash: hash.into(),
            failed_attempts: 0,
            expires_at: now + Duration::minutes(10),
            consumed_at: None,
            created_at: now,
        }
    }

    #[tokio::test]
    async fn purge_drops_expired_and_consumed_challenges() {
        let store = MemoryStore::new();
        let now = Utc::now();

        store
            .insert_challenge(challenge("alex@example.com", ChallengePurpose::Code, "a", now))
            .await
            .unwrap();
        store
            .insert_challenge(challenge("sam@example.com", ChallengePurpose::Code, "s", now))
            .await
            .unwrap();
        let mut stale = challenge("jo@example.com", ChallengePurpose::MagicLink, "j", now);
        stale.expires_at = now - Duration::seconds(1);
        store.insert_challenge(stale).await.unwrap();

        let consumed = store
            .consume_challenge(ChallengePurpose::Code, "a", Some("alex@example.com"), now)
            .await
            .unwrap();
        assert!(consumed.is_some());

        assert_eq!(store.purge_challenges(now).await.unwrap(), 2);
        assert_eq!(store.purge_challenges(now).await.unwrap(), 0);

        let live = store
            .consume_challenge(ChallengePurpose::Code, "s", Some("sam@example.com"), now)
            .await
            .unwrap();
        assert!(live.is_some());
    }

    #[tokio::test]
    async fn failed_attempts_burn_the_active_challenge() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store
            .insert_challenge(challenge("alex@example.com", ChallengePurpose::Code, "h", now))
            .await
            .unwrap();

        for left in [2, 1, 0] {
            let counted = store
                .record_failed_attempt(ChallengePurpose::Code, "alex@example.com", 3, now)
                .await
                .unwrap();
            assert_eq!(counted, Some(left));
        }

        let burned = store
            .consume_challenge(ChallengePurpose::Code, "h", Some("alex@example.com"), now)
            .await
            .unwrap();
        assert!(burned.is_none());
        let after = store
            .record_failed_attempt(ChallengePurpose::Code, "alex@example.com", 3, now)
            .await
            .unwrap();
        assert_eq!(after, None);
    }
}

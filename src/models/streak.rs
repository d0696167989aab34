use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Streak {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: StreakType,
    pub current_streak: i32,
    pub longest_streak: i32,
    pub goal: i32,
    pub last_activity_date: Option<NaiveDate>,
    pub updated_at: DateTime<Utc>,
}

impl Streak {
    pub fn empty(user_id: Uuid, kind: StreakType, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            kind,
            current_streak: 0,
            longest_streak: 0,
            goal: kind.default_goal(),
            last_activity_date: None,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[sqlx(type_name = "streak_type", rename_all = "snake_case")]
#[serde(rename_all = "kebab-case")]
pub enum StreakType {
    DailyCheckin,
    TaskCompletion,
    NoteSharing,
    EventPlanning,
    FinanceTracking,
}

impl StreakType {
    pub const ALL: [StreakType; 5] = [
        StreakType::DailyCheckin,
        StreakType::TaskCompletion,
        StreakType::NoteSharing,
        StreakType::EventPlanning,
        StreakType::FinanceTracking,
    ];

    pub fn default_goal(self) -> i32 {
        match self {
            StreakType::DailyCheckin => 7,
            StreakType::TaskCompletion => 5,
            StreakType::NoteSharing => 3,
            StreakType::EventPlanning => 2,
            StreakType::FinanceTracking => 7,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StreakType::DailyCheckin => "daily-checkin",
            StreakType::TaskCompletion => "task-completion",
            StreakType::NoteSharing => "note-sharing",
            StreakType::EventPlanning => "event-planning",
            StreakType::FinanceTracking => "finance-tracking",
        }
    }
}

impl std::str::FromStr for StreakType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StreakType::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("Unknown streak type: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn streak_type_parses_its_wire_name() {
        for kind in StreakType::ALL {
            assert_eq!(kind.as_str().parse::<StreakType>(), Ok(kind));
        }
        assert!("weekly-hugs".parse::<StreakType>().is_err());
    }

    #[test]
    fn serde_uses_kebab_case() {
        let json = serde_json::to_string(&StreakType::FinanceTracking).unwrap();
        assert_eq!(json, "\"finance-tracking\"");
    }
}

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CheckIn {
    pub id: Uuid,
    pub user_id: Uuid,
    pub check_in_date: NaiveDate,
    pub mood: Mood,
    pub energy: i32,
    pub note: String,
    pub gratitude: Option<String>,
    pub partner_message: Option<String>,
    pub is_shared: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "mood", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Mood {
    Amazing,
    Happy,
    Calm,
    Okay,
    Tired,
    Stressed,
    Sad,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SubmitCheckInRequest {
    pub mood: Mood,

    #[validate(range(min = 1, max = 10, message = "Energy must be between 1 and 10"))]
    pub energy: i32,

    #[serde(default)]
    #[validate(length(max = 2000, message = "Note must be at most 2000 characters"))]
    pub note: String,

    #[validate(length(max = 1000, message = "Gratitude must be at most 1000 characters"))]
    pub gratitude: Option<String>,

    #[validate(length(max = 1000, message = "Partner message must be at most 1000 characters"))]
    pub partner_message: Option<String>,

    #[serde(default = "default_shared")]
    pub is_shared: bool,
}

fn default_shared() -> bool {
    true
}

/// Row about to be appended to the check-in log.
#[derive(Debug, Clone)]
pub struct NewCheckIn {
    pub user_id: Uuid,
    pub check_in_date: NaiveDate,
    pub payload: SubmitCheckInRequest,
    pub created_at: DateTime<Utc>,
}

impl NewCheckIn {
    pub fn into_check_in(self, id: Uuid) -> CheckIn {
        CheckIn {
            id,
            user_id: self.user_id,
            check_in_date: self.check_in_date,
            mood: self.payload.mood,
            energy: self.payload.energy,
            note: self.payload.note,
            gratitude: self.payload.gratitude.filter(|g| !g.trim().is_empty()),
            partner_message: self.payload.partner_message.filter(|m| !m.trim().is_empty()),
            is_shared: self.payload.is_shared,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CheckInQuery {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckInStatus {
    pub has_checked_in: bool,
    pub check_in: Option<CheckIn>,
    pub streak: i32,
    pub next_check_in_time: DateTime<Utc>,
}

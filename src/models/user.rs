use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub partner_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(email: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            email: email.to_string(),
            name: default_name(email),
            partner_id: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Local part of the address, used until the user picks a display name.
pub fn default_name(email: &str) -> String {
    email.split('@').next().unwrap_or(email).to_string()
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "challenge_purpose", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ChallengePurpose {
    Code,
    MagicLink,
}

/// A pending email verification code or magic link. Only the SHA-256 digest
/// of the secret is kept.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AuthChallenge {
    pub id: Uuid,
    pub email: String,
    pub purpose: ChallengePurpose,
    #[serde(skip_serializing)]
    pub secret_hash: String,
    pub failed_attempts: i32,
    pub expires_at: DateTime<Utc>,
    pub consumed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl AuthChallenge {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.consumed_at.is_none() && self.expires_at > now
    }
}

#[derive(Debug, Serialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub partner_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserProfile {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            email: u.email,
            name: u.name,
            partner_id: u.partner_id,
            created_at: u.created_at,
        }
    }
}

//! Passwordless sign-in: six digit email codes and single-use magic links.

use chrono::{DateTime, Duration, Utc};
use rand::{Rng, RngCore};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::jwt::{create_access_token, hash_token, AccessToken};
use crate::auth::rate_limit::RateLimitState;
use crate::config::Config;
use crate::email::{magic_link_email, verification_code_email, EmailSender};
use crate::error::{AppError, AppResult};
use crate::models::user::{AuthChallenge, ChallengePurpose, UserProfile};
use crate::store::AccountStore;

/// Wrong guesses a code survives before it is burned.
pub const MAX_CODE_ATTEMPTS: i32 = 5;

pub fn generate_code<R: Rng>(rng: &mut R) -> String {
    format!("{:06}", rng.gen_range(0..1_000_000u32))
}

pub fn generate_link_token<R: RngCore>(rng: &mut R) -> String {
    let mut bytes = [0u8; 32];
    rng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub fn normalize_email(email: &str) -> AppResult<String> {
    let email = email.trim().to_lowercase();
    if !validator::validate_email(&email) {
        return Err(AppError::Validation("Invalid email format".into()));
    }
    Ok(email)
}

/// Codes are short, so the digest is bound to the address they were sent to.
fn code_digest(email: &str, code: &str) -> String {
    hash_token(&format!("{}:{}", email, code))
}

#[derive(Debug, Serialize)]
pub struct ChallengeIssued {
    pub message: String,
    pub expires_in: i64,
}

#[derive(Debug, Serialize)]
pub struct SignedIn {
    #[serde(flatten)]
    pub token: AccessToken,
    pub user: UserProfile,
}

pub struct VerificationFlow<'a> {
    accounts: &'a dyn AccountStore,
    mailer: &'a dyn EmailSender,
    config: &'a Config,
}

impl<'a> VerificationFlow<'a> {
    pub fn new(accounts: &'a dyn AccountStore, mailer: &'a dyn EmailSender, config: &'a Config) -> Self {
        Self {
            accounts,
            mailer,
            config,
        }
    }

    pub async fn request_code(&self, email: &str, now: DateTime<Utc>) -> AppResult<ChallengeIssued> {
        let email = normalize_email(email)?;
        let code = generate_code(&mut rand::thread_rng());
        let ttl = self.config.verification_code_ttl_secs;

        self.accounts
            .insert_challenge(AuthChallenge {
                id: Uuid::new_v4(),
                email: email.clone(),
                purpose: ChallengePurpose::Code,
                secret_hash: code_digest(&email, &code),
                failed_attempts: 0,
                expires_at: now + Duration::seconds(ttl),
                consumed_at: None,
                created_at: now,
            })
            .await?;

        let (subject, html) = verification_code_email(&code, ttl / 60);
        self.mailer.send_email(&email, &subject, &html).await?;
        tracing::info!(email = %email, "Verification code sent");

        Ok(ChallengeIssued {
            message: "Verification code sent".into(),
            expires_in: ttl,
        })
    }

    pub async fn verify_code(&self, email: &str, code: &str, now: DateTime<Utc>) -> AppResult<SignedIn> {
        let email = normalize_email(email)?;
        let code = code.trim();
        if code.len() != 6 || !code.chars().all(|c| c.is_ascii_digit()) {
            return Err(AppError::Validation("Code must be 6 digits".into()));
        }

        let consumed = self
            .accounts
            .consume_challenge(ChallengePurpose::Code, &code_digest(&email, code), Some(&email), now)
            .await?;

        let Some(challenge) = consumed else {
            let left = self
                .accounts
                .record_failed_attempt(ChallengePurpose::Code, &email, MAX_CODE_ATTEMPTS, now)
                .await?;
            match left {
                Some(0) => {
                    tracing::warn!(email = %email, "Verification code burned after too many wrong guesses")
                }
                Some(left) => tracing::warn!(email = %email, left, "Wrong verification code"),
                None => tracing::warn!(email = %email, "No active verification code"),
            }
            return Err(AppError::Unauthorized);
        };

        self.sign_in(&challenge.email, now).await
    }

    pub async fn request_magic_link(&self, email: &str, now: DateTime<Utc>) -> AppResult<ChallengeIssued> {
        let email = normalize_email(email)?;
        let token = generate_link_token(&mut rand::thread_rng());
        let ttl = self.config.magic_link_ttl_secs;

        self.accounts
            .insert_challenge(AuthChallenge {
                id: Uuid::new_v4(),
                email: email.clone(),
                purpose: ChallengePurpose::MagicLink,
                secret_hash: hash_token(&token),
                failed_attempts: 0,
                expires_at: now + Duration::seconds(ttl),
                consumed_at: None,
                created_at: now,
            })
            .await?;

        let link = format!(
            "{}/auth/magic?token={}",
            self.config.frontend_url.trim_end_matches('/'),
            token
        );
        let (subject, html) = magic_link_email(&link, ttl / 60);
        self.mailer.send_email(&email, &subject, &html).await?;
        tracing::info!(email = %email, "Magic link sent");

        Ok(ChallengeIssued {
            message: "Magic link sent".into(),
            expires_in: ttl,
        })
    }

    pub async fn consume_magic_link(&self, token: &str, now: DateTime<Utc>) -> AppResult<SignedIn> {
        let challenge = self
            .accounts
            .consume_challenge(ChallengePurpose::MagicLink, &hash_token(token.trim()), None, now)
            .await?
            .ok_or_else(|| {
                tracing::warn!("Invalid or expired magic link");
                AppError::Unauthorized
            })?;

        self.sign_in(&challenge.email, now).await
    }

    async fn sign_in(&self, email: &str, now: DateTime<Utc>) -> AppResult<SignedIn> {
        let user = self.accounts.find_or_create_user(email, now).await?;
        let token = create_access_token(user.id, &user.email, self.config)?;
        tracing::info!(user_id = %user.id, "User signed in");
        Ok(SignedIn {
            token,
            user: user.into(),
        })
    }
}

/// Purge spent challenges and idle rate-limit windows every 5 min.
pub fn spawn_cleanup_worker(accounts: Arc<dyn AccountStore>, rate_limiter: RateLimitState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(300));
        loop {
            interval.tick().await;
            match accounts.purge_challenges(Utc::now()).await {
                Ok(count) if count > 0 => {
                    tracing::info!(purged = count, "Challenge cleanup: purged spent challenges");
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "Challenge cleanup worker error"),
            }
            let dropped = rate_limiter.cleanup().await;
            if dropped > 0 {
                tracing::debug!(dropped, "Rate limit windows dropped");
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    /// Keeps every message so tests can read the code or link back.
    #[derive(Default)]
    struct Outbox {
        sent: Mutex<Vec<(String, String, String)>>,
    }

    #[async_trait]
    impl EmailSender for Outbox {
        async fn send_email(&self, to: &str, subject: &str, html: &str) -> anyhow::Result<()> {
            self.sent
                .lock()
                .await
                .push((to.to_string(), subject.to_string(), html.to_string()));
            Ok(())
        }
    }

    impl Outbox {
        async fn last_code(&self) -> String {
            let sent = self.sent.lock().await;
            let (_, subject, _) = sent.last().unwrap();
            subject.rsplit(' ').next().unwrap().to_string()
        }

        async fn last_link_token(&self) -> String {
            let sent = self.sent.lock().await;
            let (_, _, html) = sent.last().unwrap();
            let start = html.find("token=").unwrap() + "token=".len();
            html[start..start + 64].to_string()
        }
    }

    #[test]
    fn codes_are_six_digits() {
        let mut rng = rand::thread_rng();
        for _ in 0..200 {
            let code = generate_code(&mut rng);
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn link_tokens_are_64_hex_chars() {
        let token = generate_link_token(&mut rand::thread_rng());
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn emails_are_normalized() {
        assert_eq!(normalize_email("  Sam@Example.COM ").unwrap(), "sam@example.com");
        assert!(normalize_email("not-an-email").is_err());
    }

    #[tokio::test]
    async fn code_round_trip_signs_in_once() {
        let store = MemoryStore::new();
        let outbox = Outbox::default();
        let config = Config::for_tests();
        let flow = VerificationFlow::new(&store, &outbox, &config);
        let now = Utc::now();

        let issued = flow.request_code("Alex@Example.com", now).await.unwrap();
        assert_eq!(issued.expires_in, 600);
        let code = outbox.last_code().await;

        let signed_in = flow.verify_code("alex@example.com", &code, now).await.unwrap();
        assert_eq!(signed_in.user.email, "alex@example.com");

        let reused = flow.verify_code("alex@example.com", &code, now).await;
        assert!(matches!(reused, Err(AppError::Unauthorized)));
    }

    #[tokio::test]
    async fn code_expires_after_ten_minutes() {
        let store = MemoryStore::new();
        let outbox = Outbox::default();
        let config = Config::for_tests();
        let flow = VerificationFlow::new(&store, &outbox, &config);
        let now = Utc::now();

        flow.request_code("alex@example.com", now).await.unwrap();
        let code = outbox.last_code().await;

        let late = now + Duration::minutes(10) + Duration::seconds(1);
        let result = flow.verify_code("alex@example.com", &code, late).await;
        assert!(matches!(result, Err(AppError::Unauthorized)));
    }

    #[tokio::test]
    async fn code_is_bound_to_its_email() {
        let store = MemoryStore::new();
        let outbox = Outbox::default();
        let config = Config::for_tests();
        let flow = VerificationFlow::new(&store, &outbox, &config);
        let now = Utc::now();

        flow.request_code("alex@example.com", now).await.unwrap();
        let code = outbox.last_code().await;
        let result = flow.verify_code("sam@example.com", &code, now).await;
        assert!(matches!(result, Err(AppError::Unauthorized)));
    }

    #[tokio::test]
    async fn code_is_burned_after_too_many_wrong_guesses() {
        let store = MemoryStore::new();
        let outbox = Outbox::default();
        let config = Config::for_tests();
        let flow = VerificationFlow::new(&store, &outbox, &config);
        let now = Utc::now();

        flow.request_code("alex@example.com", now).await.unwrap();
        let code = outbox.last_code().await;
        let wrong = if code == "000000" { "111111" } else { "000000" };

        for _ in 0..MAX_CODE_ATTEMPTS {
            let guess = flow.verify_code("alex@example.com", wrong, now).await;
            assert!(matches!(guess, Err(AppError::Unauthorized)));
        }

        let late = flow.verify_code("alex@example.com", &code, now).await;
        assert!(matches!(late, Err(AppError::Unauthorized)));

        // A fresh code starts a fresh budget.
        flow.request_code("alex@example.com", now).await.unwrap();
        let fresh = outbox.last_code().await;
        flow.verify_code("alex@example.com", &fresh, now).await.unwrap();
    }

    #[tokio::test]
    async fn a_few_typos_do_not_lock_the_code() {
        let store = MemoryStore::new();
        let outbox = Outbox::default();
        let config = Config::for_tests();
        let flow = VerificationFlow::new(&store, &outbox, &config);
        let now = Utc::now();

        flow.request_code("alex@example.com", now).await.unwrap();
        let code = outbox.last_code().await;
        let wrong = if code == "000000" { "111111" } else { "000000" };

        for _ in 0..MAX_CODE_ATTEMPTS - 1 {
            assert!(flow.verify_code("alex@example.com", wrong, now).await.is_err());
        }
        flow.verify_code("alex@example.com", &code, now).await.unwrap();
    }

    #[tokio::test]
    async fn new_code_supersedes_the_previous_one() {
        let store = MemoryStore::new();
        let outbox = Outbox::default();
        let config = Config::for_tests();
        let flow = VerificationFlow::new(&store, &outbox, &config);
        let now = Utc::now();

        flow.request_code("alex@example.com", now).await.unwrap();
        let first = outbox.last_code().await;
        flow.request_code("alex@example.com", now + Duration::seconds(5)).await.unwrap();
        let second = outbox.last_code().await;

        if first != second {
            let stale = flow.verify_code("alex@example.com", &first, now + Duration::seconds(6)).await;
            assert!(matches!(stale, Err(AppError::Unauthorized)));
        }
        flow.verify_code("alex@example.com", &second, now + Duration::seconds(6))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn magic_link_works_once_within_fifteen_minutes() {
        let store = MemoryStore::new();
        let outbox = Outbox::default();
        let config = Config::for_tests();
        let flow = VerificationFlow::new(&store, &outbox, &config);
        let now = Utc::now();

        let issued = flow.request_magic_link("sam@example.com", now).await.unwrap();
        assert_eq!(issued.expires_in, 900);
        let token = outbox.last_link_token().await;

        let signed_in = flow
            .consume_magic_link(&token, now + Duration::minutes(14))
            .await
            .unwrap();
        assert_eq!(signed_in.user.email, "sam@example.com");
        assert!(flow.consume_magic_link(&token, now + Duration::minutes(14)).await.is_err());
    }

    #[tokio::test]
    async fn expired_magic_link_is_rejected() {
        let store = MemoryStore::new();
        let outbox = Outbox::default();
        let config = Config::for_tests();
        let flow = VerificationFlow::new(&store, &outbox, &config);
        let now = Utc::now();

        flow.request_magic_link("sam@example.com", now).await.unwrap();
        let token = outbox.last_link_token().await;
        let result = flow.consume_magic_link(&token, now + Duration::minutes(16)).await;
        assert!(matches!(result, Err(AppError::Unauthorized)));
    }
}

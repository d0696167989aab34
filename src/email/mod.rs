//! Outbound email. The service only needs `send_email(to, subject, html)`;
//! delivery is delegated to an HTTP provider, or logged when none is set.

use std::time::Duration;

use async_trait::async_trait;

use crate::config::Config;

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send_email(&self, to: &str, subject: &str, html: &str) -> anyhow::Result<()>;
}

/// Writes messages to the log instead of sending them. Local development.
pub struct LogEmailSender;

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send_email(&self, to: &str, subject: &str, html: &str) -> anyhow::Result<()> {
        tracing::info!(to = %to, subject = %subject, body = %html, "Email (log sender)");
        Ok(())
    }
}

/// Posts `{from, to, subject, html}` as JSON to a provider endpoint.
pub struct HttpEmailSender {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    from: String,
}

impl HttpEmailSender {
    pub fn new(endpoint: &str, api_key: &str, from: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            api_key: api_key.to_string(),
            from: from.to_string(),
        })
    }
}

#[async_trait]
impl EmailSender for HttpEmailSender {
    async fn send_email(&self, to: &str, subject: &str, html: &str) -> anyhow::Result<()> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({
                "from": self.from,
                "to": [to],
                "subject": subject,
                "html": html,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Email provider error {}: {}", status, body);
        }

        tracing::debug!(to = %to, subject = %subject, "Email accepted by provider");
        Ok(())
    }
}

pub fn sender_from_config(config: &Config) -> anyhow::Result<Box<dyn EmailSender>> {
    match &config.email_api_url {
        Some(url) => Ok(Box::new(HttpEmailSender::new(
            url,
            &config.email_api_key,
            &config.email_from,
        )?)),
        None => {
            tracing::warn!("EMAIL_API_URL not set, emails will only be logged");
            Ok(Box::new(LogEmailSender))
        }
    }
}

pub fn verification_code_email(code: &str, ttl_minutes: i64) -> (String, String) {
    let subject = format!("Your Duet sign-in code: {}", code);
    let html = format!(
        "<p>Your sign-in code is</p>\
         <p style=\"font-size:28px;letter-spacing:6px\"><strong>{}</strong></p>\
         <p>It expires in {} minutes. If you did not ask for it, ignore this email.</p>",
        code, ttl_minutes
    );
    (subject, html)
}

pub fn magic_link_email(link: &str, ttl_minutes: i64) -> (String, String) {
    let subject = "Your Duet sign-in link".to_string();
    let html = format!(
        "<p><a href=\"{link}\">Sign in to Duet</a></p>\
         <p>The link works once and expires in {ttl_minutes} minutes.</p>"
    );
    (subject, html)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_email_mentions_code_and_expiry() {
        let (subject, html) = verification_code_email("042917", 10);
        assert!(subject.contains("042917"));
        assert!(html.contains("042917"));
        assert!(html.contains("10 minutes"));
    }

    #[test]
    fn missing_provider_falls_back_to_log_sender() {
        let config = Config::for_tests();
        assert!(sender_from_config(&config).is_ok());
    }

    #[tokio::test]
    async fn log_sender_never_fails() {
        LogEmailSender
            .send_email("sam@example.com", "hi", "<p>hi</p>")
            .await
            .unwrap();
    }
}

use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    /// Unset means the in-memory store is used (local development only).
    pub database_url: Option<String>,
    pub host: String,
    pub port: u16,
    pub frontend_url: String,

    pub jwt_secret: String,
    pub jwt_access_ttl_secs: i64,

    /// Offset of the fixed calendar timezone that defines "today".
    pub calendar_utc_offset_minutes: i32,

    pub verification_code_ttl_secs: i64,
    pub magic_link_ttl_secs: i64,

    pub email_api_url: Option<String>,
    pub email_api_key: String,
    pub email_from: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            database_url: env::var("DATABASE_URL").ok().filter(|s| !s.is_empty()),
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".into())
                .parse()
                .expect("PORT must be a number"),
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:3000".into()),

            jwt_secret: env::var("JWT_SECRET").expect("JWT_SECRET must be set"),
            jwt_access_ttl_secs: env::var("JWT_ACCESS_TTL_SECS")
                .unwrap_or_else(|_| "86400".into())
                .parse()
                .expect("JWT_ACCESS_TTL_SECS must be a number"),

            calendar_utc_offset_minutes: env::var("CALENDAR_UTC_OFFSET_MINUTES")
                .unwrap_or_else(|_| "0".into())
                .parse()
                .expect("CALENDAR_UTC_OFFSET_MINUTES must be a number"),

            verification_code_ttl_secs: env::var("VERIFICATION_CODE_TTL_SECS")
                .unwrap_or_else(|_| "600".into()) // 10 minutes
                .parse()
                .unwrap_or(600),
            magic_link_ttl_secs: env::var("MAGIC_LINK_TTL_SECS")
                .unwrap_or_else(|_| "900".into()) // 15 minutes
                .parse()
                .unwrap_or(900),

            email_api_url: env::var("EMAIL_API_URL").ok().filter(|s| !s.is_empty()),
            email_api_key: env::var("EMAIL_API_KEY").unwrap_or_else(|_| String::new()),
            email_from: env::var("EMAIL_FROM")
                .unwrap_or_else(|_| "Duet <hello@duet.local>".into()),
        }
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self {
            database_url: None,
            host: "127.0.0.1".into(),
            port: 0,
            frontend_url: "http://localhost:3000".into(),
            jwt_secret: "test-secret-for-unit-tests".into(),
            jwt_access_ttl_secs: 3600,
            calendar_utc_offset_minutes: 0,
            verification_code_ttl_secs: 600,
            magic_link_ttl_secs: 900,
            email_api_url: None,
            email_api_key: String::new(),
            email_from: "Duet <test@duet.local>".into(),
        }
    }
}

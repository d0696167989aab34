use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;

use duet_api::auth::rate_limit::RateLimitState;
use duet_api::auth::verification::spawn_cleanup_worker;
use duet_api::config::Config;
use duet_api::services::calendar::Calendar;
use duet_api::store::{AccountStore, EngagementStore, MemoryStore, PgStore};
use duet_api::{build_router, db, email, AppState};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "duet_api=debug,tower_http=debug".into()),
        )
        .json()
        .init();

    let config = Arc::new(Config::from_env());
    let calendar =
        Calendar::new(config.calendar_utc_offset_minutes).expect("Invalid CALENDAR_UTC_OFFSET_MINUTES");

    let (engagement, accounts): (Arc<dyn EngagementStore>, Arc<dyn AccountStore>) =
        match config.database_url.as_deref() {
            Some(url) => {
                let db = db::create_pool(url)
                    .await
                    .expect("Failed to connect to database");
                let store = Arc::new(PgStore::new(db));
                (store.clone(), store)
            }
            None => {
                tracing::warn!("DATABASE_URL not set, using in-memory store; data is lost on restart");
                let store = Arc::new(MemoryStore::new());
                (store.clone(), store)
            }
        };

    let mailer = Arc::from(email::sender_from_config(&config).expect("Failed to configure email sender"));

    // WebSocket broadcast channel
    let (ws_tx, _) = broadcast::channel::<String>(256);

    let state = AppState {
        config: config.clone(),
        calendar,
        engagement,
        accounts: accounts.clone(),
        mailer,
        ws_tx: Some(ws_tx),
        rate_limiter: RateLimitState::new(),
    };

    let allowed_origins: Vec<axum::http::HeaderValue> = {
        let mut origins = vec![config
            .frontend_url
            .parse::<axum::http::HeaderValue>()
            .expect("FRONTEND_URL is not a valid origin")];
        if let Ok(extra) = std::env::var("CORS_EXTRA_ORIGINS") {
            for o in extra.split(',') {
                if let Ok(hv) = o.trim().parse::<axum::http::HeaderValue>() {
                    origins.push(hv);
                }
            }
        }
        origins
    };
    let cors = CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::DELETE,
            axum::http::Method::OPTIONS,
        ])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::ACCEPT,
        ])
        .allow_credentials(true);

    spawn_cleanup_worker(accounts, state.rate_limiter.clone());

    let app = build_router(state, cors);

    let addr = config.listen_addr();
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind listen address");
    // Client IP is needed by the challenge rate limiter
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Server error");
}

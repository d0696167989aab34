use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod auth;
pub mod config;
pub mod db;
pub mod email;
pub mod error;
pub mod handlers;
pub mod models;
pub mod services;
pub mod store;

use auth::rate_limit::RateLimitState;
use auth::verification::VerificationFlow;
use config::Config;
use email::EmailSender;
use services::calendar::Calendar;
use services::engagement::EngagementService;
use store::{AccountStore, EngagementStore};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub calendar: Calendar,
    pub engagement: Arc<dyn EngagementStore>,
    pub accounts: Arc<dyn AccountStore>,
    pub mailer: Arc<dyn EmailSender>,
    pub ws_tx: Option<broadcast::Sender<String>>,
    pub rate_limiter: RateLimitState,
}

impl AppState {
    pub fn engagement_service(&self) -> EngagementService {
        EngagementService::new(self.engagement.clone(), self.calendar)
    }

    pub fn verification(&self) -> VerificationFlow<'_> {
        VerificationFlow::new(self.accounts.as_ref(), self.mailer.as_ref(), &self.config)
    }
}

pub fn build_router(state: AppState, cors: CorsLayer) -> Router {
    let challenge_routes = Router::new()
        .route("/api/auth/code", post(handlers::auth::request_code))
        .route("/api/auth/magic-link", post(handlers::auth::request_magic_link))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::rate_limit::rate_limit_challenges,
        ));

    let verify_routes = Router::new()
        .route("/api/auth/code/verify", post(handlers::auth::verify_code))
        .route(
            "/api/auth/magic-link/consume",
            post(handlers::auth::consume_magic_link),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::rate_limit::rate_limit_verification,
        ));

    let public_routes = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/readyz", get(handlers::health::readyz))
        .route("/ws", get(handlers::ws::ws_handler))
        .merge(challenge_routes)
        .merge(verify_routes);

    let protected_routes = Router::new()
        .route("/api/me", get(handlers::auth::me))
        .route(
            "/api/partner",
            post(handlers::partner::link_partner).delete(handlers::partner::unlink_partner),
        )
        // Check-ins
        .route(
            "/api/check-ins",
            post(handlers::check_ins::submit_check_in).get(handlers::check_ins::list_check_ins),
        )
        .route(
            "/api/check-ins/status",
            get(handlers::check_ins::check_in_status),
        )
        .route(
            "/api/check-ins/partner",
            get(handlers::check_ins::partner_check_ins),
        )
        // Streaks, achievements, score
        .route("/api/activities", post(handlers::engagement::record_activity))
        .route("/api/streaks", get(handlers::engagement::list_streaks))
        .route(
            "/api/streaks/:kind/recompute",
            post(handlers::engagement::recompute_streak),
        )
        .route(
            "/api/achievements",
            get(handlers::engagement::list_achievements),
        )
        .route("/api/couple-score", get(handlers::engagement::couple_score))
        .route("/api/engagement", get(handlers::engagement::snapshot))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::middleware::require_auth,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

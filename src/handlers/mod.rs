pub mod auth;
pub mod check_ins;
pub mod engagement;
pub mod health;
pub mod partner;
pub mod ws;

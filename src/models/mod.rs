pub mod achievement;
pub mod activity;
pub mod check_in;
pub mod streak;
pub mod user;

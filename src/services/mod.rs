pub mod achievements;
pub mod calendar;
pub mod couple_score;
pub mod engagement;
pub mod streak;

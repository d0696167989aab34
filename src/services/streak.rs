use std::collections::BTreeSet;

use chrono::{DateTime, Duration, NaiveDate, Utc};

use crate::models::streak::Streak;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreakComputation {
    pub current_streak: i32,
    pub longest_streak: i32,
    pub active_days: i64,
    pub last_activity_date: Option<NaiveDate>,
}

/// Derive current and longest streak from a set of activity dates.
///
/// The current run is anchored at `today` when today has activity, otherwise
/// at yesterday: a streak whose last day was yesterday is still alive, it
/// just has not been extended yet. Anything older reads as 0. Dates after
/// `today` are ignored.
pub fn compute(dates: &[NaiveDate], today: NaiveDate) -> StreakComputation {
    let days: BTreeSet<NaiveDate> = dates.iter().copied().filter(|d| *d <= today).collect();

    let yesterday = today - Duration::days(1);
    let anchor = if days.contains(&today) {
        Some(today)
    } else if days.contains(&yesterday) {
        Some(yesterday)
    } else {
        None
    };

    let mut current_streak = 0i32;
    if let Some(anchor) = anchor {
        let mut check_date = anchor;
        for date in days.iter().rev() {
            if *date == check_date {
                current_streak += 1;
                check_date -= Duration::days(1);
            } else if *date < check_date {
                break;
            }
        }
    }

    let mut longest_streak = 0i32;
    let mut run = 0i32;
    let mut prev_date: Option<NaiveDate> = None;
    for date in &days {
        run = match prev_date {
            Some(prev) if *date == prev + Duration::days(1) => run + 1,
            _ => 1,
        };
        longest_streak = longest_streak.max(run);
        prev_date = Some(*date);
    }

    StreakComputation {
        current_streak,
        longest_streak,
        active_days: days.len() as i64,
        last_activity_date: days.iter().next_back().copied(),
    }
}

/// Fold a fresh computation into the stored streak. `longest_streak` never
/// decreases, even if history the computation saw was shorter.
pub fn apply(mut streak: Streak, computation: StreakComputation, now: DateTime<Utc>) -> Streak {
    streak.current_streak = computation.current_streak;
    streak.longest_streak = streak
        .longest_streak
        .max(computation.longest_streak)
        .max(computation.current_streak);
    streak.last_activity_date = computation.last_activity_date;
    streak.updated_at = now;
    streak
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::streak::StreakType;
    use uuid::Uuid;

    fn day(n: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, n).unwrap()
    }

    #[test]
    fn consecutive_days_count_up() {
        let result = compute(&[day(1), day(2), day(3)], day(3));
        assert_eq!(result.current_streak, 3);
        assert_eq!(result.longest_streak, 3);
        assert_eq!(result.last_activity_date, Some(day(3)));
    }

    #[test]
    fn gap_of_two_days_restarts_at_one() {
        let result = compute(&[day(1), day(2), day(3), day(5)], day(5));
        assert_eq!(result.current_streak, 1);
        assert_eq!(result.longest_streak, 3);
    }

    #[test]
    fn streak_through_yesterday_is_still_alive() {
        let result = compute(&[day(1), day(2), day(3)], day(4));
        assert_eq!(result.current_streak, 3);

        let result = compute(&[day(1), day(2), day(3)], day(5));
        assert_eq!(result.current_streak, 0);
        assert_eq!(result.longest_streak, 3);
    }

    #[test]
    fn duplicates_and_future_dates_are_ignored() {
        let result = compute(&[day(2), day(2), day(3), day(9)], day(3));
        assert_eq!(result.current_streak, 2);
        assert_eq!(result.active_days, 2);
        assert_eq!(result.last_activity_date, Some(day(3)));
    }

    #[test]
    fn empty_history() {
        let result = compute(&[], day(3));
        assert_eq!(result.current_streak, 0);
        assert_eq!(result.longest_streak, 0);
        assert_eq!(result.last_activity_date, None);
    }

    #[test]
    fn longest_is_found_anywhere_in_history() {
        let dates = [day(1), day(2), day(4), day(5), day(6), day(7), day(9), day(10)];
        let result = compute(&dates, day(10));
        assert_eq!(result.current_streak, 2);
        assert_eq!(result.longest_streak, 4);
    }

    #[test]
    fn apply_keeps_longest_monotonic() {
        let now = Utc::now();
        let mut stored = Streak::empty(Uuid::new_v4(), StreakType::DailyCheckin, now);
        stored.longest_streak = 12;

        let updated = apply(stored, compute(&[day(5)], day(5)), now);
        assert_eq!(updated.current_streak, 1);
        assert_eq!(updated.longest_streak, 12);
        assert!(updated.current_streak <= updated.longest_streak);
    }
}

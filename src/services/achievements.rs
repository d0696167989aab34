//! Achievement catalogue and unlock evaluation.
//!
//! The catalogue is a static, ordered rule table. Evaluation walks it in
//! order and unlocks every still-locked rule whose condition holds against
//! the latest [`UserStats`]. Unlocking is one-way.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::achievement::{Achievement, Rarity, UnlockedAchievement};
use crate::models::activity::ActivityCounts;
use crate::models::streak::StreakType;

/// Cumulative per-user metrics the rules are evaluated against.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UserStats {
    pub total_check_ins: i64,
    pub shared_check_ins: i64,
    pub gratitude_entries: i64,
    pub current_check_in_streak: i32,
    pub longest_check_in_streak: i32,
    pub longest_streaks: BTreeMap<StreakType, i32>,
    #[serde(flatten)]
    pub activity: ActivityCounts,
}

impl UserStats {
    pub fn longest_streak_of(&self, kind: StreakType) -> i32 {
        self.longest_streaks.get(&kind).copied().unwrap_or(0)
    }
}

pub struct AchievementRule {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub icon: &'static str,
    pub rarity: Rarity,
    pub points: i32,
    pub condition: fn(&UserStats) -> bool,
}

pub static RULES: &[AchievementRule] = &[
    AchievementRule {
        id: "first_check_in",
        name: "First Check-in",
        description: "Checked in for the very first time.",
        icon: "sparkles",
        rarity: Rarity::Common,
        points: 10,
        condition: |s| s.total_check_ins >= 1,
    },
    AchievementRule {
        id: "three_day_spark",
        name: "Three Day Spark",
        description: "Checked in three days in a row.",
        icon: "flame",
        rarity: Rarity::Common,
        points: 20,
        condition: |s| s.longest_check_in_streak >= 3,
    },
    AchievementRule {
        id: "week_together",
        name: "A Week Together",
        description: "Kept a seven day check-in streak.",
        icon: "calendar-heart",
        rarity: Rarity::Rare,
        points: 50,
        condition: |s| s.longest_check_in_streak >= 7,
    },
    AchievementRule {
        id: "open_book",
        name: "Open Book",
        description: "Shared ten check-ins with your partner.",
        icon: "book-open",
        rarity: Rarity::Rare,
        points: 40,
        condition: |s| s.shared_check_ins >= 10,
    },
    AchievementRule {
        id: "grateful_hearts",
        name: "Grateful Hearts",
        description: "Wrote down something you are grateful for twenty times.",
        icon: "heart-handshake",
        rarity: Rarity::Rare,
        points: 40,
        condition: |s| s.gratitude_entries >= 20,
    },
    AchievementRule {
        id: "check_ins_50",
        name: "Fifty Check-ins",
        description: "Checked in fifty times.",
        icon: "medal",
        rarity: Rarity::Rare,
        points: 60,
        condition: |s| s.total_check_ins >= 50,
    },
    AchievementRule {
        id: "task_team",
        name: "Task Team",
        description: "Completed twenty-five shared tasks.",
        icon: "list-checks",
        rarity: Rarity::Rare,
        points: 50,
        condition: |s| s.activity.tasks_completed >= 25,
    },
    AchievementRule {
        id: "love_letters",
        name: "Love Letters",
        description: "Shared ten notes.",
        icon: "mail-heart",
        rarity: Rarity::Common,
        points: 25,
        condition: |s| s.activity.notes_shared >= 10,
    },
    AchievementRule {
        id: "date_planner",
        name: "Date Planner",
        description: "Planned five events together.",
        icon: "calendar-plus",
        rarity: Rarity::Common,
        points: 25,
        condition: |s| s.activity.events_planned >= 5,
    },
    AchievementRule {
        id: "budget_buddies",
        name: "Budget Buddies",
        description: "Logged twenty finance entries.",
        icon: "piggy-bank",
        rarity: Rarity::Rare,
        points: 40,
        condition: |s| s.activity.finance_entries >= 20,
    },
    AchievementRule {
        id: "month_of_us",
        name: "A Month of Us",
        description: "Kept a thirty day check-in streak.",
        icon: "trophy",
        rarity: Rarity::Epic,
        points: 150,
        condition: |s| s.longest_check_in_streak >= 30,
    },
    AchievementRule {
        id: "check_ins_100",
        name: "Centurions",
        description: "Checked in one hundred times.",
        icon: "crown",
        rarity: Rarity::Epic,
        points: 120,
        condition: |s| s.total_check_ins >= 100,
    },
    AchievementRule {
        id: "all_rounder",
        name: "All-Rounder",
        description: "Reached a seven day streak in every area.",
        icon: "gem",
        rarity: Rarity::Epic,
        points: 200,
        condition: |s| StreakType::ALL.iter().all(|kind| s.longest_streak_of(*kind) >= 7),
    },
    AchievementRule {
        id: "year_of_love",
        name: "A Year of Love",
        description: "Kept a check-in streak for a whole year.",
        icon: "infinity",
        rarity: Rarity::Legendary,
        points: 500,
        condition: |s| s.longest_check_in_streak >= 365,
    },
];

fn locked(rule: &AchievementRule) -> Achievement {
    Achievement {
        id: rule.id,
        name: rule.name,
        description: rule.description,
        icon: rule.icon,
        rarity: rule.rarity,
        points: rule.points,
        is_unlocked: false,
        unlocked_at: None,
    }
}

/// One user's view of the catalogue.
#[derive(Debug, Clone)]
pub struct AchievementBook {
    entries: Vec<Achievement>,
}

impl AchievementBook {
    pub fn new() -> Self {
        Self {
            entries: RULES.iter().map(locked).collect(),
        }
    }

    /// Restore previously persisted unlocks. Records for ids no longer in the
    /// catalogue are ignored.
    pub fn with_unlocked(unlocked: &[UnlockedAchievement]) -> Self {
        let mut book = Self::new();
        for record in unlocked {
            if let Some(entry) = book.entries.iter_mut().find(|a| a.id == record.achievement_id) {
                entry.is_unlocked = true;
                entry.unlocked_at = Some(record.unlocked_at);
            }
        }
        book
    }

    /// Unlock every locked rule whose condition now holds, in catalogue
    /// order. Returns the newly unlocked achievements.
    pub fn evaluate(&mut self, stats: &UserStats, now: DateTime<Utc>) -> Vec<Achievement> {
        let mut newly_unlocked = Vec::new();
        for (rule, entry) in RULES.iter().zip(self.entries.iter_mut()) {
            if entry.is_unlocked {
                continue;
            }
            if (rule.condition)(stats) {
                entry.is_unlocked = true;
                entry.unlocked_at = Some(now);
                newly_unlocked.push(entry.clone());
            }
        }
        newly_unlocked
    }

    pub fn achievements(&self) -> &[Achievement] {
        &self.entries
    }

    pub fn into_achievements(self) -> Vec<Achievement> {
        self.entries
    }

    pub fn unlocked_points(&self) -> i32 {
        self.entries
            .iter()
            .filter(|a| a.is_unlocked)
            .map(|a| a.points)
            .sum()
    }
}

impl Default for AchievementBook {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::collections::HashSet;
    use uuid::Uuid;

    #[test]
    fn rule_ids_are_unique() {
        let ids: HashSet<_> = RULES.iter().map(|r| r.id).collect();
        assert_eq!(ids.len(), RULES.len());
    }

    #[test]
    fn unlocks_only_what_the_stats_satisfy() {
        let mut book = AchievementBook::new();
        let stats = UserStats {
            total_check_ins: 3,
            longest_check_in_streak: 3,
            ..Default::default()
        };
        let unlocked = book.evaluate(&stats, Utc::now());
        let ids: Vec<_> = unlocked.iter().map(|a| a.id).collect();
        assert_eq!(ids, vec!["first_check_in", "three_day_spark"]);
        assert_eq!(book.unlocked_points(), 30);
    }

    #[test]
    fn unlock_happens_at_most_once_and_never_reverts() {
        let mut book = AchievementBook::new();
        let first = Utc::now();
        let stats = UserStats {
            total_check_ins: 1,
            ..Default::default()
        };
        assert_eq!(book.evaluate(&stats, first).len(), 1);

        // Same stats again: nothing new.
        assert!(book.evaluate(&stats, first + Duration::hours(1)).is_empty());

        // Weaker stats do not re-lock.
        assert!(book.evaluate(&UserStats::default(), first + Duration::hours(2)).is_empty());
        let entry = book.achievements().iter().find(|a| a.id == "first_check_in").unwrap();
        assert!(entry.is_unlocked);
        assert_eq!(entry.unlocked_at, Some(first));
    }

    #[test]
    fn restored_unlocks_are_not_reported_again() {
        let stamp = Utc::now() - Duration::days(3);
        let records = vec![
            UnlockedAchievement {
                user_id: Uuid::new_v4(),
                achievement_id: "first_check_in".into(),
                unlocked_at: stamp,
            },
            UnlockedAchievement {
                user_id: Uuid::new_v4(),
                achievement_id: "retired_badge".into(),
                unlocked_at: stamp,
            },
        ];
        let mut book = AchievementBook::with_unlocked(&records);
        let stats = UserStats {
            total_check_ins: 1,
            ..Default::default()
        };
        assert!(book.evaluate(&stats, Utc::now()).is_empty());
        assert_eq!(book.achievements().iter().filter(|a| a.is_unlocked).count(), 1);
    }

    #[test]
    fn all_rounder_needs_every_streak_type() {
        let mut stats = UserStats::default();
        for kind in StreakType::ALL {
            stats.longest_streaks.insert(kind, 7);
        }
        stats.longest_streaks.insert(StreakType::EventPlanning, 6);
        let rule = RULES.iter().find(|r| r.id == "all_rounder").unwrap();
        assert!(!(rule.condition)(&stats));

        stats.longest_streaks.insert(StreakType::EventPlanning, 7);
        assert!((rule.condition)(&stats));
    }
}

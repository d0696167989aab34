use serde::Serialize;
use uuid::Uuid;

use crate::models::activity::ActivityCounts;

/// Points per unit of each contributing metric.
pub struct ScoreWeights {
    pub check_in: i64,
    pub task_completed: i64,
    pub note_shared: i64,
    pub event_planned: i64,
    pub finance_entry: i64,
}

pub const WEIGHTS: ScoreWeights = ScoreWeights {
    check_in: 10,
    task_completed: 5,
    note_shared: 3,
    event_planned: 4,
    finance_entry: 2,
};

/// Raw counts feeding one partner's contribution.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoreInputs {
    pub user_id: Uuid,
    pub check_ins: i64,
    pub activity: ActivityCounts,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct UserContribution {
    pub user_id: Uuid,
    pub check_ins: i64,
    pub tasks_completed: i64,
    pub notes_shared: i64,
    pub events_planned: i64,
    pub finance_entries: i64,
    pub score: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CoupleScore {
    pub total_score: i64,
    pub breakdown: Vec<UserContribution>,
}

pub fn contribution(inputs: &ScoreInputs, weights: &ScoreWeights) -> UserContribution {
    let a = &inputs.activity;
    let score = inputs.check_ins * weights.check_in
        + a.tasks_completed * weights.task_completed
        + a.notes_shared * weights.note_shared
        + a.events_planned * weights.event_planned
        + a.finance_entries * weights.finance_entry;

    UserContribution {
        user_id: inputs.user_id,
        check_ins: inputs.check_ins,
        tasks_completed: a.tasks_completed,
        notes_shared: a.notes_shared,
        events_planned: a.events_planned,
        finance_entries: a.finance_entries,
        score,
    }
}

/// Combine the caller's and (when linked) the partner's contributions.
/// Each user's data is counted exactly once.
pub fn combine(user: &ScoreInputs, partner: Option<&ScoreInputs>) -> CoupleScore {
    let breakdown: Vec<UserContribution> = std::iter::once(user)
        .chain(partner.filter(|p| p.user_id != user.user_id))
        .map(|inputs| contribution(inputs, &WEIGHTS))
        .collect();
    let total_score = breakdown.iter().map(|c| c.score).sum();

    CoupleScore {
        total_score,
        breakdown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs(check_ins: i64, tasks: i64, notes: i64) -> ScoreInputs {
        ScoreInputs {
            user_id: Uuid::new_v4(),
            check_ins,
            activity: ActivityCounts {
                tasks_completed: tasks,
                notes_shared: notes,
                ..Default::default()
            },
        }
    }

    #[test]
    fn weights_apply_per_metric() {
        let c = contribution(&inputs(2, 3, 4), &WEIGHTS);
        assert_eq!(c.score, 2 * 10 + 3 * 5 + 4 * 3);
    }

    #[test]
    fn total_is_sum_of_both_partners() {
        let me = inputs(5, 1, 0);
        let partner = inputs(3, 0, 7);
        let score = combine(&me, Some(&partner));

        let expected = contribution(&me, &WEIGHTS).score + contribution(&partner, &WEIGHTS).score;
        assert_eq!(score.total_score, expected);
        assert_eq!(score.breakdown.len(), 2);
        assert_eq!(score.breakdown[0].user_id, me.user_id);
    }

    #[test]
    fn single_user_without_partner() {
        let me = inputs(1, 0, 0);
        let score = combine(&me, None);
        assert_eq!(score.total_score, 10);
        assert_eq!(score.breakdown.len(), 1);
    }

    #[test]
    fn self_as_partner_is_not_double_counted() {
        let me = inputs(4, 0, 0);
        let score = combine(&me, Some(&me));
        assert_eq!(score.total_score, 40);
    }
}

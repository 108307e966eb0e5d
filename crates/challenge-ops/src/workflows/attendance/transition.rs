use chrono::{Duration, NaiveDate};

use super::domain::{ParticipantStanding, ParticipantState};
use super::policy::PolicyConfig;

/// Weekly state machine: active → revival_pending → rest.
///
/// Rest is terminal here; only a manual reset leaves it. A standing that has
/// already been evaluated for the week (or a later one) is returned unchanged.
pub struct StatusTransitionEvaluator<'a> {
    policy: &'a PolicyConfig,
}

impl<'a> StatusTransitionEvaluator<'a> {
    pub fn new(policy: &'a PolicyConfig) -> Self {
        Self { policy }
    }

    pub fn evaluate(
        &self,
        standing: &ParticipantStanding,
        week_start: NaiveDate,
        weekly_morning: u8,
        weekly_daily: u8,
    ) -> ParticipantStanding {
        if standing.evaluated(week_start) {
            return standing.clone();
        }

        let boundary = week_start + Duration::days(7);
        let mut next = standing.clone();
        next.last_evaluated_week = Some(week_start);

        match standing.state {
            ParticipantState::Active => {
                if self.policy.demotes(weekly_morning, weekly_daily) {
                    next.state = ParticipantState::RevivalPending;
                    next.revival_started_on = Some(boundary);
                }
            }
            ParticipantState::RevivalPending => {
                let started = standing.revival_started_on.unwrap_or(week_start);
                let elapsed = (boundary - started).num_days();

                if self.policy.revives(weekly_morning, weekly_daily) {
                    next.state = ParticipantState::Active;
                    next.revival_started_on = None;
                } else if elapsed >= i64::from(self.policy.revival_deadline_days) {
                    next.state = ParticipantState::Rest;
                    next.revival_started_on = None;
                    next.rest_since = Some(boundary);
                    next.rest_until = Some(
                        boundary + Duration::days(i64::from(self.policy.rest_transition_days)),
                    );
                }
            }
            ParticipantState::Rest => {}
        }

        next
    }
}

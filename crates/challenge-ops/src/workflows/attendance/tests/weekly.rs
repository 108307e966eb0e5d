use chrono::{Duration, NaiveDate};
use std::collections::BTreeSet;

use super::common::*;
use crate::workflows::attendance::aggregator::WeeklyAggregator;
use crate::workflows::attendance::classifier::VerificationClassifier;
use crate::workflows::attendance::domain::{
    CheckInEvent, ClassifiedVerification, DayMark, ParticipantStanding, ParticipantState,
};
use crate::workflows::attendance::policy::{DemotionMode, PolicyConfig};
use crate::workflows::attendance::streak::StreakCalculator;
use crate::workflows::attendance::transition::StatusTransitionEvaluator;

fn classify_all(events: &[CheckInEvent]) -> Vec<ClassifiedVerification> {
    let policy = policy();
    let classifier = VerificationClassifier::new(&policy);
    events.iter().map(|event| classifier.classify_event(event)).collect()
}

fn standing() -> ParticipantStanding {
    ParticipantStanding::new(challenge(), participant("bob"))
}

#[test]
fn repeated_check_ins_in_one_slot_count_once() {
    let monday = date(2025, 10, 13);
    let verifications = classify_all(&[
        event("a-1", "alice", monday, 6, 0),
        event("a-2", "alice", monday, 8, 30),
        event("a-3", "alice", monday, 10, 15),
        event("a-4", "alice", monday, 19, 0),
        event("a-5", "alice", monday, 14, 0),
    ]);

    let tally = WeeklyAggregator::new(monday).aggregate(&verifications);
    assert_eq!(tally.week_start, week());
    assert_eq!(tally.morning_count, 1);
    assert_eq!(tally.daily_count, 1);
    assert_eq!(tally.grid.days[1].morning, DayMark::Normal);
    assert_eq!(tally.grid.days[1].daily, DayMark::Normal);
    assert!(!tally.grid.days[0].any());
}

#[test]
fn late_marks_show_in_the_grid_and_still_count() {
    let verifications = classify_all(&[
        event("a-1", "alice", date(2025, 10, 14), 10, 30),
        event("a-2", "alice", date(2025, 10, 15), 0, 20),
    ]);

    let tally = WeeklyAggregator::new(week()).aggregate(&verifications);
    assert_eq!(tally.grid.days[2].morning, DayMark::Late);
    assert_eq!(tally.grid.days[2].daily, DayMark::Late);
    assert_eq!(tally.total(), 2);
}

#[test]
fn aggregation_is_idempotent_and_ignores_other_weeks() {
    let verifications = classify_all(&[
        event("a-1", "alice", date(2025, 10, 12), 7, 0),
        event("a-2", "alice", date(2025, 10, 18), 21, 0),
        event("a-3", "alice", date(2025, 10, 19), 7, 0),
        event("a-4", "alice", date(2025, 10, 11), 7, 0),
    ]);
    let aggregator = WeeklyAggregator::new(week());

    let first = aggregator.aggregate(&verifications);
    let doubled: Vec<&ClassifiedVerification> =
        verifications.iter().chain(verifications.iter()).collect();
    let second = aggregator.aggregate(doubled);

    assert_eq!(first, second);
    assert_eq!(first.morning_count, 1);
    assert_eq!(first.daily_count, 1);
}

#[test]
fn groups_tallies_by_participant() {
    let verifications = classify_all(&[
        event("a-1", "alice", date(2025, 10, 13), 7, 0),
        event("b-1", "bob", date(2025, 10, 13), 18, 0),
        event("b-2", "bob", date(2025, 10, 14), 18, 0),
    ]);

    let tallies = WeeklyAggregator::new(week()).aggregate_by_participant(&verifications);
    assert_eq!(tallies.len(), 2);
    assert_eq!(tallies[&participant("alice")].morning_count, 1);
    assert_eq!(tallies[&participant("bob")].daily_count, 2);
}

#[test]
fn active_participant_below_total_is_demoted() {
    let policy = policy();
    let next = StatusTransitionEvaluator::new(&policy).evaluate(&standing(), week(), 1, 1);

    assert_eq!(next.state, ParticipantState::RevivalPending);
    assert_eq!(next.revival_started_on, Some(date(2025, 10, 19)));
    assert_eq!(next.last_evaluated_week, Some(week()));
}

#[test]
fn shortfall_is_ignored_while_the_reset_room_is_off() {
    let policy = PolicyConfig {
        demotion_enabled: false,
        ..policy()
    };
    let next = StatusTransitionEvaluator::new(&policy).evaluate(&standing(), week(), 0, 0);

    assert_eq!(next.state, ParticipantState::Active);
    assert_eq!(next.revival_started_on, None);
    assert_eq!(next.last_evaluated_week, Some(week()));
}

#[test]
fn separate_mode_demotes_on_a_single_weak_slot() {
    let policy = PolicyConfig {
        demotion_mode: DemotionMode::Separate,
        ..policy()
    };
    let evaluator = StatusTransitionEvaluator::new(&policy);

    assert_eq!(
        evaluator.evaluate(&standing(), week(), 7, 2).state,
        ParticipantState::RevivalPending
    );
    assert_eq!(
        evaluator.evaluate(&standing(), week(), 3, 3).state,
        ParticipantState::Active
    );
}

#[test]
fn revival_succeeds_when_both_minimums_are_met() {
    let policy = policy();
    let evaluator = StatusTransitionEvaluator::new(&policy);
    let demoted = evaluator.evaluate(&standing(), week(), 0, 0);

    let revived = evaluator.evaluate(&demoted, date(2025, 10, 19), 3, 3);
    assert_eq!(revived.state, ParticipantState::Active);
    assert_eq!(revived.revival_started_on, None);
}

#[test]
fn revival_pending_moves_to_rest_once_the_deadline_passes() {
    let policy = policy();
    let evaluator = StatusTransitionEvaluator::new(&policy);
    let demoted = evaluator.evaluate(&standing(), week(), 0, 0);

    let first_try = evaluator.evaluate(&demoted, date(2025, 10, 19), 3, 1);
    assert_eq!(first_try.state, ParticipantState::RevivalPending);
    assert_eq!(first_try.revival_started_on, Some(date(2025, 10, 19)));

    let second_try = evaluator.evaluate(&first_try, date(2025, 10, 26), 2, 2);
    assert_eq!(second_try.state, ParticipantState::Rest);
    assert_eq!(second_try.rest_since, Some(date(2025, 11, 2)));
    assert_eq!(second_try.rest_until, Some(date(2025, 11, 16)));
    assert_eq!(second_try.revival_started_on, None);
}

#[test]
fn rest_is_terminal_for_weekly_evaluation() {
    let policy = policy();
    let mut resting = standing();
    resting.state = ParticipantState::Rest;

    let next = StatusTransitionEvaluator::new(&policy).evaluate(&resting, week(), 7, 7);
    assert_eq!(next.state, ParticipantState::Rest);
}

#[test]
fn evaluating_the_same_week_twice_changes_nothing() {
    let policy = policy();
    let evaluator = StatusTransitionEvaluator::new(&policy);
    let once = evaluator.evaluate(&standing(), week(), 1, 1);
    let twice = evaluator.evaluate(&once, week(), 1, 1);

    assert_eq!(once, twice);
    assert_eq!(
        evaluator.evaluate(&once, week() - Duration::days(7), 0, 0),
        once
    );
}

#[test]
fn streak_counts_the_trailing_run_only() {
    let history = [true, true, true, false, true];
    assert_eq!(StreakCalculator::current(&history), 1);
    assert_eq!(StreakCalculator::longest(&history), 3);
    assert!(StreakCalculator::badges(StreakCalculator::current(&history)).is_empty());
}

#[test]
fn streak_grows_by_one_or_resets() {
    let mut history = vec![true, false, true, true];
    let before = StreakCalculator::current(&history);

    history.push(true);
    assert_eq!(StreakCalculator::current(&history), before + 1);

    history.push(false);
    assert_eq!(StreakCalculator::current(&history), 0);
}

#[test]
fn badges_accumulate_up_to_the_streak() {
    let thresholds: Vec<u32> = StreakCalculator::badges(7)
        .iter()
        .map(|badge| badge.threshold_days)
        .collect();
    assert_eq!(thresholds, vec![3, 5, 7]);
    assert_eq!(
        StreakCalculator::highest_badge(12).map(|badge| badge.threshold_days),
        Some(10)
    );
    assert_eq!(StreakCalculator::highest_badge(2), None);
}

#[test]
fn daily_history_spans_the_inclusive_range() {
    let verified: BTreeSet<NaiveDate> =
        [date(2025, 10, 13), date(2025, 10, 14)].into_iter().collect();
    let history = StreakCalculator::daily_history(week(), date(2025, 10, 14), &verified);
    assert_eq!(history, vec![false, true, true]);
}

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeSet;

/// Consecutive-day badge shown next to a participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Badge {
    pub threshold_days: u32,
    pub emoji: &'static str,
    pub label: &'static str,
}

pub const BADGE_CATALOG: [Badge; 4] = [
    Badge {
        threshold_days: 3,
        emoji: "🌱",
        label: "3-day streak",
    },
    Badge {
        threshold_days: 5,
        emoji: "❤️‍🔥",
        label: "5-day streak",
    },
    Badge {
        threshold_days: 7,
        emoji: "👑",
        label: "7-day streak",
    },
    Badge {
        threshold_days: 10,
        emoji: "🤴🏻",
        label: "10-day streak",
    },
];

pub struct StreakCalculator;

impl StreakCalculator {
    /// Length of the trailing run of verified days.
    pub fn current(history: &[bool]) -> u32 {
        history.iter().rev().take_while(|verified| **verified).count() as u32
    }

    pub fn longest(history: &[bool]) -> u32 {
        let mut best = 0;
        let mut run = 0;
        for verified in history {
            run = if *verified { run + 1 } else { 0 };
            best = best.max(run);
        }
        best
    }

    /// Daily history over `from..=to` given the set of days with a counted check-in.
    pub fn daily_history(
        from: NaiveDate,
        to: NaiveDate,
        verified: &BTreeSet<NaiveDate>,
    ) -> Vec<bool> {
        from.iter_days()
            .take_while(|day| *day <= to)
            .map(|day| verified.contains(&day))
            .collect()
    }

    /// Every catalog badge whose threshold the streak reaches.
    pub fn badges(streak_days: u32) -> Vec<Badge> {
        BADGE_CATALOG
            .iter()
            .filter(|badge| badge.threshold_days <= streak_days)
            .copied()
            .collect()
    }

    pub fn highest_badge(streak_days: u32) -> Option<Badge> {
        Self::badges(streak_days).into_iter().last()
    }
}

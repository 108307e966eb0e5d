use crate::infra::{local_attendance_service, parse_date, parse_instant, LocalAttendanceService};
use challenge_ops::config::{AppConfig, AttendanceSettings};
use challenge_ops::error::AppError;
use challenge_ops::workflows::attendance::{
    calendar, AttendanceServiceError, ChallengeId, ChannelKind, ChannelRequest, CheckInImporter, CheckInSubmission,
    DailyOverview, DayMark, ParticipantId, PageRequest, PolicyConfig, SlotStatus,
    WeeklyBatchRecord, WeeklyStatusView,
};
use chrono::{DateTime, Duration, Local, NaiveDate, NaiveTime, Utc};
use clap::Args;
use std::collections::BTreeSet;
use std::path::PathBuf;

const DAY_LABELS: [&str; 7] = ["Su", "Mo", "Tu", "We", "Th", "Fr", "Sa"];

#[derive(Args, Debug)]
pub(crate) struct EvaluateArgs {
    /// Challenge policy as JSON
    #[arg(long)]
    pub(crate) policy: PathBuf,
    /// Check-in export (participant_id,timestamp,raw_tag[,id])
    #[arg(long)]
    pub(crate) check_ins: PathBuf,
    /// Any day of the first week to evaluate (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    pub(crate) week_start: NaiveDate,
    /// Number of consecutive weeks to evaluate
    #[arg(long, default_value_t = 1)]
    pub(crate) weeks: u32,
    /// Evaluation instant (RFC 3339). Defaults to now.
    #[arg(long, value_parser = parse_instant)]
    pub(crate) now: Option<DateTime<Utc>>,
    /// Only report these participants (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub(crate) participants: Vec<String>,
    /// Print weekly statuses as JSON instead of a table
    #[arg(long)]
    pub(crate) json: bool,
}

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// First Sunday of the three demo weeks. Defaults to three weeks ago.
    #[arg(long, value_parser = parse_date)]
    pub(crate) week_start: Option<NaiveDate>,
    /// Skip the daily overview at the end of the demo.
    #[arg(long)]
    pub(crate) skip_overview: bool,
}

pub(crate) fn run_evaluate(args: EvaluateArgs) -> Result<(), AppError> {
    let EvaluateArgs {
        policy,
        check_ins,
        week_start,
        weeks,
        now,
        participants,
        json,
    } = args;

    let settings = AppConfig::load()?.attendance;
    let policy: PolicyConfig = serde_json::from_str(&std::fs::read_to_string(policy)?)?;
    let challenge_id = policy.challenge_id.clone();

    let (service, _) = local_attendance_service(settings);
    service.save_policy(policy)?;

    let events = CheckInImporter::from_path(&check_ins, &challenge_id)?;
    let summary = service.import_check_ins(&challenge_id, events)?;
    println!(
        "Imported {} check-ins for {} ({} duplicates skipped)",
        summary.imported, challenge_id, summary.duplicates
    );

    let now = now.unwrap_or_else(Utc::now);
    let first_week = calendar::week_start(week_start);
    for offset in 0..weeks {
        let week = first_week + Duration::weeks(i64::from(offset));
        let batch = service.run_weekly_batch(&challenge_id, week, now)?;
        let mut statuses = all_statuses(&service, &challenge_id, week)?;
        if !participants.is_empty() {
            statuses.retain(|status| participants.contains(&status.participant_id.0));
        }

        if json {
            println!("{}", serde_json::to_string_pretty(&statuses)?);
        } else {
            render_week(&batch, &statuses);
        }
    }

    Ok(())
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        week_start,
        skip_overview,
    } = args;

    let first_week = week_start
        .map(calendar::week_start)
        .unwrap_or_else(|| calendar::week_start(Local::now().date_naive()) - Duration::weeks(3));
    let challenge_id = ChallengeId("demo-morning-club".to_string());
    let policy = demo_policy(challenge_id.clone());
    let settings = AttendanceSettings::default();

    println!("Challenge attendance demo");
    println!(
        "- Morning {:02}-{:02}h (late until {:02}h) | daily {:02}-{:02}h (late until {:02}h)",
        policy.morning_start_hour,
        policy.morning_end_hour,
        policy.morning_late_hour,
        policy.daily_start_hour,
        policy.daily_end_hour,
        policy.daily_late_hour
    );
    println!(
        "- Demotion below {} verifications a week | revival needs {} morning + {} daily within {} days",
        policy.min_weekly_total,
        policy.min_weekly_morning,
        policy.min_weekly_daily,
        policy.revival_deadline_days
    );

    let (service, platform) = local_attendance_service(settings);
    service.save_policy(policy.clone())?;

    let channel = service
        .channels()
        .ensure_channel(&challenge_id, &demo_channel_request())
        .map_err(AttendanceServiceError::from)?;
    let members: BTreeSet<String> = ["alice", "bob", "carol"]
        .iter()
        .map(|name| name.to_string())
        .collect();
    service
        .channels()
        .sync_members(&challenge_id, &members)
        .map_err(AttendanceServiceError::from)?;
    println!("- Channel {} provisioned for {} members", channel.channel_id, members.len());

    for submission in demo_submissions(&policy, first_week) {
        service.record_check_in(&challenge_id, submission)?;
    }

    let last_week = first_week + Duration::weeks(2);
    let closes_at = settings.cutover.closes_at(last_week) + Duration::hours(1);
    let now = calendar::to_utc(closes_at, policy.offset());

    for offset in 0..3 {
        let week = first_week + Duration::weeks(offset);
        let batch = service.run_weekly_batch(&challenge_id, week, now)?;
        let statuses = all_statuses(&service, &challenge_id, week)?;
        render_week(&batch, &statuses);
    }

    if !skip_overview {
        let day = calendar::week_end(last_week);
        let overview = service.daily_overview(&challenge_id, day, now)?;
        render_overview(&overview);
    }

    let reset = service.reset_participant(&challenge_id, &ParticipantId("carol".to_string()))?;
    println!("\nAdmin reset: carol -> {}", reset.state.label());

    println!("\nChat platform calls");
    for operation in platform.operations() {
        println!("  - {operation}");
    }

    Ok(())
}

fn all_statuses(
    service: &LocalAttendanceService,
    challenge_id: &ChallengeId,
    week: NaiveDate,
) -> Result<Vec<WeeklyStatusView>, AppError> {
    let mut statuses = Vec::new();
    let mut page = 1;
    loop {
        let batch = service.weekly_statuses(
            challenge_id,
            week,
            PageRequest::new(page, PageRequest::MAX_PER_PAGE),
        )?;
        let total_pages = batch.total_pages;
        statuses.extend(batch.items);
        if page >= total_pages {
            break;
        }
        page += 1;
    }
    Ok(statuses)
}

fn render_week(batch: &WeeklyBatchRecord, statuses: &[WeeklyStatusView]) {
    println!(
        "\nWeek of {} ({} participants, {} state changes)",
        batch.week_start,
        batch.participants,
        batch.transitions.len()
    );
    println!("  {:<12} {}  M/D  streak  state", "participant", DAY_LABELS.join(" "));
    for status in statuses {
        let cells: Vec<String> = status
            .grid
            .days
            .iter()
            .map(|cells| format!("{}{}", mark_symbol(cells.morning), mark_symbol(cells.daily)))
            .collect();
        let badges: String = status.badges.iter().map(|badge| badge.emoji).collect();
        let state = if status.state_before == status.state {
            status.state.to_string()
        } else {
            format!("{} -> {}", status.state_before, status.state)
        };
        println!(
            "  {:<12} {}  {}/{}  {:>6}  {} {}",
            status.participant_id,
            cells.join(" "),
            status.weekly_morning_count,
            status.weekly_daily_count,
            status.streak_days,
            state,
            badges
        );
    }
}

fn render_overview(overview: &DailyOverview) {
    println!(
        "\nDaily overview for {} | morning {:.0}% | daily {:.0}% | overall {:.0}%",
        overview.day,
        overview.morning_rate * 100.0,
        overview.daily_rate * 100.0,
        overview.overall_rate * 100.0
    );
    for row in &overview.rows {
        println!(
            "  - {}: morning {} | daily {} | streak {} (best {})",
            row.participant_id,
            slot_label(row.morning),
            slot_label(row.daily),
            row.streak_days,
            row.longest_streak_days
        );
    }
}

fn mark_symbol(mark: DayMark) -> char {
    match mark {
        DayMark::Normal => 'O',
        DayMark::Late => 'L',
        DayMark::Missing => '.',
    }
}

fn slot_label(status: SlotStatus) -> &'static str {
    match status {
        SlotStatus::Done => "done",
        SlotStatus::Late => "late",
        SlotStatus::Waiting => "waiting",
        SlotStatus::Missed => "missed",
    }
}

fn demo_policy(challenge_id: ChallengeId) -> PolicyConfig {
    PolicyConfig {
        demotion_enabled: true,
        ..PolicyConfig::standard(challenge_id)
    }
}

fn demo_channel_request() -> ChannelRequest {
    ChannelRequest {
        name: "demo-morning-club".to_string(),
        guild_id: "demo-guild".to_string(),
        category_id: None,
        kind: ChannelKind::Text,
        is_private: false,
    }
}

/// Three weeks of check-ins: alice is steady, bob slips and recovers, carol
/// drifts into rest.
fn demo_submissions(policy: &PolicyConfig, first_week: NaiveDate) -> Vec<CheckInSubmission> {
    let offset = policy.offset();
    let tag = policy.required_tag.clone().unwrap_or_default();
    let mut submissions = Vec::new();
    let mut push = |who: &str, day: NaiveDate, hour: i64, minute: i64| {
        let local = day.and_time(NaiveTime::MIN) + Duration::hours(hour) + Duration::minutes(minute);
        submissions.push(CheckInSubmission {
            id: None,
            participant_id: ParticipantId(who.to_string()),
            timestamp: calendar::to_utc(local, offset),
            raw_tag: tag.clone(),
        });
    };

    for index in 0..21 {
        let day = first_week + Duration::days(index);

        push("alice", day, 6, 40);
        if index % 7 != 5 {
            push("alice", day, 21, 15);
        }

        match index {
            0..=6 => {
                if index % 2 == 0 {
                    push("bob", day, 8, 50);
                }
                if index % 3 == 0 {
                    push("bob", day, 22, 30);
                }
            }
            8 => push("bob", day, 10, 20),
            14..=20 => {
                push("bob", day, 7, 30);
                if index <= 17 {
                    // Counts for the previous evening.
                    push("bob", day + Duration::days(1), 0, 30);
                }
            }
            _ => {}
        }

        if index == 1 {
            push("carol", day, 9, 0);
        }
    }

    submissions
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_weeks_cover_every_state() {
        let first_week = NaiveDate::from_ymd_opt(2025, 10, 12).expect("valid date");
        let policy = demo_policy(ChallengeId("demo-morning-club".to_string()));
        let (service, _) = local_attendance_service(AttendanceSettings::default());
        service.save_policy(policy.clone()).expect("policy saved");
        for submission in demo_submissions(&policy, first_week) {
            service
                .record_check_in(&policy.challenge_id, submission)
                .expect("check-in stored");
        }

        let now = calendar::to_utc(
            AttendanceSettings::default()
                .cutover
                .closes_at(first_week + Duration::weeks(2)),
            policy.offset(),
        );
        let mut transitions = Vec::new();
        for offset in 0..3 {
            let batch = service
                .run_weekly_batch(&policy.challenge_id, first_week + Duration::weeks(offset), now)
                .expect("week evaluates");
            transitions.extend(
                batch
                    .transitions
                    .into_iter()
                    .map(|change| (change.participant_id.0, change.to.label())),
            );
        }

        assert_eq!(
            transitions,
            vec![
                ("bob".to_string(), "revival_pending"),
                ("carol".to_string(), "revival_pending"),
                ("bob".to_string(), "active"),
                ("carol".to_string(), "rest"),
            ]
        );
    }
}

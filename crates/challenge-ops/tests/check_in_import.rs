use challenge_ops::workflows::attendance::{
    ChallengeId, CheckInImportError, CheckInImporter, Classification, PolicyConfig,
    VerificationClassifier,
};

fn challenge() -> ChallengeId {
    ChallengeId("morning-club".to_string())
}

#[test]
fn importer_reads_the_sample_export() {
    let data = include_bytes!("../check_ins_sample.csv");
    let events = CheckInImporter::from_reader(&data[..], &challenge()).expect("sample imports");

    assert_eq!(events.len(), 42);
    assert_eq!(events[0].id.0, "morning-club-alice-20251011T221000.000Z");
    assert!(events.iter().all(|event| event.challenge_id == challenge()));

    let carol = events
        .iter()
        .find(|event| event.id.0 == "discord-991")
        .expect("explicit id kept");
    assert_eq!(carol.participant_id.0, "carol");
}

#[test]
fn imported_events_classify_against_the_standard_policy() {
    let data = include_bytes!("../check_ins_sample.csv");
    let events = CheckInImporter::from_reader(&data[..], &challenge()).expect("sample imports");
    let policy = PolicyConfig::standard(challenge());
    let classifier = VerificationClassifier::new(&policy);

    let rejected: Vec<String> = events
        .iter()
        .map(|event| (event, classifier.classify_event(event)))
        .filter(|(_, verification)| verification.classification == Classification::Rejected)
        .map(|(event, _)| event.participant_id.0.clone())
        .collect();
    assert_eq!(rejected, vec!["bob".to_string(), "carol".to_string()]);

    let after_midnight = events
        .iter()
        .map(|event| classifier.classify_event(event))
        .find(|verification| verification.classification == Classification::DailyLate)
        .expect("bob's late daily check-in");
    assert_eq!(after_midnight.service_day.to_string(), "2025-10-14");
}

#[test]
fn fallback_ids_follow_the_row_not_its_position() {
    let original = "participant_id,timestamp,raw_tag\n\
                    alice,2025-10-13T07:00:00+09:00,#인증\n";
    let refreshed = "participant_id,timestamp,raw_tag\n\
                     bob,2025-10-13T06:30:00+09:00,#인증\n\
                     alice,2025-10-13T07:00:00+09:00,#인증 edited\n";

    let before = CheckInImporter::from_reader(original.as_bytes(), &challenge()).expect("parses");
    let after = CheckInImporter::from_reader(refreshed.as_bytes(), &challenge()).expect("parses");

    assert_eq!(before[0].id, after[1].id);
    assert_ne!(after[0].id, after[1].id);
}

#[test]
fn importer_surfaces_missing_columns() {
    let csv = "participant_id,raw_tag\nalice,#인증\n";
    assert!(matches!(
        CheckInImporter::from_reader(csv.as_bytes(), &challenge()),
        Err(CheckInImportError::Csv(_))
    ));
}

#[test]
fn importer_reports_unreadable_paths() {
    assert!(matches!(
        CheckInImporter::from_path("does-not-exist.csv", &challenge()),
        Err(CheckInImportError::Io(_))
    ));
}

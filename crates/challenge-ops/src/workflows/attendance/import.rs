use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};
use std::io::Read;
use std::path::Path;

use super::domain::{ChallengeId, CheckInEvent, CheckInId, ParticipantId};

#[derive(Debug, thiserror::Error)]
pub enum CheckInImportError {
    #[error("failed to read check-in export: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid check-in CSV data: {0}")]
    Csv(#[from] csv::Error),
    #[error("row {row}: '{value}' is not an RFC 3339 timestamp")]
    InvalidTimestamp { row: usize, value: String },
    #[error("row {row}: participant_id is blank")]
    MissingParticipant { row: usize },
}

/// Loads check-in exports (`participant_id,timestamp,raw_tag[,id]`) for one challenge.
pub struct CheckInImporter;

impl CheckInImporter {
    pub fn from_path<P: AsRef<Path>>(
        path: P,
        challenge_id: &ChallengeId,
    ) -> Result<Vec<CheckInEvent>, CheckInImportError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file, challenge_id)
    }

    pub fn from_reader<R: Read>(
        reader: R,
        challenge_id: &ChallengeId,
    ) -> Result<Vec<CheckInEvent>, CheckInImportError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        let mut events = Vec::new();

        for (index, record) in csv_reader.deserialize::<CheckInRow>().enumerate() {
            let row = record?;
            // Header is line 1.
            let line = index + 2;

            if row.participant_id.is_empty() {
                return Err(CheckInImportError::MissingParticipant { row: line });
            }

            let timestamp = DateTime::parse_from_rfc3339(&row.timestamp)
                .map(|parsed| parsed.with_timezone(&Utc))
                .map_err(|_| CheckInImportError::InvalidTimestamp {
                    row: line,
                    value: row.timestamp.clone(),
                })?;

            let participant_id = ParticipantId(row.participant_id);
            let id = row
                .id
                .map(CheckInId)
                .unwrap_or_else(|| CheckInId::derived(challenge_id, &participant_id, timestamp));

            events.push(CheckInEvent {
                id,
                participant_id,
                challenge_id: challenge_id.clone(),
                timestamp,
                raw_tag: row.raw_tag.unwrap_or_default(),
            });
        }

        Ok(events)
    }
}

#[derive(Debug, Deserialize)]
struct CheckInRow {
    participant_id: String,
    timestamp: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    raw_tag: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    id: Option<String>,
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.filter(|value| !value.trim().is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn challenge() -> ChallengeId {
        ChallengeId("morning-club".to_string())
    }

    #[test]
    fn parses_rows_and_generates_missing_ids() {
        let csv = "participant_id,timestamp,raw_tag,id\n\
                   alice,2025-10-13T21:30:00Z,#인증 done,\n\
                   bob, 2025-10-14T09:00:00+09:00 ,,ext-7\n";
        let events = CheckInImporter::from_reader(Cursor::new(csv), &challenge())
            .expect("export parses");

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].id.0, "morning-club-import-00002");
        assert_eq!(events[0].raw_tag, "#인증 done");
        assert_eq!(events[1].id.0, "ext-7");
        assert_eq!(events[1].raw_tag, "");
        assert_eq!(events[1].timestamp.to_rfc3339(), "2025-10-14T00:00:00+00:00");
    }

    #[test]
    fn reports_row_of_bad_timestamp() {
        let csv = "participant_id,timestamp,raw_tag\nalice,yesterday,#인증\n";
        match CheckInImporter::from_reader(Cursor::new(csv), &challenge()) {
            Err(CheckInImportError::InvalidTimestamp { row, value }) => {
                assert_eq!(row, 2);
                assert_eq!(value, "yesterday");
            }
            other => panic!("expected timestamp error, got {other:?}"),
        }
    }

    #[test]
    fn rejects_blank_participant() {
        let csv = "participant_id,timestamp,raw_tag\n,2025-10-13T21:30:00Z,#인증\n";
        assert!(matches!(
            CheckInImporter::from_reader(Cursor::new(csv), &challenge()),
            Err(CheckInImportError::MissingParticipant { row: 2 })
        ));
    }
}

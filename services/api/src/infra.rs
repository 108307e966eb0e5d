use challenge_ops::config::AttendanceSettings;
use challenge_ops::workflows::attendance::{
    AttendanceService, ChannelRequest, ChatError, ChatPlatform, GuildCategory, GuildMember,
    InMemoryAttendanceStore,
};
use chrono::{DateTime, NaiveDate, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) type LocalAttendanceService =
    AttendanceService<InMemoryAttendanceStore, LoggingChatPlatform>;

/// Chat platform stand-in for local runs: channel operations are logged and
/// remembered, never sent anywhere.
#[derive(Default)]
pub(crate) struct LoggingChatPlatform {
    next_channel: AtomicU64,
    operations: Mutex<Vec<String>>,
}

impl LoggingChatPlatform {
    fn record(&self, operation: String) {
        info!(operation = %operation, "chat platform call");
        if let Ok(mut guard) = self.operations.lock() {
            guard.push(operation);
        }
    }

    pub(crate) fn operations(&self) -> Vec<String> {
        self.operations
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

impl ChatPlatform for LoggingChatPlatform {
    fn create_channel(&self, request: &ChannelRequest) -> Result<String, ChatError> {
        let id = self.next_channel.fetch_add(1, Ordering::Relaxed) + 1;
        self.record(format!("create {} in {}", request.name, request.guild_id));
        Ok(format!("local-{id}"))
    }

    fn delete_channel(&self, channel_id: &str) -> Result<(), ChatError> {
        self.record(format!("delete {channel_id}"));
        Ok(())
    }

    fn add_member(&self, channel_id: &str, member_id: &str) -> Result<(), ChatError> {
        self.record(format!("add {member_id} to {channel_id}"));
        Ok(())
    }

    fn remove_member(&self, channel_id: &str, member_id: &str) -> Result<(), ChatError> {
        self.record(format!("remove {member_id} from {channel_id}"));
        Ok(())
    }

    fn list_categories(&self, _guild_id: &str) -> Result<Vec<GuildCategory>, ChatError> {
        Ok(Vec::new())
    }

    fn list_members(&self, _guild_id: &str) -> Result<Vec<GuildMember>, ChatError> {
        Ok(Vec::new())
    }
}

pub(crate) fn local_attendance_service(
    settings: AttendanceSettings,
) -> (LocalAttendanceService, Arc<LoggingChatPlatform>) {
    let platform = Arc::new(LoggingChatPlatform::default());
    let service = AttendanceService::new(
        Arc::new(InMemoryAttendanceStore::default()),
        platform.clone(),
        settings,
    );
    (service, platform)
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

pub(crate) fn parse_instant(raw: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|err| format!("failed to parse '{raw}' as an RFC 3339 timestamp ({err})"))
}

pub(crate) fn deserialize_date<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_date(&raw).map_err(serde::de::Error::custom)
}

pub(crate) fn deserialize_optional_instant<'de, D>(
    deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    opt.map(|value| parse_instant(&value).map_err(serde::de::Error::custom))
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use challenge_ops::workflows::attendance::ChannelKind;

    #[test]
    fn logging_platform_remembers_operations() {
        let platform = LoggingChatPlatform::default();
        let request = ChannelRequest {
            name: "morning-club".to_string(),
            guild_id: "guild-1".to_string(),
            category_id: None,
            kind: ChannelKind::Text,
            is_private: false,
        };

        let channel = platform.create_channel(&request).expect("channel created");
        platform
            .add_member(&channel, "alice")
            .expect("member added");

        assert_eq!(channel, "local-1");
        assert_eq!(
            platform.operations(),
            vec![
                "create morning-club in guild-1".to_string(),
                "add alice to local-1".to_string(),
            ]
        );
    }

    #[test]
    fn parses_offset_timestamps_into_utc() {
        let instant = parse_instant("2025-10-20T05:00:00+09:00").expect("valid timestamp");
        assert_eq!(instant.to_rfc3339(), "2025-10-19T20:00:00+00:00");
        assert!(parse_date("20/10/2025").is_err());
    }
}

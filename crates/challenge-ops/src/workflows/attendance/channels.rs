//! Channel and membership synchronisation with the chat platform.
//!
//! Chat failures surface as [`ChatError`] and stay in this module's failure
//! domain: nothing here reads or writes attendance standings or statuses.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, warn};

use super::domain::ChallengeId;
use super::repository::StoreError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    #[default]
    Text,
    Voice,
}

/// Parameters for creating a challenge channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRequest {
    pub name: String,
    pub guild_id: String,
    #[serde(default)]
    pub category_id: Option<String>,
    #[serde(default)]
    pub kind: ChannelKind,
    #[serde(default)]
    pub is_private: bool,
}

/// Channel bound to a challenge together with its known members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRecord {
    pub challenge_id: ChallengeId,
    pub channel_id: String,
    pub name: String,
    pub guild_id: String,
    pub category_id: Option<String>,
    pub is_private: bool,
    pub members: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildCategory {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildMember {
    pub id: String,
    pub display_name: String,
}

/// Outbound contract with the chat platform.
pub trait ChatPlatform: Send + Sync {
    /// Returns the platform's channel id.
    fn create_channel(&self, request: &ChannelRequest) -> Result<String, ChatError>;
    fn delete_channel(&self, channel_id: &str) -> Result<(), ChatError>;
    fn add_member(&self, channel_id: &str, member_id: &str) -> Result<(), ChatError>;
    fn remove_member(&self, channel_id: &str, member_id: &str) -> Result<(), ChatError>;
    fn list_categories(&self, guild_id: &str) -> Result<Vec<GuildCategory>, ChatError>;
    fn list_members(&self, guild_id: &str) -> Result<Vec<GuildMember>, ChatError>;
}

/// Chat platform failure carrying a machine-readable code.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChatError {
    #[error("chat platform rejected the request ({code}): {message}")]
    Rejected { code: String, message: String },
    #[error("chat platform unavailable: {0}")]
    Transport(String),
}

impl ChatError {
    pub fn code(&self) -> &str {
        match self {
            ChatError::Rejected { code, .. } => code,
            ChatError::Transport(_) => "transport",
        }
    }
}

/// Storage for channel records (the `channels` / `channel_members` collections).
pub trait ChannelDirectory: Send + Sync {
    fn channel_for(&self, challenge_id: &ChallengeId) -> Result<Option<ChannelRecord>, StoreError>;
    fn save_channel(&self, record: ChannelRecord) -> Result<(), StoreError>;
    fn remove_channel(&self, challenge_id: &ChallengeId)
        -> Result<Option<ChannelRecord>, StoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ChannelSyncError {
    #[error(transparent)]
    Chat(#[from] ChatError),
    #[error(transparent)]
    Directory(#[from] StoreError),
    #[error("no channel provisioned for challenge {0}")]
    NotProvisioned(ChallengeId),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MembershipChange {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

pub struct ChannelSync<P, D> {
    platform: Arc<P>,
    directory: Arc<D>,
}

impl<P, D> ChannelSync<P, D>
where
    P: ChatPlatform,
    D: ChannelDirectory,
{
    pub fn new(platform: Arc<P>, directory: Arc<D>) -> Self {
        Self {
            platform,
            directory,
        }
    }

    pub fn channel_exists(&self, challenge_id: &ChallengeId) -> Result<bool, ChannelSyncError> {
        Ok(self.directory.channel_for(challenge_id)?.is_some())
    }

    /// Create the challenge channel unless one is already recorded.
    pub fn ensure_channel(
        &self,
        challenge_id: &ChallengeId,
        request: &ChannelRequest,
    ) -> Result<ChannelRecord, ChannelSyncError> {
        if let Some(existing) = self.directory.channel_for(challenge_id)? {
            return Ok(existing);
        }

        let channel_id = self.platform.create_channel(request)?;
        let record = ChannelRecord {
            challenge_id: challenge_id.clone(),
            channel_id,
            name: request.name.clone(),
            guild_id: request.guild_id.clone(),
            category_id: request.category_id.clone(),
            is_private: request.is_private,
            members: BTreeSet::new(),
        };
        self.directory.save_channel(record.clone())?;

        info!(challenge_id = %challenge_id, channel_id = %record.channel_id, "challenge channel created");
        Ok(record)
    }

    /// Add missing members and remove extra ones. Progress made before a
    /// platform failure is recorded before the error is returned.
    pub fn sync_members(
        &self,
        challenge_id: &ChallengeId,
        desired: &BTreeSet<String>,
    ) -> Result<MembershipChange, ChannelSyncError> {
        let mut record = self
            .directory
            .channel_for(challenge_id)?
            .ok_or_else(|| ChannelSyncError::NotProvisioned(challenge_id.clone()))?;

        let to_add: Vec<String> = desired.difference(&record.members).cloned().collect();
        let to_remove: Vec<String> = record.members.difference(desired).cloned().collect();
        let mut change = MembershipChange::default();

        let outcome = (|| -> Result<(), ChatError> {
            for member in &to_add {
                self.platform.add_member(&record.channel_id, member)?;
                record.members.insert(member.clone());
                change.added.push(member.clone());
            }
            for member in &to_remove {
                self.platform.remove_member(&record.channel_id, member)?;
                record.members.remove(member);
                change.removed.push(member.clone());
            }
            Ok(())
        })();

        self.directory.save_channel(record)?;

        match outcome {
            Ok(()) => Ok(change),
            Err(err) => {
                warn!(challenge_id = %challenge_id, code = err.code(), error = %err, "membership sync interrupted");
                Err(err.into())
            }
        }
    }

    /// Delete the platform channel and forget the record. A missing record is
    /// not an error.
    pub fn teardown(&self, challenge_id: &ChallengeId) -> Result<(), ChannelSyncError> {
        let Some(record) = self.directory.channel_for(challenge_id)? else {
            return Ok(());
        };
        self.platform.delete_channel(&record.channel_id)?;
        self.directory.remove_channel(challenge_id)?;
        Ok(())
    }

    pub fn categories(&self, guild_id: &str) -> Result<Vec<GuildCategory>, ChannelSyncError> {
        Ok(self.platform.list_categories(guild_id)?)
    }

    pub fn guild_members(&self, guild_id: &str) -> Result<Vec<GuildMember>, ChannelSyncError> {
        Ok(self.platform.list_members(guild_id)?)
    }
}

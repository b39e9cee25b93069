use async_trait::async_trait;
use std::path::Path;

/// Author capabilities in the originating channel. Any one of these makes
/// the author privileged for moderation purposes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Permissions {
    pub manage_messages: bool,
    pub kick_members: bool,
    pub ban_members: bool,
    pub administrator: bool,
}

impl Permissions {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn moderator() -> Self {
        Permissions {
            manage_messages: true,
            ..Self::default()
        }
    }

    pub fn is_moderator(&self) -> bool {
        self.manage_messages || self.kick_members || self.ban_members || self.administrator
    }
}

#[derive(Debug, Clone)]
pub struct Author {
    pub id: u64,
    pub name: String,
    /// Bots and other automated accounts are never moderated.
    pub is_automated: bool,
}

#[derive(Debug, Clone)]
pub struct ChannelRef {
    pub id: u64,
    pub guild: String,
    pub name: String,
    /// Owner of the parent guild, used as the notification fallback.
    pub owner_id: Option<u64>,
}

impl ChannelRef {
    /// Composite "guild/channel" identifier used in logs and events.
    pub fn qualified_name(&self) -> String {
        format!("{}/{}", self.guild, self.name)
    }
}

#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub id: u64,
    pub author: Author,
    pub channel: ChannelRef,
    pub content: String,
    pub is_direct: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("insufficient permission: {0}")]
    PermissionDenied(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("network error: {0}")]
    Network(String),
}

/// Surface the chat platform exposes to the moderator. The platform's own
/// event loop delivers `InboundMessage`s and owns connection lifecycle;
/// hosts implement this trait over their platform SDK.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// The bot's own user id, so its messages can be skipped.
    fn self_id(&self) -> u64;

    async fn delete_message(&self, channel_id: u64, message_id: u64) -> Result<(), PlatformError>;

    async fn send_channel_message(&self, channel_id: u64, text: &str) -> Result<(), PlatformError>;

    async fn send_direct_message(&self, user_id: u64, text: &str) -> Result<(), PlatformError>;

    async fn send_channel_file(&self, channel_id: u64, path: &Path) -> Result<(), PlatformError>;

    async fn send_direct_file(
        &self,
        user_id: u64,
        path: &Path,
        note: &str,
    ) -> Result<(), PlatformError>;

    /// Permission set of `user_id` scoped to `channel_id`. Callers treat a
    /// failed lookup as "no permissions".
    async fn permissions(&self, channel_id: u64, user_id: u64) -> Result<Permissions, PlatformError>;
}

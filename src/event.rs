use chrono::Utc;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionTaken {
    Flagged,
    Deleted,
}

impl std::fmt::Display for ActionTaken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionTaken::Flagged => write!(f, "flagged"),
            ActionTaken::Deleted => write!(f, "deleted"),
        }
    }
}

/// Durable record of one actioned message. Created by the orchestrator at
/// decision time and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModerationEvent {
    /// RFC-3339 wall-clock time; non-decreasing in append order on a
    /// best-effort basis only.
    pub timestamp: String,
    pub action: ActionTaken,
    pub user: String,
    pub user_id: u64,
    /// Composite "guild/channel" identifier.
    pub channel: String,
    pub label: String,
    pub confidence: f64,
    #[serde(default)]
    pub content: String,
}

impl ModerationEvent {
    pub fn new(
        action: ActionTaken,
        user: &str,
        user_id: u64,
        channel: &str,
        label: &str,
        confidence: f64,
        content: &str,
    ) -> Self {
        ModerationEvent {
            timestamp: Utc::now().to_rfc3339(),
            action,
            user: user.to_string(),
            user_id,
            channel: channel.to_string(),
            label: label.to_string(),
            confidence,
            content: content.to_string(),
        }
    }

    /// Field checks applied at the logger boundary; callers are not trusted
    /// to hand over well-formed records.
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(0.0..=1.0).contains(&self.confidence) || !self.confidence.is_finite() {
            anyhow::bail!("confidence {} outside [0.0, 1.0]", self.confidence);
        }
        if self.user.is_empty() {
            anyhow::bail!("empty user");
        }
        if self.label.is_empty() {
            anyhow::bail!("empty label");
        }
        if self.timestamp.is_empty() {
            anyhow::bail!("empty timestamp");
        }
        Ok(())
    }

    /// One-line rendering for the rolling text log.
    pub fn log_line(&self) -> String {
        let content = self.content.replace(['\n', '\r'], " ");
        format!(
            "{} [{}] {} ({}) {} label={} confidence={:.2} content={}",
            self.timestamp,
            self.action.to_string().to_uppercase(),
            self.user,
            self.user_id,
            self.channel,
            self.label,
            self.confidence,
            content
        )
    }
}

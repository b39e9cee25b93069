use serde::{Deserialize, Serialize};

/// Graduated response to a classified message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyAction {
    Allow,
    Flag,
    Delete,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// At or above this confidence the message is removed outright.
    pub delete_threshold: f64,
    /// At or above this confidence moderators are notified.
    pub flag_threshold: f64,
}

impl PolicyConfig {
    /// Maps a confidence score and the author's privilege to an action.
    ///
    /// Privilege exempts an author from deletion only; flagging applies to
    /// everyone above the flag threshold, so a privileged author's message
    /// still reaches the moderator channel.
    pub fn decide(&self, confidence: f64, is_privileged: bool) -> PolicyAction {
        if confidence >= self.delete_threshold && !is_privileged {
            PolicyAction::Delete
        } else if confidence >= self.flag_threshold {
            PolicyAction::Flag
        } else {
            PolicyAction::Allow
        }
    }
}

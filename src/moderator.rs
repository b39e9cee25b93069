use crate::classifier::{ClassifierService, Prediction};
use crate::config::Config;
use crate::event::{ActionTaken, ModerationEvent};
use crate::event_log::EventLogger;
use crate::platform::{ChatPlatform, InboundMessage, Permissions, PlatformError};
use crate::policy::{PolicyAction, PolicyConfig};
use std::sync::Arc;

/// Terminal state of one message's moderation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModerationOutcome {
    /// Own/automated author, direct message, or empty content.
    Skipped,
    Allowed,
    Flagged,
    Deleted,
    /// An internal failure stopped the pass without restrictive action.
    FailedOpen,
}

/// Message-handling entry point: classifies inbound messages, executes the
/// decided action, and keeps the event log and dashboard up to date. The
/// platform host calls [`Moderator::process`] for every delivered message.
pub struct Moderator {
    classifier: Arc<ClassifierService>,
    policy: PolicyConfig,
    logger: EventLogger,
    warn_dm_text: String,
    mod_channel_id: Option<u64>,
    command_prefix: String,
}

impl Moderator {
    pub fn new(classifier: Arc<ClassifierService>, logger: EventLogger, config: &Config) -> Self {
        Moderator {
            classifier,
            policy: config.policy.clone(),
            logger,
            warn_dm_text: config.warn_dm_text.clone(),
            mod_channel_id: config.mod_channel_id,
            command_prefix: config.command_prefix.clone(),
        }
    }

    pub fn logger(&self) -> &EventLogger {
        &self.logger
    }

    /// Runs the moderation pass and then the command pass for one inbound
    /// message. The two passes are independent: an aborted or failed
    /// moderation pass never suppresses command handling.
    pub async fn process(
        &self,
        platform: &dyn ChatPlatform,
        message: &InboundMessage,
    ) -> ModerationOutcome {
        if message.author.id == platform.self_id() || message.author.is_automated {
            return ModerationOutcome::Skipped;
        }
        if message.is_direct {
            return ModerationOutcome::Skipped;
        }

        let outcome = self.moderate(platform, message).await;
        self.dispatch_command(platform, message).await;
        outcome
    }

    async fn moderate(
        &self,
        platform: &dyn ChatPlatform,
        message: &InboundMessage,
    ) -> ModerationOutcome {
        if message.content.trim().is_empty() {
            return ModerationOutcome::Skipped;
        }

        let prediction = match self.classifier.classify(&message.content) {
            Ok(prediction) => prediction,
            Err(e) => {
                // Fail open: a broken classifier must not punish anyone.
                log::error!("Prediction failed for message {}: {e}", message.id);
                return ModerationOutcome::FailedOpen;
            }
        };
        log::debug!(
            "Message {} classified as {} (p={:.3})",
            message.id,
            prediction.label,
            prediction.confidence
        );

        let is_privileged = self
            .author_permissions(platform, message)
            .await
            .is_moderator();

        match self.policy.decide(prediction.confidence, is_privileged) {
            PolicyAction::Allow => ModerationOutcome::Allowed,
            PolicyAction::Flag => {
                self.notify_moderators(platform, message, &prediction, ActionTaken::Flagged)
                    .await;
                self.log_event(message, &prediction, ActionTaken::Flagged);
                ModerationOutcome::Flagged
            }
            PolicyAction::Delete => self.execute_delete(platform, message, &prediction).await,
        }
    }

    async fn execute_delete(
        &self,
        platform: &dyn ChatPlatform,
        message: &InboundMessage,
        prediction: &Prediction,
    ) -> ModerationOutcome {
        if let Err(e) = platform.delete_message(message.channel.id, message.id).await {
            match e {
                PlatformError::PermissionDenied(_) => {
                    log::warn!(
                        "Lacking permission to delete message {} in {}",
                        message.id,
                        message.channel.qualified_name()
                    );
                }
                other => log::error!("Failed to delete message {}: {other}", message.id),
            }
            return ModerationOutcome::FailedOpen;
        }

        // Best-effort warning; the author may have DMs disabled.
        if let Err(e) = platform
            .send_direct_message(message.author.id, &self.warn_dm_text)
            .await
        {
            log::debug!("Could not warn {} privately: {e}", message.author.name);
        }

        self.notify_moderators(platform, message, prediction, ActionTaken::Deleted)
            .await;
        self.log_event(message, prediction, ActionTaken::Deleted);
        ModerationOutcome::Deleted
    }

    /// Permission lookup that fails closed: if the platform cannot answer,
    /// the author is treated as unprivileged.
    async fn author_permissions(
        &self,
        platform: &dyn ChatPlatform,
        message: &InboundMessage,
    ) -> Permissions {
        match platform
            .permissions(message.channel.id, message.author.id)
            .await
        {
            Ok(permissions) => permissions,
            Err(e) => {
                log::warn!(
                    "Permission lookup failed for {} in {}: {e}",
                    message.author.name,
                    message.channel.qualified_name()
                );
                Permissions::none()
            }
        }
    }

    /// Best-effort by design: moderation already succeeded by the time this
    /// runs, so delivery problems are only logged.
    async fn notify_moderators(
        &self,
        platform: &dyn ChatPlatform,
        message: &InboundMessage,
        prediction: &Prediction,
        action: ActionTaken,
    ) {
        let summary = format!(
            "PRISM {} - {} (p={:.2})\nAuthor: {} ({})\nChannel: #{}\nMessage preview: {}",
            action.to_string().to_uppercase(),
            prediction.label,
            prediction.confidence,
            message.author.name,
            message.author.id,
            message.channel.name,
            preview(&message.content, 300),
        );

        if let Some(channel_id) = self.mod_channel_id {
            match platform.send_channel_message(channel_id, &summary).await {
                Ok(()) => return,
                Err(e) => log::warn!("Failed to notify moderator channel {channel_id}: {e}"),
            }
        }

        if let Some(owner_id) = message.channel.owner_id {
            if platform.send_direct_message(owner_id, &summary).await.is_ok() {
                return;
            }
        }
        log::warn!("Could not notify moderators or the guild owner");
    }

    fn log_event(&self, message: &InboundMessage, prediction: &Prediction, action: ActionTaken) {
        let event = ModerationEvent::new(
            action,
            &message.author.name,
            message.author.id,
            &message.channel.qualified_name(),
            &prediction.label,
            prediction.confidence,
            &message.content,
        );
        self.logger.record(&event);
    }

    async fn dispatch_command(&self, platform: &dyn ChatPlatform, message: &InboundMessage) {
        let content = message.content.trim();
        let Some(rest) = content.strip_prefix(&self.command_prefix) else {
            return;
        };
        let mut parts = rest.split_whitespace();
        match parts.next() {
            Some("history") => {
                let n = parts
                    .next()
                    .and_then(|value| value.parse::<usize>().ok())
                    .unwrap_or(5);
                self.handle_history(platform, message, n).await;
            }
            Some("dashboard") => self.handle_dashboard(platform, message).await,
            _ => {}
        }
    }

    /// Gate for the read-only moderator commands. Fails closed like the
    /// moderation pass.
    async fn invoker_may_manage(
        &self,
        platform: &dyn ChatPlatform,
        message: &InboundMessage,
    ) -> bool {
        self.author_permissions(platform, message)
            .await
            .manage_messages
    }

    async fn handle_history(
        &self,
        platform: &dyn ChatPlatform,
        message: &InboundMessage,
        n: usize,
    ) {
        if !self.invoker_may_manage(platform, message).await {
            self.reply(platform, message, "You don't have permission to use this command.")
                .await;
            return;
        }

        let lines = match self.logger.tail(n) {
            Ok(lines) => lines,
            Err(e) => {
                log::warn!("Failed to read the moderation log: {e}");
                self.reply(platform, message, "Failed to read the moderation log.")
                    .await;
                return;
            }
        };
        if lines.is_empty() {
            self.reply(platform, message, "No moderation events logged yet.")
                .await;
            return;
        }

        let body = format!(
            "Last {} moderation events:\n\n{}",
            lines.len(),
            lines.join("\n\n")
        );
        match platform.send_direct_message(message.author.id, &body).await {
            Ok(()) => {
                let ack = format!(
                    "<@{}> I have sent you the last {} events.",
                    message.author.id,
                    lines.len()
                );
                self.reply(platform, message, &ack).await;
            }
            // Private delivery failed; post in the channel instead.
            Err(_) => self.reply(platform, message, &body).await,
        }
    }

    async fn handle_dashboard(&self, platform: &dyn ChatPlatform, message: &InboundMessage) {
        if !self.invoker_may_manage(platform, message).await {
            self.reply(platform, message, "You don't have permission to use this command.")
                .await;
            return;
        }

        let path = self.logger.dashboard_path();
        if !path.exists() {
            self.reply(
                platform,
                message,
                "No dashboard generated yet (no flagged or deleted messages logged).",
            )
            .await;
            return;
        }

        match platform
            .send_direct_file(
                message.author.id,
                path,
                "Here is the latest moderation dashboard:",
            )
            .await
        {
            Ok(()) => {
                let ack = format!(
                    "<@{}> I have sent you the current moderation dashboard.",
                    message.author.id
                );
                self.reply(platform, message, &ack).await;
            }
            Err(_) => {
                if let Err(e) = platform.send_channel_file(message.channel.id, path).await {
                    log::warn!("Failed to deliver the dashboard: {e}");
                }
            }
        }
    }

    async fn reply(&self, platform: &dyn ChatPlatform, message: &InboundMessage, text: &str) {
        if let Err(e) = platform
            .send_channel_message(message.channel.id, text)
            .await
        {
            log::debug!("Failed to reply in {}: {e}", message.channel.qualified_name());
        }
    }
}

fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        text.chars().take(max_chars).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::ModelArtifact;
    use crate::platform::{Author, ChannelRef};
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::Mutex;

    const BOT_ID: u64 = 1;
    const MOD_CHANNEL: u64 = 99;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Delete { channel: u64, message: u64 },
        ChannelMessage { channel: u64, text: String },
        DirectMessage { user: u64, text: String },
        ChannelFile { channel: u64 },
        DirectFile { user: u64 },
    }

    #[derive(Default)]
    struct MockPlatform {
        permissions: HashMap<u64, Permissions>,
        deny_delete: bool,
        fail_direct_messages: bool,
        fail_permission_lookup: bool,
        calls: Mutex<Vec<Call>>,
    }

    impl MockPlatform {
        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: Call) {
            self.calls.lock().unwrap().push(call);
        }
    }

    #[async_trait::async_trait]
    impl ChatPlatform for MockPlatform {
        fn self_id(&self) -> u64 {
            BOT_ID
        }

        async fn delete_message(
            &self,
            channel: u64,
            message: u64,
        ) -> Result<(), PlatformError> {
            if self.deny_delete {
                return Err(PlatformError::PermissionDenied(
                    "missing manage messages".to_string(),
                ));
            }
            self.record(Call::Delete { channel, message });
            Ok(())
        }

        async fn send_channel_message(
            &self,
            channel: u64,
            text: &str,
        ) -> Result<(), PlatformError> {
            self.record(Call::ChannelMessage {
                channel,
                text: text.to_string(),
            });
            Ok(())
        }

        async fn send_direct_message(&self, user: u64, text: &str) -> Result<(), PlatformError> {
            if self.fail_direct_messages {
                return Err(PlatformError::Network("dms disabled".to_string()));
            }
            self.record(Call::DirectMessage {
                user,
                text: text.to_string(),
            });
            Ok(())
        }

        async fn send_channel_file(
            &self,
            channel: u64,
            _path: &Path,
        ) -> Result<(), PlatformError> {
            self.record(Call::ChannelFile { channel });
            Ok(())
        }

        async fn send_direct_file(
            &self,
            user: u64,
            _path: &Path,
            _note: &str,
        ) -> Result<(), PlatformError> {
            if self.fail_direct_messages {
                return Err(PlatformError::Network("dms disabled".to_string()));
            }
            self.record(Call::DirectFile { user });
            Ok(())
        }

        async fn permissions(
            &self,
            _channel: u64,
            user: u64,
        ) -> Result<Permissions, PlatformError> {
            if self.fail_permission_lookup {
                return Err(PlatformError::Network("lookup failed".to_string()));
            }
            Ok(self.permissions.get(&user).copied().unwrap_or_default())
        }
    }

    fn message(author_id: u64, content: &str) -> InboundMessage {
        InboundMessage {
            id: 555,
            author: Author {
                id: author_id,
                name: format!("user{author_id}"),
                is_automated: false,
            },
            channel: ChannelRef {
                id: 10,
                guild: "testguild".to_string(),
                name: "general".to_string(),
                owner_id: Some(2),
            },
            content: content.to_string(),
            is_direct: false,
        }
    }

    fn moderator(dir: &Path) -> Moderator {
        let mut config = Config::default();
        config.mod_channel_id = Some(MOD_CHANNEL);
        let classifier =
            Arc::new(ClassifierService::from_artifact(ModelArtifact::demo()).unwrap());
        let logger = EventLogger::new(dir, config.retention_cap).unwrap();
        Moderator::new(classifier, logger, &config)
    }

    fn failing_classifier() -> Arc<ClassifierService> {
        // An intercept that is never finite forces a prediction error on
        // every call while still passing artifact validation.
        Arc::new(
            ClassifierService::from_artifact(ModelArtifact {
                classes: vec!["normal".to_string(), "toxic".to_string()],
                ngram_range: (1, 1),
                vocabulary: HashMap::from([("x".to_string(), 0)]),
                idf: vec![1.0],
                coefficients: vec![vec![0.0]],
                intercepts: vec![f64::NAN],
            })
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn deletes_warns_notifies_and_logs() {
        let dir = tempfile::tempdir().unwrap();
        let moderator = moderator(dir.path());
        let platform = MockPlatform::default();
        let msg = message(5, "you are worthless and should quit");

        let outcome = moderator.process(&platform, &msg).await;
        assert_eq!(outcome, ModerationOutcome::Deleted);

        let calls = platform.calls();
        assert!(calls.contains(&Call::Delete {
            channel: 10,
            message: 555
        }));
        assert!(calls.iter().any(|c| matches!(
            c,
            Call::DirectMessage { user: 5, .. }
        )));
        assert!(calls.iter().any(|c| matches!(
            c,
            Call::ChannelMessage { channel: MOD_CHANNEL, text } if text.contains("DELETED")
        )));

        let events = moderator.logger().load_events().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action, ActionTaken::Deleted);
        assert_eq!(events[0].label, "bullying");
        assert_eq!(events[0].channel, "testguild/general");

        let html = std::fs::read_to_string(moderator.logger().dashboard_path()).unwrap();
        assert!(html.contains("you are worthless and should quit"));
    }

    #[tokio::test]
    async fn privileged_author_is_flagged_not_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let moderator = moderator(dir.path());
        let mut platform = MockPlatform::default();
        platform.permissions.insert(
            5,
            Permissions {
                administrator: true,
                ..Permissions::none()
            },
        );
        let msg = message(5, "you are worthless and should quit");

        let outcome = moderator.process(&platform, &msg).await;
        assert_eq!(outcome, ModerationOutcome::Flagged);

        let calls = platform.calls();
        assert!(!calls.iter().any(|c| matches!(c, Call::Delete { .. })));
        assert!(calls.iter().any(|c| matches!(
            c,
            Call::ChannelMessage { channel: MOD_CHANNEL, text } if text.contains("FLAGGED")
        )));

        let events = moderator.logger().load_events().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action, ActionTaken::Flagged);
    }

    #[tokio::test]
    async fn flags_between_thresholds_without_deleting() {
        let dir = tempfile::tempdir().unwrap();
        let moderator = moderator(dir.path());
        let platform = MockPlatform::default();

        let outcome = moderator
            .process(&platform, &message(6, "free stuff for everyone"))
            .await;
        assert_eq!(outcome, ModerationOutcome::Flagged);

        let calls = platform.calls();
        assert!(!calls.iter().any(|c| matches!(c, Call::Delete { .. })));
        assert!(!calls
            .iter()
            .any(|c| matches!(c, Call::DirectMessage { .. })));
    }

    #[tokio::test]
    async fn allows_low_confidence_without_side_effects() {
        let dir = tempfile::tempdir().unwrap();
        let moderator = moderator(dir.path());
        let platform = MockPlatform::default();

        let outcome = moderator
            .process(&platform, &message(6, "lorem ipsum dolor"))
            .await;
        assert_eq!(outcome, ModerationOutcome::Allowed);
        assert!(platform.calls().is_empty());
        assert!(moderator.logger().load_events().unwrap().is_empty());
    }

    #[tokio::test]
    async fn skips_own_automated_and_direct_messages() {
        let dir = tempfile::tempdir().unwrap();
        let moderator = moderator(dir.path());
        let platform = MockPlatform::default();

        let own = message(BOT_ID, "you are worthless and should quit");
        assert_eq!(
            moderator.process(&platform, &own).await,
            ModerationOutcome::Skipped
        );

        let mut bot = message(7, "you are worthless and should quit");
        bot.author.is_automated = true;
        assert_eq!(
            moderator.process(&platform, &bot).await,
            ModerationOutcome::Skipped
        );

        let mut direct = message(7, "you are worthless and should quit");
        direct.is_direct = true;
        assert_eq!(
            moderator.process(&platform, &direct).await,
            ModerationOutcome::Skipped
        );

        assert!(platform.calls().is_empty());
    }

    #[tokio::test]
    async fn prediction_failure_fails_open_but_commands_still_run() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.mod_channel_id = Some(MOD_CHANNEL);
        let logger = EventLogger::new(dir.path(), config.retention_cap).unwrap();
        let moderator = Moderator::new(failing_classifier(), logger, &config);

        let mut platform = MockPlatform::default();
        platform.permissions.insert(5, Permissions::moderator());

        let outcome = moderator.process(&platform, &message(5, "!history")).await;
        assert_eq!(outcome, ModerationOutcome::FailedOpen);

        // No moderation side effects, no logged event.
        assert!(moderator.logger().load_events().unwrap().is_empty());
        // The command pass still answered.
        assert!(platform.calls().iter().any(|c| matches!(
            c,
            Call::ChannelMessage { text, .. } if text.contains("No moderation events logged yet")
        )));
    }

    #[tokio::test]
    async fn delete_without_bot_permission_takes_no_further_action() {
        let dir = tempfile::tempdir().unwrap();
        let moderator = moderator(dir.path());
        let platform = MockPlatform {
            deny_delete: true,
            ..MockPlatform::default()
        };

        let outcome = moderator
            .process(&platform, &message(5, "you are worthless and should quit"))
            .await;
        assert_eq!(outcome, ModerationOutcome::FailedOpen);
        assert!(platform.calls().is_empty());
        assert!(moderator.logger().load_events().unwrap().is_empty());
    }

    #[tokio::test]
    async fn permission_lookup_failure_treats_author_as_unprivileged() {
        let dir = tempfile::tempdir().unwrap();
        let moderator = moderator(dir.path());
        let mut platform = MockPlatform::default();
        // Even a configured administrator fails closed when the lookup errors.
        platform.permissions.insert(5, Permissions {
            administrator: true,
            ..Permissions::none()
        });
        platform.fail_permission_lookup = true;

        let outcome = moderator
            .process(&platform, &message(5, "you are worthless and should quit"))
            .await;
        assert_eq!(outcome, ModerationOutcome::Deleted);
    }

    #[tokio::test]
    async fn command_without_permission_is_politely_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let moderator = moderator(dir.path());
        let platform = MockPlatform::default();

        moderator.process(&platform, &message(6, "!dashboard")).await;

        let calls = platform.calls();
        assert!(calls.iter().any(|c| matches!(
            c,
            Call::ChannelMessage { text, .. }
                if text.contains("You don't have permission")
        )));
        assert!(!calls.iter().any(|c| matches!(c, Call::DirectFile { .. })));
    }

    #[tokio::test]
    async fn history_command_delivers_privately_with_public_ack() {
        let dir = tempfile::tempdir().unwrap();
        let moderator = moderator(dir.path());
        let platform = MockPlatform::default();

        // Seed one flagged event, then ask for history as a moderator.
        moderator
            .process(&platform, &message(6, "free stuff for everyone"))
            .await;

        let mut mod_platform = MockPlatform::default();
        mod_platform.permissions.insert(8, Permissions::moderator());
        moderator
            .process(&mod_platform, &message(8, "!history 3"))
            .await;

        let calls = mod_platform.calls();
        assert!(calls.iter().any(|c| matches!(
            c,
            Call::DirectMessage { user: 8, text } if text.contains("Last 1 moderation events")
        )));
        assert!(calls.iter().any(|c| matches!(
            c,
            Call::ChannelMessage { channel: 10, text } if text.contains("<@8>")
        )));
    }

    #[tokio::test]
    async fn history_falls_back_to_public_when_dm_fails() {
        let dir = tempfile::tempdir().unwrap();
        let moderator = moderator(dir.path());

        let seed_platform = MockPlatform::default();
        moderator
            .process(&seed_platform, &message(6, "free stuff for everyone"))
            .await;

        let mut platform = MockPlatform::default();
        platform.permissions.insert(8, Permissions::moderator());
        platform.fail_direct_messages = true;
        moderator.process(&platform, &message(8, "!history")).await;

        assert!(platform.calls().iter().any(|c| matches!(
            c,
            Call::ChannelMessage { channel: 10, text }
                if text.contains("Last 1 moderation events")
        )));
    }

    #[tokio::test]
    async fn dashboard_command_sends_the_current_document() {
        let dir = tempfile::tempdir().unwrap();
        let moderator = moderator(dir.path());
        let platform = MockPlatform::default();

        moderator
            .process(&platform, &message(6, "free stuff for everyone"))
            .await;

        let mut mod_platform = MockPlatform::default();
        mod_platform.permissions.insert(8, Permissions::moderator());
        moderator
            .process(&mod_platform, &message(8, "!dashboard"))
            .await;

        let calls = mod_platform.calls();
        assert!(calls.contains(&Call::DirectFile { user: 8 }));
        assert!(calls.iter().any(|c| matches!(
            c,
            Call::ChannelMessage { text, .. } if text.contains("dashboard")
        )));
    }

    #[tokio::test]
    async fn dashboard_command_reports_missing_document() {
        let dir = tempfile::tempdir().unwrap();
        let moderator = moderator(dir.path());
        let mut platform = MockPlatform::default();
        platform.permissions.insert(8, Permissions::moderator());

        moderator.process(&platform, &message(8, "!dashboard")).await;

        assert!(platform.calls().iter().any(|c| matches!(
            c,
            Call::ChannelMessage { text, .. } if text.contains("No dashboard generated yet")
        )));
    }

    #[tokio::test]
    async fn notification_falls_back_to_guild_owner() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.mod_channel_id = None;
        let classifier =
            Arc::new(ClassifierService::from_artifact(ModelArtifact::demo()).unwrap());
        let logger = EventLogger::new(dir.path(), config.retention_cap).unwrap();
        let moderator = Moderator::new(classifier, logger, &config);
        let platform = MockPlatform::default();

        let outcome = moderator
            .process(&platform, &message(6, "free stuff for everyone"))
            .await;
        assert_eq!(outcome, ModerationOutcome::Flagged);

        // The summary went to the guild owner (user 2) as a direct message.
        assert!(platform.calls().iter().any(|c| matches!(
            c,
            Call::DirectMessage { user: 2, text } if text.contains("FLAGGED")
        )));
    }

    #[tokio::test]
    async fn empty_content_is_skipped_without_commands() {
        let dir = tempfile::tempdir().unwrap();
        let moderator = moderator(dir.path());
        let platform = MockPlatform::default();

        let outcome = moderator.process(&platform, &message(6, "   ")).await;
        assert_eq!(outcome, ModerationOutcome::Skipped);
        assert!(platform.calls().is_empty());
    }
}

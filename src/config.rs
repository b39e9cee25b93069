use crate::policy::PolicyConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the trained classifier artifact (JSON pipeline).
    pub model_path: String,
    /// Directory holding the rolling log, the event history and the dashboard.
    pub data_dir: String,
    /// Channel that receives moderator notifications. None falls back to
    /// messaging the guild owner directly.
    pub mod_channel_id: Option<u64>,
    pub command_prefix: String,
    /// Warning sent privately to an author whose message was deleted.
    pub warn_dm_text: String,
    /// Maximum number of events kept in the history document.
    pub retention_cap: usize,
    pub policy: PolicyConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            model_path: "model/classifier.json".to_string(),
            data_dir: "data".to_string(),
            mod_channel_id: None,
            command_prefix: "!".to_string(),
            warn_dm_text: "Your message was removed because it appears to violate the \
                           community guidelines. Please keep the discussion respectful."
                .to_string(),
            retention_cap: 1000,
            policy: PolicyConfig {
                delete_threshold: 0.9,
                flag_threshold: 0.6,
            },
        }
    }
}

impl Config {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_file(&self, path: &str) -> anyhow::Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let p = &self.policy;
        if !(0.0..=1.0).contains(&p.flag_threshold) || !(0.0..=1.0).contains(&p.delete_threshold) {
            anyhow::bail!(
                "thresholds must lie in [0.0, 1.0] (got flag={}, delete={})",
                p.flag_threshold,
                p.delete_threshold
            );
        }
        if p.delete_threshold <= p.flag_threshold {
            anyhow::bail!(
                "delete_threshold ({}) must be greater than flag_threshold ({})",
                p.delete_threshold,
                p.flag_threshold
            );
        }
        if self.retention_cap == 0 {
            anyhow::bail!("retention_cap must be at least 1");
        }
        if self.command_prefix.is_empty() {
            anyhow::bail!("command_prefix must not be empty");
        }
        Ok(())
    }
}

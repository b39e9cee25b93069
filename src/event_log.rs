use crate::dashboard;
use crate::event::ModerationEvent;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub const LOG_FILE_NAME: &str = "moderation.log";
pub const EVENTS_FILE_NAME: &str = "events.json";
pub const DASHBOARD_FILE_NAME: &str = "dashboard.html";

/// On-disk shape of the event history document.
#[derive(Debug, Default, Serialize, Deserialize)]
struct EventHistory {
    events: Vec<ModerationEvent>,
}

/// Owns the persisted moderation record: the capped JSON history, the
/// rolling text log, and the regenerated dashboard next to them.
///
/// Single-writer by design. The internal mutex serializes the
/// read-modify-write within this process; nothing guards against a second
/// process writing the same files.
pub struct EventLogger {
    events_path: PathBuf,
    log_path: PathBuf,
    dashboard_path: PathBuf,
    retention_cap: usize,
    write_lock: Mutex<()>,
}

impl EventLogger {
    pub fn new(data_dir: &Path, retention_cap: usize) -> anyhow::Result<Self> {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;
        Ok(EventLogger {
            events_path: data_dir.join(EVENTS_FILE_NAME),
            log_path: data_dir.join(LOG_FILE_NAME),
            dashboard_path: data_dir.join(DASHBOARD_FILE_NAME),
            retention_cap,
            write_lock: Mutex::new(()),
        })
    }

    pub fn events_path(&self) -> &Path {
        &self.events_path
    }

    pub fn dashboard_path(&self) -> &Path {
        &self.dashboard_path
    }

    /// Records one event. Never raises: moderation must not fail because
    /// bookkeeping did, so every internal error lands in the operational
    /// log instead of the caller.
    pub fn record(&self, event: &ModerationEvent) {
        if let Err(e) = event.validate() {
            log::error!("Discarding invalid moderation event: {e}");
            return;
        }

        let _guard = match self.write_lock.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        match self.append_history(event) {
            Ok(events) => {
                if let Err(e) = dashboard::write_to(&self.dashboard_path, &events) {
                    log::error!("Failed to regenerate dashboard: {e}");
                }
            }
            Err(e) => log::error!("Failed to update event history: {e}"),
        }

        if let Err(e) = self.append_log_line(event) {
            log::error!("Failed to append to moderation log: {e}");
        }
    }

    /// Full stored history, oldest first. Missing file reads as empty.
    pub fn load_events(&self) -> anyhow::Result<Vec<ModerationEvent>> {
        if !self.events_path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&self.events_path)
            .with_context(|| format!("failed to read {}", self.events_path.display()))?;
        let history: EventHistory = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse {}", self.events_path.display()))?;
        Ok(history.events)
    }

    /// Last `n` lines of the rolling log, oldest of the tail first.
    pub fn tail(&self, n: usize) -> anyhow::Result<Vec<String>> {
        if !self.log_path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&self.log_path)?;
        let lines: Vec<&str> = content.lines().filter(|l| !l.trim().is_empty()).collect();
        let start = lines.len().saturating_sub(n);
        Ok(lines[start..].iter().map(|l| l.to_string()).collect())
    }

    /// Read-modify-write of the history document: append, evict oldest
    /// beyond the cap, write via temp file + rename so a crash mid-write
    /// cannot leave a torn document behind.
    fn append_history(&self, event: &ModerationEvent) -> anyhow::Result<Vec<ModerationEvent>> {
        let mut events = self.load_events()?;
        events.push(event.clone());
        if events.len() > self.retention_cap {
            let excess = events.len() - self.retention_cap;
            events.drain(..excess);
        }

        let history = EventHistory { events };
        let serialized = serde_json::to_string_pretty(&history)?;
        let tmp_path = self.events_path.with_extension("json.tmp");
        std::fs::write(&tmp_path, serialized)
            .with_context(|| format!("failed to write {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, &self.events_path)
            .with_context(|| format!("failed to replace {}", self.events_path.display()))?;
        Ok(history.events)
    }

    fn append_log_line(&self, event: &ModerationEvent) -> anyhow::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .with_context(|| format!("failed to open {}", self.log_path.display()))?;
        writeln!(file, "{}", event.log_line())?;
        Ok(())
    }
}

//! Notification interface and recipient resolution.
//!
//! Message content and localization live outside this crate; a notification
//! here is a template name plus positional content parameters.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use groupsync_core::{store::groupsync_root, SyncConfig, SyncJob};

use crate::error::{io_err, SyncError};

/// Templates the governor can send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationTemplate {
    /// Five parameters: destination, add threshold, add percent, remove
    /// threshold, remove percent.
    ThresholdExceeded,
    /// Four parameters: destination, job key, violations, disable limit.
    JobDisabled,
}

/// A notification decided on but not yet addressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingNotification {
    pub template: NotificationTemplate,
    pub params: Vec<String>,
}

/// Outbound notification sink.
pub trait Notifier: Send + Sync {
    fn send_notification(
        &self,
        template: NotificationTemplate,
        recipients: &[String],
        params: &[String],
    ) -> Result<(), SyncError>;
}

/// Recipients in priority order: group owners, then the job's requestors,
/// then the support address. Empty only when all three are empty.
pub fn resolve_recipients(
    owners: &[String],
    requestors: &[String],
    support: Option<&str>,
) -> Vec<String> {
    if !owners.is_empty() {
        return owners.to_vec();
    }
    if !requestors.is_empty() {
        return requestors.to_vec();
    }
    support.map(|s| vec![s.to_string()]).unwrap_or_default()
}

/// Address and send a pending notification for `job`.
///
/// `owners` is `None` when the directory could not resolve them.
pub fn deliver(
    notifier: &dyn Notifier,
    pending: &PendingNotification,
    owners: Option<&[String]>,
    job: &SyncJob,
    config: &SyncConfig,
) -> Result<(), SyncError> {
    let recipients = resolve_recipients(
        owners.unwrap_or_default(),
        &job.requestors,
        config.support_address.as_deref(),
    );
    if recipients.is_empty() {
        tracing::warn!(
            job = %job.key,
            template = ?pending.template,
            "no recipients for notification, dropping",
        );
        return Ok(());
    }
    notifier.send_notification(pending.template, &recipients, &pending.params)
}

/// Writes notifications to the log only.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send_notification(
        &self,
        template: NotificationTemplate,
        recipients: &[String],
        params: &[String],
    ) -> Result<(), SyncError> {
        tracing::info!(?template, ?recipients, ?params, "notification");
        Ok(())
    }
}

/// One line of the notification outbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxEntry {
    pub template: NotificationTemplate,
    pub recipients: Vec<String>,
    pub params: Vec<String>,
    pub queued_at: DateTime<Utc>,
}

/// Appends notifications as JSON lines for a mail relay to pick up.
#[derive(Debug, Clone)]
pub struct OutboxNotifier {
    path: PathBuf,
}

impl OutboxNotifier {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<home>/.groupsync/outbox.jsonl`
    pub fn at_home(home: &Path) -> Self {
        Self::new(groupsync_root(home).join("outbox.jsonl"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read back every queued entry.
    pub fn entries(&self) -> Result<Vec<OutboxEntry>, SyncError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let contents = std::fs::read_to_string(&self.path).map_err(|e| io_err(&self.path, e))?;
        contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(SyncError::from))
            .collect()
    }
}

impl Notifier for OutboxNotifier {
    fn send_notification(
        &self,
        template: NotificationTemplate,
        recipients: &[String],
        params: &[String],
    ) -> Result<(), SyncError> {
        let entry = OutboxEntry {
            template,
            recipients: recipients.to_vec(),
            params: params.to_vec(),
            queued_at: Utc::now(),
        };
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
        }
        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| io_err(&self.path, e))?;
        file.write_all(line.as_bytes())
            .map_err(|e| io_err(&self.path, e))?;
        Ok(())
    }
}

use super::{Backup, BackupStatus, BackupTrigger, Reported, ScheduleStatus, StorageBackend};
use crate::api::ApiClient;
use crate::notify::{Notification, Notifier};
use chrono::{DateTime, Local, Utc};
use std::fmt::Write as _;
use std::sync::{Arc, RwLock};
use tracing::{debug, error, warn};

pub const EMPTY_TITLE: &str = "No backups available";
pub const EMPTY_GUIDANCE: &str =
    "Create your first backup or configure automatic backups with `config save --enabled true`";
pub const NOT_SCHEDULED: &str = "Not scheduled";
const LOAD_FAILED: &str = "Failed to load backups";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BadgeColor {
    Green,
    Blue,
    Red,
    Purple,
    Orange,
    Yellow,
    Indigo,
    Neutral,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Badge {
    pub label: String,
    pub color: BadgeColor,
}

impl Badge {
    fn new(label: impl Into<String>, color: BadgeColor) -> Self {
        Self {
            label: label.into(),
            color,
        }
    }

    fn unknown(raw: &str) -> Self {
        Self::new(raw, BadgeColor::Neutral)
    }
}

pub fn status_badge(status: &Reported<BackupStatus>) -> Badge {
    match status {
        Reported::Known(BackupStatus::Completed) => Badge::new("Completed", BadgeColor::Green),
        Reported::Known(BackupStatus::InProgress) => Badge::new("In progress", BadgeColor::Blue),
        Reported::Known(BackupStatus::Failed) => Badge::new("Failed", BadgeColor::Red),
        Reported::Unknown(raw) => Badge::unknown(raw),
    }
}

pub fn trigger_badge(trigger: &Reported<BackupTrigger>) -> Badge {
    match trigger {
        Reported::Known(BackupTrigger::Scheduled) => Badge::new("Scheduled", BadgeColor::Purple),
        Reported::Known(BackupTrigger::Manual) => Badge::new("Manual", BadgeColor::Blue),
        Reported::Known(BackupTrigger::PreRestore) => Badge::new("Pre-restore", BadgeColor::Orange),
        Reported::Unknown(raw) => Badge::unknown(raw),
    }
}

pub fn storage_badge(storage: &Reported<StorageBackend>) -> Badge {
    match storage {
        Reported::Known(StorageBackend::S3) => Badge::new("S3", BadgeColor::Yellow),
        Reported::Known(StorageBackend::Sftp) => Badge::new("SFTP", BadgeColor::Indigo),
        Reported::Known(StorageBackend::Local) => Badge::new("Local", BadgeColor::Neutral),
        Reported::Unknown(raw) => Badge::unknown(raw),
    }
}

/// Which row actions are offered for a backup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowActions {
    pub download: bool,
    pub restore: bool,
    pub delete: bool,
}

pub fn row_actions(backup: &Backup) -> RowActions {
    let completed = backup.is_completed();
    RowActions {
        download: completed,
        restore: completed,
        // Failed or stuck records must stay removable
        delete: true,
    }
}

pub fn format_date(value: &DateTime<Utc>) -> String {
    value
        .with_timezone(&Local)
        .format("%d/%m/%Y %H:%M")
        .to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewState {
    Loading,
    Empty,
    Table,
}

/// What the registry currently shows
#[derive(Debug, Clone)]
pub struct RegistrySnapshot {
    pub loading: bool,
    pub backups: Vec<Backup>,
    pub total_size_human: String,
    pub schedule: Option<ScheduleStatus>,
}

impl Default for RegistrySnapshot {
    fn default() -> Self {
        Self {
            loading: true,
            backups: Vec::new(),
            total_size_human: "0 B".to_string(),
            schedule: None,
        }
    }
}

impl RegistrySnapshot {
    pub fn view_state(&self) -> ViewState {
        if self.loading {
            ViewState::Loading
        } else if self.backups.is_empty() {
            ViewState::Empty
        } else {
            ViewState::Table
        }
    }

    pub fn total_count(&self) -> usize {
        self.backups.len()
    }

    pub fn next_run_label(&self) -> String {
        self.schedule
            .as_ref()
            .and_then(ScheduleStatus::upcoming)
            .map(|next| format_date(&next))
            .unwrap_or_else(|| NOT_SCHEDULED.to_string())
    }

    pub fn find(&self, id: &str) -> Option<&Backup> {
        self.backups.iter().find(|b| b.id == id)
    }

    /// Plain-text rendering: stats, then the loading, empty or table state.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Total backups: {}", self.total_count());
        let _ = writeln!(out, "Total size:    {}", self.total_size_human);
        let _ = writeln!(out, "Next backup:   {}", self.next_run_label());
        out.push('\n');

        match self.view_state() {
            ViewState::Loading => out.push_str("Loading backups...\n"),
            ViewState::Empty => {
                let _ = writeln!(out, "{EMPTY_TITLE}");
                let _ = writeln!(out, "{EMPTY_GUIDANCE}");
            }
            ViewState::Table => {
                let _ = writeln!(
                    out,
                    "{:<26} {:<16} {:<38} {:>10} {:<8} {:<12} {:<12} ACTIONS",
                    "ID", "DATE", "FILE", "SIZE", "STORAGE", "STATUS", "TRIGGER"
                );
                // Server order is kept as is
                for backup in &self.backups {
                    out.push_str(&render_row(backup));
                }
            }
        }
        out
    }
}

fn render_row(backup: &Backup) -> String {
    let actions = row_actions(backup);
    let mut offered = Vec::new();
    if actions.download {
        offered.push("download");
    }
    if actions.restore {
        offered.push("restore");
    }
    if actions.delete {
        offered.push("delete");
    }

    let mut line = format!(
        "{:<26} {:<16} {:<38} {:>10} {:<8} {:<12} {:<12} {}\n",
        backup.id,
        format_date(&backup.created_at),
        backup.filename,
        backup.size_human,
        storage_badge(&backup.storage_type).label,
        status_badge(&backup.status).label,
        trigger_badge(&backup.trigger).label,
        offered.join(",")
    );
    if let Some(message) = &backup.error_message {
        let _ = writeln!(line, "{:<26} error: {}", "", message);
    }
    line
}

/// Detailed view of one backup
pub fn render_detail(backup: &Backup) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "ID:          {}", backup.id);
    let _ = writeln!(out, "File:        {}", backup.filename);
    let _ = writeln!(out, "Path:        {}", backup.storage_path);
    let _ = writeln!(out, "Storage:     {}", storage_badge(&backup.storage_type).label);
    let _ = writeln!(out, "Status:      {}", status_badge(&backup.status).label);
    let _ = writeln!(out, "Trigger:     {}", trigger_badge(&backup.trigger).label);
    match backup.size_bytes {
        Some(bytes) => {
            let _ = writeln!(out, "Size:        {} ({} bytes)", backup.size_human, bytes);
        }
        None => {
            let _ = writeln!(out, "Size:        unknown");
        }
    }
    let _ = writeln!(out, "Created:     {}", format_date(&backup.created_at));
    if let Some(completed_at) = &backup.completed_at {
        let _ = writeln!(out, "Completed:   {}", format_date(completed_at));
    }
    if let Some(duration) = backup.duration_seconds {
        let _ = writeln!(out, "Duration:    {duration:.1}s");
    }
    if let Some(collections) = backup.collections_count {
        let _ = writeln!(out, "Collections: {collections}");
    }
    if let Some(documents) = backup.documents_count {
        let _ = writeln!(out, "Documents:   {documents}");
    }
    if let Some(checksum) = &backup.checksum_sha256 {
        let _ = writeln!(out, "SHA-256:     {checksum}");
    }
    if let Some(message) = &backup.error_message {
        let _ = writeln!(out, "Error:       {message}");
    }
    out
}

/// Backup Registry View: list, aggregate size and schedule status.
///
/// Holds no authoritative state; every mutation elsewhere is followed by a
/// re-fetch through [`RegistryView::refresh`].
pub struct RegistryView {
    api: ApiClient,
    notifier: Arc<dyn Notifier>,
    state: RwLock<RegistrySnapshot>,
}

impl RegistryView {
    pub fn new(api: ApiClient, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            api,
            notifier,
            state: RwLock::new(RegistrySnapshot::default()),
        }
    }

    /// Mount: fetch the list and the schedule status concurrently.
    pub async fn load(&self) {
        tokio::join!(self.refresh(), self.refresh_schedule());
    }

    /// Re-fetch the list. Returns whether the fetch succeeded.
    pub async fn refresh(&self) -> bool {
        self.update(|s| s.loading = true);

        match self.api.list_backups().await {
            Ok(list) => {
                debug!(
                    "Fetched {} backups ({} total reported)",
                    list.backups.len(),
                    list.total_count
                );
                for backup in &list.backups {
                    for violation in backup.invariant_violations() {
                        warn!("Backup {}: {}", backup.id, violation);
                    }
                }
                self.update(|s| {
                    s.backups = list.backups;
                    s.total_size_human = list.total_size_human;
                    s.loading = false;
                });
                true
            }
            Err(e) => {
                error!("Error fetching backups: {}", e);
                self.notifier.notify(Notification::error(LOAD_FAILED));
                self.update(|s| s.loading = false);
                false
            }
        }
    }

    /// Non-critical: failures are logged and the view shows "not scheduled".
    pub async fn refresh_schedule(&self) {
        match self.api.schedule_status().await {
            Ok(status) => self.update(|s| s.schedule = Some(status)),
            Err(e) => {
                warn!("Error fetching schedule status: {}", e);
                self.update(|s| s.schedule = None);
            }
        }
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        self.state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn find(&self, id: &str) -> Option<Backup> {
        self.snapshot().find(id).cloned()
    }

    fn update(&self, apply: impl FnOnce(&mut RegistrySnapshot)) {
        let mut state = self
            .state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        apply(&mut state);
    }
}

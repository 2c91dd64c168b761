use super::download::{safe_filename, save_response, UrlOpener};
use super::operation::{OperationState, OperationTracker};
use super::registry::{format_date, RegistryView};
use super::{Backup, BackupError, BackupStatus, Reported, RestoreResponse, Result, StorageBackend};
use crate::api::ApiClient;
use crate::notify::{Notification, Notifier};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

const CREATE_FAILED: &str = "Failed to create backup";
const DOWNLOAD_FAILED: &str = "Failed to download backup";
const RESTORE_FAILED: &str = "Failed to restore backup";
const DELETE_FAILED: &str = "Failed to delete backup";

#[derive(Debug, Clone)]
pub struct LifecycleSettings {
    /// Delay before the one-shot registry refresh after a trigger
    pub refresh_delay: Duration,
    /// How long the pre-restore safety backup id stays on screen
    pub pre_restore_notice: Duration,
    pub download_dir: PathBuf,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            refresh_delay: Duration::from_secs(2),
            pre_restore_notice: Duration::from_secs(5),
            download_dir: PathBuf::from("."),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Download,
    Restore,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModalKind {
    Restore,
    Delete,
}

/// An open confirmation prompt for a destructive action on one backup
#[derive(Debug, Clone)]
pub struct ConfirmationModal {
    pub kind: ModalKind,
    pub backup: Backup,
}

impl ConfirmationModal {
    /// What the admin sees before confirming: file and date, plus size for restores.
    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines = vec![
            format!("File: {}", self.backup.filename),
            format!("Date: {}", format_date(&self.backup.created_at)),
        ];
        if self.kind == ModalKind::Restore {
            lines.push(format!("Size: {}", self.backup.size_human));
        }
        lines
    }

    pub fn title(&self) -> &'static str {
        match self.kind {
            ModalKind::Restore => "Confirm restore",
            ModalKind::Delete => "Confirm deletion",
        }
    }

    pub fn warning(&self) -> &'static str {
        match self.kind {
            ModalKind::Restore => {
                "This replaces ALL current data in the database. \
                 A safety backup is created automatically before the restore."
            }
            ModalKind::Delete => "This backup will be deleted. This cannot be undone.",
        }
    }
}

/// Whether the modal's buttons accept input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModalControls {
    pub confirm_enabled: bool,
    pub cancel_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// Fetched through the authenticated API and written here
    Saved(PathBuf),
    /// Pre-signed URL handed to the opener
    Opened(String),
}

/// Result of a trigger: the created record and the pending delayed refresh.
#[derive(Debug)]
pub struct TriggeredBackup {
    pub backup: Backup,
    pub refresh: JoinHandle<()>,
}

/// Drives trigger, download, restore and delete. Each has its own in-flight
/// tracker; restore and delete go through a confirmation modal first.
pub struct LifecycleController {
    api: ApiClient,
    registry: Arc<RegistryView>,
    notifier: Arc<dyn Notifier>,
    opener: Arc<dyn UrlOpener>,
    settings: LifecycleSettings,
    create: OperationTracker,
    download: OperationTracker,
    restore: OperationTracker,
    delete: OperationTracker,
    modal: Mutex<Option<ConfirmationModal>>,
}

impl LifecycleController {
    pub fn new(
        api: ApiClient,
        registry: Arc<RegistryView>,
        notifier: Arc<dyn Notifier>,
        opener: Arc<dyn UrlOpener>,
        settings: LifecycleSettings,
    ) -> Self {
        Self {
            api,
            registry,
            notifier,
            opener,
            settings,
            create: OperationTracker::new("create"),
            download: OperationTracker::new("download"),
            restore: OperationTracker::new("restore"),
            delete: OperationTracker::new("delete"),
            modal: Mutex::new(None),
        }
    }

    pub fn registry(&self) -> &Arc<RegistryView> {
        &self.registry
    }

    pub fn state(&self, operation: Operation) -> OperationState {
        self.tracker(operation).state()
    }

    fn tracker(&self, operation: Operation) -> &OperationTracker {
        match operation {
            Operation::Create => &self.create,
            Operation::Download => &self.download,
            Operation::Restore => &self.restore,
            Operation::Delete => &self.delete,
        }
    }

    /// Report an error the way every operation does: log, notify, record.
    fn report_failure(&self, context: &str, fallback: &str, err: &BackupError) -> String {
        error!("{}: {}", context, err);
        let message = err.user_message(fallback);
        self.notifier.notify(Notification::error(message.clone()));
        message
    }

    // ---- Trigger ---------------------------------------------------------

    /// Start a manual backup. On success a single registry refresh is
    /// scheduled after the configured delay; the backup may still be
    /// `in_progress` when it runs.
    pub async fn trigger(&self) -> Result<TriggeredBackup> {
        let in_flight = self.create.begin()?;

        match self.api.trigger_backup().await {
            Ok(backup) => {
                info!("Backup {} started", backup.id);
                self.notifier
                    .notify(Notification::success("Backup started successfully"));
                in_flight.succeed();

                let registry = Arc::clone(&self.registry);
                let delay = self.settings.refresh_delay;
                let refresh = tokio::spawn(async move {
                    sleep(delay).await;
                    registry.refresh().await;
                });

                Ok(TriggeredBackup { backup, refresh })
            }
            Err(e) => {
                let err = BackupError::from(e);
                let message = self.report_failure("Error creating backup", CREATE_FAILED, &err);
                in_flight.fail(message);
                Err(err)
            }
        }
    }

    /// Poll a backup until it reaches a terminal status, then refresh the
    /// registry. Not part of the trigger flow; callers opt in.
    pub async fn wait_for_completion(
        &self,
        id: &str,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<Backup> {
        let deadline = Instant::now() + timeout;

        loop {
            let backup = self.api.get_backup(id).await?;
            match &backup.status {
                Reported::Known(status) if status.is_terminal() => {
                    debug!("Backup {} reached {}", id, status);
                    self.registry.refresh().await;
                    return Ok(backup);
                }
                Reported::Unknown(raw) => {
                    warn!("Backup {} has unrecognised status '{}'", id, raw);
                }
                Reported::Known(_) => {}
            }

            if Instant::now() + poll_interval > deadline {
                return Err(BackupError::Timeout {
                    id: id.to_string(),
                    seconds: timeout.as_secs(),
                });
            }
            sleep(poll_interval).await;
        }
    }

    // ---- Download --------------------------------------------------------

    /// Local and SFTP backups are fetched through the authenticated API and
    /// saved; S3 backups are opened through their pre-signed URL.
    pub async fn download(&self, backup: &Backup) -> Result<DownloadOutcome> {
        ensure_completed(backup)?;
        let in_flight = self.download.begin()?;

        match self.dispatch_download(backup).await {
            Ok(outcome) => {
                self.notifier.notify(Notification::success("Download started"));
                in_flight.succeed();
                Ok(outcome)
            }
            Err(err) => {
                let message = self.report_failure("Error downloading backup", DOWNLOAD_FAILED, &err);
                in_flight.fail(message);
                Err(err)
            }
        }
    }

    async fn dispatch_download(&self, backup: &Backup) -> Result<DownloadOutcome> {
        let descriptor = self.api.download_descriptor(&backup.id).await?;
        let filename = safe_filename(&backup.filename, &backup.id);

        match &descriptor.storage_type {
            Reported::Known(StorageBackend::Local | StorageBackend::Sftp) => {
                // A direct link would need credentials the opener does not have
                let response = self.api.download_content(&backup.id).await?;
                let path = save_response(response, &self.settings.download_dir, &filename).await?;
                info!("Backup {} saved to {}", backup.id, path.display());
                Ok(DownloadOutcome::Saved(path))
            }
            Reported::Known(StorageBackend::S3) => {
                self.opener.open(&descriptor.download_url, &filename).await?;
                Ok(DownloadOutcome::Opened(descriptor.download_url))
            }
            Reported::Unknown(raw) => {
                warn!(
                    "Unrecognised storage type '{}' for backup {}; opening download URL",
                    raw, backup.id
                );
                self.opener.open(&descriptor.download_url, &filename).await?;
                Ok(DownloadOutcome::Opened(descriptor.download_url))
            }
        }
    }

    // ---- Confirmation modal ---------------------------------------------

    pub fn modal(&self) -> Option<ConfirmationModal> {
        self.lock_modal().clone()
    }

    pub fn controls(&self) -> ModalControls {
        let busy = match self.lock_modal().as_ref().map(|m| m.kind) {
            Some(ModalKind::Restore) => self.restore.is_pending(),
            Some(ModalKind::Delete) => self.delete.is_pending(),
            None => true,
        };
        ModalControls {
            confirm_enabled: !busy,
            cancel_enabled: !busy,
        }
    }

    /// Select a completed backup and open the restore confirmation.
    pub fn request_restore(&self, backup: &Backup) -> Result<ConfirmationModal> {
        ensure_completed(backup)?;
        self.open_modal(ModalKind::Restore, backup)
    }

    /// Select any backup and open the delete confirmation.
    pub fn request_delete(&self, backup: &Backup) -> Result<ConfirmationModal> {
        self.open_modal(ModalKind::Delete, backup)
    }

    fn open_modal(&self, kind: ModalKind, backup: &Backup) -> Result<ConfirmationModal> {
        let mut modal = self.lock_modal();
        if let Some(current) = modal.as_ref() {
            if self.modal_busy(current.kind) {
                return Err(BackupError::AlreadyInFlight {
                    operation: self.modal_tracker(current.kind).name(),
                });
            }
        }
        let opened = ConfirmationModal {
            kind,
            backup: backup.clone(),
        };
        *modal = Some(opened.clone());
        Ok(opened)
    }

    /// Close the modal and clear the selection without any request. Refused
    /// (returns false) while the modal's own operation is in flight.
    pub fn cancel(&self) -> bool {
        let mut modal = self.lock_modal();
        match modal.as_ref() {
            Some(current) if self.modal_busy(current.kind) => false,
            _ => {
                *modal = None;
                true
            }
        }
    }

    fn modal_tracker(&self, kind: ModalKind) -> &OperationTracker {
        match kind {
            ModalKind::Restore => &self.restore,
            ModalKind::Delete => &self.delete,
        }
    }

    fn modal_busy(&self, kind: ModalKind) -> bool {
        self.modal_tracker(kind).is_pending()
    }

    fn selected(&self, kind: ModalKind, operation: &'static str) -> Result<Backup> {
        self.lock_modal()
            .as_ref()
            .filter(|m| m.kind == kind)
            .map(|m| m.backup.clone())
            .ok_or(BackupError::NoSelection { operation })
    }

    fn close_modal(&self) {
        *self.lock_modal() = None;
    }

    fn lock_modal(&self) -> std::sync::MutexGuard<'_, Option<ConfirmationModal>> {
        self.modal
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ---- Restore ---------------------------------------------------------

    /// Restore the backup selected by [`request_restore`](Self::request_restore).
    /// On failure the modal stays open so the admin can retry or cancel.
    pub async fn confirm_restore(&self) -> Result<RestoreResponse> {
        let backup = self.selected(ModalKind::Restore, "restore")?;
        let in_flight = self.restore.begin()?;
        info!("Restoring backup {} ({})", backup.id, backup.filename);

        match self.api.restore_backup(&backup.id).await {
            Ok(result) => {
                self.notifier
                    .notify(Notification::success(result.message.clone()));
                if let Some(safety_id) = &result.pre_restore_backup_id {
                    self.notifier.notify(
                        Notification::success(format!("Safety backup created: {safety_id}"))
                            .with_duration(self.settings.pre_restore_notice),
                    );
                }
                in_flight.succeed();
                self.close_modal();
                self.registry.refresh().await;
                Ok(result)
            }
            Err(e) => {
                let err = BackupError::from(e);
                let message = self.report_failure("Error restoring backup", RESTORE_FAILED, &err);
                in_flight.fail(message);
                Err(err)
            }
        }
    }

    // ---- Delete ----------------------------------------------------------

    /// Delete the backup selected by [`request_delete`](Self::request_delete).
    /// On failure the modal stays open.
    pub async fn confirm_delete(&self) -> Result<String> {
        let backup = self.selected(ModalKind::Delete, "delete")?;
        let in_flight = self.delete.begin()?;
        info!("Deleting backup {} ({})", backup.id, backup.filename);

        match self.api.delete_backup(&backup.id).await {
            Ok(response) => {
                self.notifier
                    .notify(Notification::success("Backup deleted successfully"));
                in_flight.succeed();
                self.close_modal();
                self.registry.refresh().await;
                Ok(response.message)
            }
            Err(e) => {
                let err = BackupError::from(e);
                let message = self.report_failure("Error deleting backup", DELETE_FAILED, &err);
                in_flight.fail(message);
                Err(err)
            }
        }
    }
}

fn ensure_completed(backup: &Backup) -> Result<()> {
    if backup.status.is(&BackupStatus::Completed) {
        Ok(())
    } else {
        Err(BackupError::NotCompleted {
            id: backup.id.clone(),
            status: backup.status.to_string(),
        })
    }
}

use crate::application::{Confirm, DependencyContainer};
use crate::backup::{
    render_detail, row_actions, Backup, BackupDraft, ConditionalField, DownloadOutcome, Frequency,
    Reported, StorageBackend,
};
use anyhow::{Context, Result};
use clap::Args;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Clean separation of command handling logic from main.rs
pub struct SessionCommandHandler {
    container: Arc<DependencyContainer>,
}

impl SessionCommandHandler {
    pub fn new(container: Arc<DependencyContainer>) -> Self {
        Self { container }
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<()> {
        self.container
            .api
            .login(email, password)
            .await
            .map_err(|e| anyhow::anyhow!(e.user_message("Login failed")))?;

        if let Some(path) = self.container.session.store_path() {
            info!("💾 Session stored at {}", path.display());
        }
        Ok(())
    }

    pub fn logout(&self) -> Result<()> {
        self.container.api.logout();
        info!("👋 Session cleared");
        Ok(())
    }

    pub async fn whoami(&self) -> Result<()> {
        let user = self.container.api.current_user().await?;
        info!("👤 {} <{}>", user.username, user.email);
        info!("   Role: {}", user.role);
        info!(
            "   Active: {}",
            if user.is_active { "✅" } else { "❌" }
        );
        if user.role != "admin" {
            warn!("⚠️  Backup operations require the admin role");
        }
        Ok(())
    }
}

pub struct BackupCommandHandler {
    container: Arc<DependencyContainer>,
}

impl BackupCommandHandler {
    pub fn new(container: Arc<DependencyContainer>) -> Self {
        Self { container }
    }

    pub async fn list(&self) -> Result<()> {
        self.container.registry.load().await;
        print!("{}", self.container.registry.snapshot().render());
        Ok(())
    }

    pub async fn show(&self, id: &str) -> Result<()> {
        let backup = self.fetch(id).await?;
        print!("{}", render_detail(&backup));

        let actions = row_actions(&backup);
        info!(
            "Actions: download {} | restore {} | delete {}",
            mark(actions.download),
            mark(actions.restore),
            mark(actions.delete)
        );
        Ok(())
    }

    pub async fn create(&self, wait: bool, timeout: Duration, poll_interval: Duration) -> Result<()> {
        info!("💾 Requesting a manual backup...");
        let triggered = self.container.lifecycle.trigger().await?;
        info!(
            "🆔 Backup {} ({}) is {}",
            triggered.backup.id, triggered.backup.filename, triggered.backup.status
        );

        triggered
            .refresh
            .await
            .context("Delayed registry refresh did not complete")?;

        if wait {
            info!("⏳ Waiting for backup {} to finish...", triggered.backup.id);
            let finished = self
                .container
                .lifecycle
                .wait_for_completion(&triggered.backup.id, timeout, poll_interval)
                .await?;
            info!("📦 Backup {} finished: {}", finished.id, finished.status);
            if let Some(message) = &finished.error_message {
                warn!("   Error: {}", message);
            }
        }

        self.print_registry().await;
        Ok(())
    }

    pub async fn download(&self, id: &str) -> Result<()> {
        let backup = self.fetch(id).await?;
        match self.container.lifecycle.download(&backup).await? {
            DownloadOutcome::Saved(path) => info!("📥 Saved to {}", path.display()),
            DownloadOutcome::Opened(_) => info!(
                "📥 Fetched from object storage into {}",
                self.container.config.download_dir.display()
            ),
        }
        Ok(())
    }

    pub async fn restore(&self, id: &str, confirm: &dyn Confirm) -> Result<()> {
        let backup = self.fetch(id).await?;
        let lifecycle = &self.container.lifecycle;
        let modal = lifecycle.request_restore(&backup)?;

        warn!("⚠️  {}", modal.title());
        for line in modal.summary_lines() {
            info!("   {}", line);
        }
        warn!("   {}", modal.warning());

        if !confirm.confirm("Restore this backup?")? {
            lifecycle.cancel();
            info!("Restore cancelled");
            return Ok(());
        }

        let outcome = lifecycle.confirm_restore().await;
        if outcome.is_err() {
            // Nothing left to retry from in a one-shot command
            lifecycle.cancel();
        }
        let result = outcome?;
        info!("🔄 Restore status: {}", result.status);
        self.print_registry().await;
        Ok(())
    }

    pub async fn delete(&self, id: &str, confirm: &dyn Confirm) -> Result<()> {
        let backup = self.fetch(id).await?;
        let lifecycle = &self.container.lifecycle;
        let modal = lifecycle.request_delete(&backup)?;

        warn!("⚠️  {}", modal.title());
        for line in modal.summary_lines() {
            info!("   {}", line);
        }
        warn!("   {}", modal.warning());

        if !confirm.confirm("Delete this backup?")? {
            lifecycle.cancel();
            info!("Delete cancelled");
            return Ok(());
        }

        let outcome = lifecycle.confirm_delete().await;
        if outcome.is_err() {
            lifecycle.cancel();
        }
        let message = outcome?;
        info!("🗑️  {}", message);
        self.print_registry().await;
        Ok(())
    }

    /// Mutations only refresh the list, so the schedule status is refetched here.
    async fn print_registry(&self) {
        self.container.registry.refresh_schedule().await;
        print!("{}", self.container.registry.snapshot().render());
    }

    async fn fetch(&self, id: &str) -> Result<Backup> {
        self.container
            .api
            .get_backup(id)
            .await
            .map_err(|e| anyhow::anyhow!(e.user_message(&format!("Backup {id} not found"))))
    }
}

fn mark(enabled: bool) -> &'static str {
    if enabled {
        "✅"
    } else {
        "-"
    }
}

/// Flag overrides applied on top of the server-seeded draft
#[derive(Debug, Clone, Default, Args)]
pub struct DraftOverrides {
    /// Enable or disable scheduled backups
    #[arg(long)]
    pub enabled: Option<bool>,
    /// daily, weekly or monthly
    #[arg(long)]
    pub frequency: Option<Frequency>,
    /// Time of day in UTC (HH:MM)
    #[arg(long)]
    pub time: Option<String>,
    /// 0 = Monday ... 6 = Sunday (weekly only)
    #[arg(long)]
    pub day_of_week: Option<u8>,
    /// 1-28 (monthly only)
    #[arg(long)]
    pub day_of_month: Option<u8>,
    #[arg(long)]
    pub retention_days: Option<u32>,
    /// s3, sftp or local
    #[arg(long)]
    pub storage: Option<StorageBackend>,

    #[arg(long)]
    pub s3_endpoint_url: Option<String>,
    #[arg(long)]
    pub s3_bucket_name: Option<String>,
    #[arg(long)]
    pub s3_access_key_id: Option<String>,
    #[arg(long, env = "JORNADA_S3_SECRET_ACCESS_KEY", hide_env_values = true)]
    pub s3_secret_access_key: Option<String>,
    #[arg(long)]
    pub s3_region: Option<String>,

    #[arg(long)]
    pub sftp_host: Option<String>,
    #[arg(long)]
    pub sftp_port: Option<u16>,
    #[arg(long)]
    pub sftp_username: Option<String>,
    #[arg(long, env = "JORNADA_SFTP_PASSWORD", hide_env_values = true)]
    pub sftp_password: Option<String>,
    #[arg(long)]
    pub sftp_remote_path: Option<String>,

    #[arg(long)]
    pub local_path: Option<String>,
}

impl DraftOverrides {
    pub fn apply(&self, draft: &mut BackupDraft) {
        fn set<T: Clone>(target: &mut T, value: &Option<T>) {
            if let Some(value) = value {
                *target = value.clone();
            }
        }

        set(&mut draft.enabled, &self.enabled);
        set(&mut draft.frequency, &self.frequency);
        set(&mut draft.time, &self.time);
        set(&mut draft.day_of_week, &self.day_of_week);
        set(&mut draft.day_of_month, &self.day_of_month);
        set(&mut draft.retention_days, &self.retention_days);
        if let Some(storage) = self.storage {
            draft.storage_type = Reported::Known(storage);
        }
        set(&mut draft.s3_endpoint_url, &self.s3_endpoint_url);
        set(&mut draft.s3_bucket_name, &self.s3_bucket_name);
        set(&mut draft.s3_access_key_id, &self.s3_access_key_id);
        set(&mut draft.s3_secret_access_key, &self.s3_secret_access_key);
        set(&mut draft.s3_region, &self.s3_region);
        set(&mut draft.sftp_host, &self.sftp_host);
        set(&mut draft.sftp_port, &self.sftp_port);
        set(&mut draft.sftp_username, &self.sftp_username);
        set(&mut draft.sftp_password, &self.sftp_password);
        set(&mut draft.sftp_remote_path, &self.sftp_remote_path);
        set(&mut draft.local_path, &self.local_path);
    }
}

pub struct ConfigCommandHandler {
    container: Arc<DependencyContainer>,
}

impl ConfigCommandHandler {
    pub fn new(container: Arc<DependencyContainer>) -> Self {
        Self { container }
    }

    pub async fn show(&self) -> Result<()> {
        let schedule = &self.container.schedule;
        let settings = schedule.load().await?;
        let draft = schedule.draft();
        let placeholders = schedule.placeholders();

        info!("⚙️  Contact email: {}", settings.contact_email);
        if settings.backup_config.is_none() {
            info!("   No backup configuration stored yet; showing defaults");
        }
        info!(
            "   Scheduled backups: {}",
            if draft.enabled { "enabled" } else { "disabled" }
        );
        info!("   Frequency: {} at {} UTC", draft.frequency, draft.time);
        match draft.conditional_field() {
            Some(ConditionalField::DayOfWeek) => info!("   Day of week: {}", draft.day_of_week),
            Some(ConditionalField::DayOfMonth) => info!("   Day of month: {}", draft.day_of_month),
            None => {}
        }
        info!("   Retention: {} days", draft.retention_days);
        info!("   Storage: {}", draft.storage_type);

        match draft.storage_type.known() {
            Some(StorageBackend::S3) => {
                info!("   S3 endpoint: {}", draft.s3_endpoint_url);
                info!("   S3 bucket: {}", draft.s3_bucket_name);
                info!("   S3 secret: {}", placeholder_or_unset(placeholders.s3_secret));
            }
            Some(StorageBackend::Sftp) => {
                info!("   SFTP host: {}", draft.sftp_host);
                info!("   SFTP path: {}", draft.sftp_remote_path);
                info!(
                    "   SFTP password: {}",
                    placeholder_or_unset(placeholders.sftp_password)
                );
            }
            Some(StorageBackend::Local) => info!("   Local path: {}", draft.local_path),
            None => warn!("   Storage type is not recognised; it is kept as stored"),
        }
        Ok(())
    }

    pub async fn save(&self, overrides: &DraftOverrides) -> Result<()> {
        let schedule = &self.container.schedule;
        schedule.load().await?;
        schedule.update_draft(|draft| overrides.apply(draft));
        schedule.save().await?;
        Ok(())
    }

    pub async fn test(&self, overrides: &DraftOverrides) -> Result<()> {
        let schedule = &self.container.schedule;
        schedule.load().await?;
        schedule.update_draft(|draft| overrides.apply(draft));

        let result = schedule.test_connection().await?;
        if !result.success {
            return Err(anyhow::anyhow!("Connection test failed: {}", result.message));
        }
        Ok(())
    }

    pub async fn set_email(&self, email: &str) -> Result<()> {
        let settings = self.container.schedule.update_contact_email(email).await?;
        info!("📧 Contact email is now {}", settings.contact_email);
        Ok(())
    }

    /// Configuration report plus a live check against the API.
    pub async fn diagnose(&self) -> Result<()> {
        print!("{}", self.container.config.create_diagnostic_report());

        match self.container.api.current_user().await {
            Ok(user) => info!("✅ API reachable; authenticated as {}", user.email),
            Err(e) => warn!("❌ API check failed: {}", e),
        }
        Ok(())
    }
}

fn placeholder_or_unset(placeholder: &str) -> &str {
    if placeholder.is_empty() {
        "not set"
    } else {
        placeholder
    }
}

use super::operation::{OperationState, OperationTracker};
use super::{
    BackupConfigInput, BackupConfigResponse, BackupError, BackupSchedule, Frequency, LocalConfig,
    Reported, Result, S3ConfigInput, Settings, SftpConfigInput, StorageBackend,
    TestConnectionRequest, TestConnectionResponse, UpdateSettings,
};
use crate::api::ApiClient;
use crate::notify::{Notification, Notifier};
use regex::Regex;
use std::sync::{Arc, RwLock};
use tracing::{error, info, warn};

pub const SECRET_PLACEHOLDER: &str = "••••••••";
pub const MIN_RETENTION_DAYS: u32 = 1;
pub const MAX_RETENTION_DAYS: u32 = 3650;
/// Highest day every month has
pub const MAX_DAY_OF_MONTH: u8 = 28;

const TIME_PATTERN: &str = r"^([01][0-9]|2[0-3]):[0-5][0-9]$";
const EMAIL_PATTERN: &str = r"^[^\s@]+@[^\s@]+\.[^\s@]+$";

const LOAD_FAILED: &str = "Failed to load settings";
const SAVE_FAILED: &str = "Failed to save backup configuration";
const TEST_FAILED: &str = "Failed to test connection";
const EMAIL_FAILED: &str = "Failed to save settings";
const INVALID_EMAIL: &str = "Invalid contact email";

/// Editable form state for the backup policy.
///
/// Holds every backend's fields at once; only the active backend's block is
/// attached on save. Secret fields start empty and an empty secret means
/// "keep the stored credential".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupDraft {
    pub enabled: bool,
    pub frequency: Frequency,
    pub time: String,
    /// 0 = Monday
    pub day_of_week: u8,
    pub day_of_month: u8,
    pub retention_days: u32,
    /// A type this client does not know is carried through untouched
    pub storage_type: Reported<StorageBackend>,

    pub s3_endpoint_url: String,
    pub s3_bucket_name: String,
    pub s3_access_key_id: String,
    pub s3_secret_access_key: String,
    pub s3_region: String,

    pub sftp_host: String,
    pub sftp_port: u16,
    pub sftp_username: String,
    pub sftp_password: String,
    pub sftp_remote_path: String,

    pub local_path: String,
}

impl Default for BackupDraft {
    fn default() -> Self {
        Self {
            enabled: false,
            frequency: Frequency::Daily,
            time: "00:00".to_string(),
            day_of_week: 0,
            day_of_month: 1,
            retention_days: 730,
            storage_type: Reported::Known(StorageBackend::Local),
            s3_endpoint_url: String::new(),
            s3_bucket_name: String::new(),
            s3_access_key_id: String::new(),
            s3_secret_access_key: String::new(),
            s3_region: "us-west-004".to_string(),
            sftp_host: String::new(),
            sftp_port: 22,
            sftp_username: String::new(),
            sftp_password: String::new(),
            sftp_remote_path: "/backups/openjornada/".to_string(),
            local_path: "/app/backups".to_string(),
        }
    }
}

/// The frequency-dependent input currently shown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionalField {
    DayOfWeek,
    DayOfMonth,
}

/// Placeholders for the two secret inputs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecretPlaceholders {
    pub s3_secret: &'static str,
    pub sftp_password: &'static str,
}

/// Masked placeholder when a credential is already stored, empty otherwise.
pub fn secret_placeholder(configured: bool) -> &'static str {
    if configured {
        SECRET_PLACEHOLDER
    } else {
        ""
    }
}

pub fn is_valid_email(email: &str) -> bool {
    Regex::new(EMAIL_PATTERN)
        .map(|re| re.is_match(email))
        .unwrap_or(false)
}

impl BackupDraft {
    /// Seed from the server's read model. Secrets are never pre-filled;
    /// absent non-secret fields keep their defaults.
    pub fn seeded_from(config: &BackupConfigResponse) -> Self {
        let defaults = Self::default();

        if let Reported::Unknown(raw) = &config.storage_type {
            warn!(
                "Unrecognised storage type '{}' in backup config; it is sent back unchanged",
                raw
            );
        }

        let stored = config.schedule.clone().unwrap_or_default();
        let frequency = match stored.frequency {
            Some(Reported::Known(frequency)) => frequency,
            Some(Reported::Unknown(raw)) => {
                warn!(
                    "Unrecognised backup frequency '{}'; editing as {}",
                    raw, defaults.frequency
                );
                defaults.frequency
            }
            None => defaults.frequency,
        };
        let time = stored
            .time
            .filter(|time| !time.trim().is_empty())
            .unwrap_or_else(|| defaults.time.clone());

        Self {
            enabled: config.enabled,
            frequency,
            time,
            day_of_week: stored.day_of_week.unwrap_or(defaults.day_of_week),
            day_of_month: stored.day_of_month.unwrap_or(defaults.day_of_month),
            retention_days: config.retention_days,
            storage_type: config.storage_type.clone(),
            s3_endpoint_url: config.s3_endpoint.clone().unwrap_or_default(),
            s3_bucket_name: config.s3_bucket.clone().unwrap_or_default(),
            sftp_host: config.sftp_host.clone().unwrap_or_default(),
            sftp_remote_path: config
                .sftp_path
                .clone()
                .unwrap_or(defaults.sftp_remote_path.clone()),
            local_path: config
                .local_path
                .clone()
                .unwrap_or(defaults.local_path.clone()),
            ..defaults
        }
    }

    pub fn conditional_field(&self) -> Option<ConditionalField> {
        match self.frequency {
            Frequency::Daily => None,
            Frequency::Weekly => Some(ConditionalField::DayOfWeek),
            Frequency::Monthly => Some(ConditionalField::DayOfMonth),
        }
    }

    /// Local checks mirroring the form's input bounds. Hidden conditional
    /// fields are not checked since the server ignores them.
    pub fn validate(&self) -> Result<()> {
        let time_re = Regex::new(TIME_PATTERN)
            .map_err(|e| BackupError::Validation(format!("Invalid time pattern: {e}")))?;
        if !time_re.is_match(&self.time) {
            return Err(BackupError::Validation(format!(
                "Time must be HH:MM (UTC), got '{}'",
                self.time
            )));
        }

        if !(MIN_RETENTION_DAYS..=MAX_RETENTION_DAYS).contains(&self.retention_days) {
            return Err(BackupError::Validation(format!(
                "Retention must be between {MIN_RETENTION_DAYS} and {MAX_RETENTION_DAYS} days"
            )));
        }

        match self.conditional_field() {
            Some(ConditionalField::DayOfMonth)
                if !(1..=MAX_DAY_OF_MONTH).contains(&self.day_of_month) =>
            {
                Err(BackupError::Validation(format!(
                    "Day of month must be between 1 and {MAX_DAY_OF_MONTH}"
                )))
            }
            Some(ConditionalField::DayOfWeek) if self.day_of_week > 6 => Err(
                BackupError::Validation("Day of week must be between 0 (Monday) and 6".into()),
            ),
            _ => Ok(()),
        }
    }

    /// Both conditional fields are always included.
    pub fn schedule(&self) -> BackupSchedule {
        BackupSchedule {
            frequency: self.frequency,
            time: self.time.clone(),
            day_of_week: Some(self.day_of_week),
            day_of_month: Some(self.day_of_month),
        }
    }

    /// Build the save payload.
    ///
    /// The S3 block is attached only with an access key id and the SFTP block
    /// only with a password: a missing block keeps the stored credentials,
    /// while an empty string would overwrite them.
    pub fn to_config_input(&self) -> BackupConfigInput {
        let mut input = BackupConfigInput {
            enabled: self.enabled,
            schedule: Some(self.schedule()),
            retention_days: self.retention_days,
            storage_type: self.storage_type.clone(),
            s3_config: None,
            sftp_config: None,
            local_config: None,
        };

        match self.storage_type.known() {
            Some(StorageBackend::S3) if !self.s3_access_key_id.is_empty() => {
                input.s3_config = Some(S3ConfigInput {
                    endpoint_url: self.s3_endpoint_url.clone(),
                    bucket_name: self.s3_bucket_name.clone(),
                    access_key_id: self.s3_access_key_id.clone(),
                    secret_access_key: self.s3_secret_access_key.clone(),
                    region: self.s3_region.clone(),
                });
            }
            Some(StorageBackend::Sftp) if !self.sftp_password.is_empty() => {
                input.sftp_config = Some(SftpConfigInput {
                    host: self.sftp_host.clone(),
                    port: self.sftp_port,
                    username: self.sftp_username.clone(),
                    password: self.sftp_password.clone(),
                    remote_path: self.sftp_remote_path.clone(),
                });
            }
            Some(StorageBackend::Local) => {
                input.local_config = Some(LocalConfig {
                    path: self.local_path.clone(),
                });
            }
            _ => {}
        }

        input
    }

    /// Every field of every backend, whichever one is active.
    pub fn to_test_request(&self) -> TestConnectionRequest {
        TestConnectionRequest {
            storage_type: self.storage_type.clone(),
            s3_endpoint_url: self.s3_endpoint_url.clone(),
            s3_bucket_name: self.s3_bucket_name.clone(),
            s3_access_key_id: self.s3_access_key_id.clone(),
            s3_secret_access_key: self.s3_secret_access_key.clone(),
            s3_region: self.s3_region.clone(),
            sftp_host: self.sftp_host.clone(),
            sftp_port: self.sftp_port,
            sftp_username: self.sftp_username.clone(),
            sftp_password: self.sftp_password.clone(),
            sftp_remote_path: self.sftp_remote_path.clone(),
            local_path: self.local_path.clone(),
        }
    }
}

#[derive(Debug, Default)]
struct ConfiguratorState {
    settings: Option<Settings>,
    draft: BackupDraft,
}

/// Schedule Configuration: reads the policy, edits a draft, saves it and
/// checks storage reachability. Save, test and email update are tracked
/// independently.
pub struct ScheduleConfigurator {
    api: ApiClient,
    notifier: Arc<dyn Notifier>,
    state: RwLock<ConfiguratorState>,
    saving: OperationTracker,
    testing: OperationTracker,
    saving_email: OperationTracker,
}

impl ScheduleConfigurator {
    pub fn new(api: ApiClient, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            api,
            notifier,
            state: RwLock::new(ConfiguratorState::default()),
            saving: OperationTracker::new("save"),
            testing: OperationTracker::new("test connection"),
            saving_email: OperationTracker::new("save contact email"),
        }
    }

    /// Fetch settings and seed the draft. Without a stored backup config the
    /// draft keeps its defaults.
    pub async fn load(&self) -> Result<Settings> {
        match self.api.get_settings().await {
            Ok(settings) => {
                let draft = settings
                    .backup_config
                    .as_ref()
                    .map(BackupDraft::seeded_from)
                    .unwrap_or_default();
                let mut state = self.write();
                state.draft = draft;
                state.settings = Some(settings.clone());
                Ok(settings)
            }
            Err(e) => {
                error!("Error fetching settings: {}", e);
                let err = BackupError::from(e);
                self.notifier
                    .notify(Notification::error(err.user_message(LOAD_FAILED)));
                Err(err)
            }
        }
    }

    pub fn settings(&self) -> Option<Settings> {
        self.read().settings.clone()
    }

    pub fn draft(&self) -> BackupDraft {
        self.read().draft.clone()
    }

    pub fn update_draft(&self, edit: impl FnOnce(&mut BackupDraft)) {
        edit(&mut self.write().draft);
    }

    pub fn placeholders(&self) -> SecretPlaceholders {
        let state = self.read();
        let config = state
            .settings
            .as_ref()
            .and_then(|s| s.backup_config.as_ref());
        SecretPlaceholders {
            s3_secret: secret_placeholder(config.is_some_and(|c| c.s3_configured)),
            sftp_password: secret_placeholder(config.is_some_and(|c| c.sftp_configured)),
        }
    }

    pub fn save_state(&self) -> OperationState {
        self.saving.state()
    }

    pub fn test_state(&self) -> OperationState {
        self.testing.state()
    }

    /// Validate the draft, then PATCH `{backup_config}`.
    pub async fn save(&self) -> Result<Settings> {
        let in_flight = self.saving.begin()?;
        let draft = self.draft();

        if let Err(err) = draft.validate() {
            let message = err.user_message(SAVE_FAILED);
            self.notifier.notify(Notification::error(message.clone()));
            in_flight.fail(message);
            return Err(err);
        }

        let update = UpdateSettings {
            contact_email: None,
            backup_config: Some(draft.to_config_input()),
        };

        match self.api.update_settings(&update).await {
            Ok(settings) => {
                info!(
                    "Backup configuration saved ({} via {})",
                    draft.frequency, draft.storage_type
                );
                self.write().settings = Some(settings.clone());
                self.notifier
                    .notify(Notification::success("Backup configuration saved"));
                in_flight.succeed();
                Ok(settings)
            }
            Err(e) => {
                error!("Error updating backup settings: {}", e);
                let err = BackupError::from(e);
                let message = err.user_message(SAVE_FAILED);
                self.notifier.notify(Notification::error(message.clone()));
                in_flight.fail(message);
                Err(err)
            }
        }
    }

    /// Diagnostic only; nothing is persisted. A negative result from the
    /// server is still a completed request.
    pub async fn test_connection(&self) -> Result<TestConnectionResponse> {
        let in_flight = self.testing.begin()?;
        let request = self.draft().to_test_request();

        match self.api.test_connection(&request).await {
            Ok(result) => {
                if result.success {
                    self.notifier
                        .notify(Notification::success(result.message.clone()));
                } else {
                    warn!("Connection test for {} failed: {}", request.storage_type, result.message);
                    self.notifier
                        .notify(Notification::error(result.message.clone()));
                }
                in_flight.succeed();
                Ok(result)
            }
            Err(e) => {
                error!("Error testing connection: {}", e);
                let err = BackupError::from(e);
                let message = err.user_message(TEST_FAILED);
                self.notifier.notify(Notification::error(message.clone()));
                in_flight.fail(message);
                Err(err)
            }
        }
    }

    /// Trim and check the email shape locally; an invalid address never
    /// reaches the server.
    pub async fn update_contact_email(&self, email: &str) -> Result<Settings> {
        let email = email.trim();
        if email.is_empty() || !is_valid_email(email) {
            self.notifier.notify(Notification::error(INVALID_EMAIL));
            return Err(BackupError::Validation(INVALID_EMAIL.to_string()));
        }

        let in_flight = self.saving_email.begin()?;
        let update = UpdateSettings {
            contact_email: Some(email.to_string()),
            backup_config: None,
        };

        match self.api.update_settings(&update).await {
            Ok(settings) => {
                self.write().settings = Some(settings.clone());
                self.notifier
                    .notify(Notification::success("Settings saved"));
                in_flight.succeed();
                Ok(settings)
            }
            Err(e) => {
                error!("Error updating settings: {}", e);
                let err = BackupError::from(e);
                let message = err.user_message(EMAIL_FAILED);
                self.notifier.notify(Notification::error(message.clone()));
                in_flight.fail(message);
                Err(err)
            }
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, ConfiguratorState> {
        self.state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, ConfiguratorState> {
        self.state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tracing_test::traced_test;

    fn read_model(value: serde_json::Value) -> BackupConfigResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_s3_block_needs_access_key() {
        let mut draft = BackupDraft {
            storage_type: Reported::Known(StorageBackend::S3),
            s3_endpoint_url: "https://s3.example.com".into(),
            s3_bucket_name: "bucket".into(),
            ..BackupDraft::default()
        };
        let payload = serde_json::to_value(draft.to_config_input()).unwrap();
        assert!(payload.get("s3_config").is_none());

        draft.s3_access_key_id = "AKIA".into();
        draft.s3_secret_access_key = "secret".into();
        let payload = serde_json::to_value(draft.to_config_input()).unwrap();
        assert_eq!(
            payload["s3_config"],
            json!({
                "endpoint_url": "https://s3.example.com",
                "bucket_name": "bucket",
                "access_key_id": "AKIA",
                "secret_access_key": "secret",
                "region": "us-west-004"
            })
        );
    }

    #[test]
    fn test_sftp_blank_password_omits_block() {
        let draft = BackupDraft {
            storage_type: Reported::Known(StorageBackend::Sftp),
            sftp_host: "backup.example.com".into(),
            ..BackupDraft::default()
        };
        let payload = serde_json::to_value(draft.to_config_input()).unwrap();
        let keys: Vec<&str> = payload
            .as_object()
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect();
        assert_eq!(keys.len(), 4);
        for key in ["enabled", "schedule", "retention_days", "storage_type"] {
            assert!(keys.contains(&key), "{key}");
        }
    }

    #[test]
    fn test_only_active_backend_block_is_attached() {
        let draft = BackupDraft {
            storage_type: Reported::Known(StorageBackend::Local),
            s3_access_key_id: "AKIA".into(),
            sftp_password: "pw".into(),
            ..BackupDraft::default()
        };
        let input = draft.to_config_input();
        assert!(input.s3_config.is_none());
        assert!(input.sftp_config.is_none());
        assert_eq!(input.local_config.unwrap().path, "/app/backups");
    }

    #[test]
    fn test_schedule_keeps_hidden_conditional_field() {
        let draft = BackupDraft {
            frequency: Frequency::Weekly,
            day_of_week: 3,
            day_of_month: 15,
            ..BackupDraft::default()
        };
        assert_eq!(draft.conditional_field(), Some(ConditionalField::DayOfWeek));
        let schedule = draft.schedule();
        assert_eq!(schedule.day_of_week, Some(3));
        assert_eq!(schedule.day_of_month, Some(15));
    }

    #[test]
    fn test_seeding_never_fills_secrets() {
        let config = read_model(json!({
            "enabled": true,
            "schedule": {"frequency": "monthly", "time": "03:30", "day_of_month": 10},
            "retention_days": 90,
            "storage_type": "sftp",
            "sftp_configured": true,
            "sftp_host": "backup.example.com"
        }));
        let draft = BackupDraft::seeded_from(&config);
        assert!(draft.enabled);
        assert_eq!(draft.frequency, Frequency::Monthly);
        assert_eq!(draft.time, "03:30");
        assert_eq!(draft.day_of_month, 10);
        assert_eq!(draft.day_of_week, 0);
        assert!(draft.storage_type.is(&StorageBackend::Sftp));
        assert_eq!(draft.sftp_host, "backup.example.com");
        assert_eq!(draft.sftp_remote_path, "/backups/openjornada/");
        assert!(draft.sftp_password.is_empty());
        assert!(draft.s3_secret_access_key.is_empty());
    }

    #[test]
    #[traced_test]
    fn test_unknown_storage_type_is_written_back_verbatim() {
        let config = read_model(json!({
            "enabled": false,
            "retention_days": 30,
            "storage_type": "azure",
            "local_path": "/data/backups"
        }));
        let draft = BackupDraft::seeded_from(&config);
        assert_eq!(draft.storage_type, Reported::Unknown("azure".to_string()));
        assert_eq!(draft.frequency, Frequency::Daily);
        assert!(logs_contain("Unrecognised storage type 'azure'"));

        let payload = serde_json::to_value(draft.to_config_input()).unwrap();
        assert_eq!(payload["storage_type"], "azure");
        for block in ["s3_config", "sftp_config", "local_config"] {
            assert!(payload.get(block).is_none(), "{block}");
        }
        assert_eq!(draft.to_test_request().storage_type.to_string(), "azure");
    }

    #[test]
    #[traced_test]
    fn test_odd_stored_schedule_falls_back_to_defaults() {
        let config = read_model(json!({
            "enabled": true,
            "schedule": {"frequency": "hourly", "day_of_week": 4},
            "retention_days": 30,
            "storage_type": "local"
        }));
        let draft = BackupDraft::seeded_from(&config);
        assert_eq!(draft.frequency, Frequency::Daily);
        assert_eq!(draft.time, "00:00");
        assert_eq!(draft.day_of_week, 4);
        assert_eq!(draft.day_of_month, 1);
        assert!(draft.validate().is_ok());
        assert!(logs_contain("Unrecognised backup frequency 'hourly'"));

        let blank_time = read_model(json!({
            "enabled": true,
            "schedule": {"frequency": "weekly", "time": ""},
            "retention_days": 30,
            "storage_type": "local"
        }));
        let draft = BackupDraft::seeded_from(&blank_time);
        assert_eq!(draft.frequency, Frequency::Weekly);
        assert_eq!(draft.time, "00:00");
    }

    #[test]
    fn test_placeholder_only_when_configured() {
        assert_eq!(secret_placeholder(true), SECRET_PLACEHOLDER);
        assert_eq!(secret_placeholder(false), "");
    }

    #[test]
    fn test_validation_bounds() {
        assert!(BackupDraft::default().validate().is_ok());

        let bad_time = BackupDraft {
            time: "24:00".into(),
            ..BackupDraft::default()
        };
        assert!(bad_time.validate().is_err());

        let no_retention = BackupDraft {
            retention_days: 0,
            ..BackupDraft::default()
        };
        assert!(no_retention.validate().is_err());

        let too_long = BackupDraft {
            retention_days: 3651,
            ..BackupDraft::default()
        };
        assert!(too_long.validate().is_err());

        let day_31 = BackupDraft {
            frequency: Frequency::Monthly,
            day_of_month: 31,
            ..BackupDraft::default()
        };
        assert!(day_31.validate().is_err());

        // Hidden field is not checked
        let weekly = BackupDraft {
            frequency: Frequency::Weekly,
            day_of_month: 31,
            day_of_week: 6,
            ..BackupDraft::default()
        };
        assert!(weekly.validate().is_ok());
    }

    #[test]
    fn test_email_shape() {
        assert!(is_valid_email("admin@example.com"));
        assert!(!is_valid_email("admin@example"));
        assert!(!is_valid_email("admin example@x.com"));
        assert!(!is_valid_email(""));
    }
}

pub mod download;
pub mod lifecycle;
pub mod operation;
pub mod registry;
pub mod schedule;
mod timestamp;

pub use download::*;
pub use lifecycle::*;
pub use operation::*;
pub use registry::*;
pub use schedule::*;

use crate::api::ApiError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A string enum as reported by the server.
///
/// Values this client does not recognise are kept verbatim so they can still be
/// displayed; decoding never fails on an unknown discriminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reported<T> {
    Known(T),
    Unknown(String),
}

impl<T> Reported<T> {
    pub fn known(&self) -> Option<&T> {
        match self {
            Reported::Known(value) => Some(value),
            Reported::Unknown(_) => None,
        }
    }
}

impl<T: PartialEq> Reported<T> {
    pub fn is(&self, value: &T) -> bool {
        self.known() == Some(value)
    }
}

impl<T: FromStr> From<String> for Reported<T> {
    fn from(raw: String) -> Self {
        match raw.parse::<T>() {
            Ok(value) => Reported::Known(value),
            Err(_) => Reported::Unknown(raw),
        }
    }
}

impl<T: fmt::Display> fmt::Display for Reported<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reported::Known(value) => value.fmt(f),
            Reported::Unknown(raw) => f.write_str(raw),
        }
    }
}

impl<'de, T: FromStr> Deserialize<'de> for Reported<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        String::deserialize(deserializer).map(Reported::from)
    }
}

impl<T: fmt::Display> Serialize for Reported<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown {kind}: {value}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

macro_rules! wire_enum {
    ($(#[$meta:meta])* $name:ident, $kind:literal { $($variant:ident => $wire:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $wire)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $wire),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                match s {
                    $($wire => Ok($name::$variant),)+
                    _ => Err(ParseEnumError {
                        kind: $kind,
                        value: s.to_string(),
                    }),
                }
            }
        }
    };
}

wire_enum!(
    /// Lifecycle status of one backup attempt
    BackupStatus, "backup status" {
        InProgress => "in_progress",
        Completed => "completed",
        Failed => "failed",
    }
);

wire_enum!(
    /// Which actor caused a backup to be created
    BackupTrigger, "backup trigger" {
        Scheduled => "scheduled",
        Manual => "manual",
        PreRestore => "pre_restore",
    }
);

wire_enum!(
    /// Storage destination for backup artifacts
    StorageBackend, "storage backend" {
        S3 => "s3",
        Sftp => "sftp",
        Local => "local",
    }
);

wire_enum!(
    Frequency, "frequency" {
        Daily => "daily",
        Weekly => "weekly",
        Monthly => "monthly",
    }
);

impl BackupStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, BackupStatus::Completed | BackupStatus::Failed)
    }
}

/// One backup record. Owned by the server; this is a re-fetchable copy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Backup {
    pub id: String,
    pub filename: String,
    #[serde(default)]
    pub storage_path: String,
    pub storage_type: Reported<StorageBackend>,
    /// Absent while a backup is still running
    #[serde(default)]
    pub size_bytes: Option<u64>,
    #[serde(default)]
    pub size_human: String,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default, with = "timestamp::option")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration_seconds: Option<f64>,
    pub status: Reported<BackupStatus>,
    pub trigger: Reported<BackupTrigger>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub collections_count: Option<u64>,
    #[serde(default)]
    pub documents_count: Option<u64>,
    /// Reported by the server, never verified here
    #[serde(default)]
    pub checksum_sha256: Option<String>,
}

impl Backup {
    pub fn is_completed(&self) -> bool {
        self.status.is(&BackupStatus::Completed)
    }

    /// Server-side invariants this record breaks, if any.
    pub fn invariant_violations(&self) -> Vec<&'static str> {
        let mut violations = Vec::new();
        match self.status.known() {
            Some(BackupStatus::Failed) if self.error_message.is_none() => {
                violations.push("failed backup without error_message");
            }
            Some(BackupStatus::Completed) => {
                if self.completed_at.is_none() {
                    violations.push("completed backup without completed_at");
                }
                if self.size_bytes.is_none() {
                    violations.push("completed backup without size_bytes");
                }
            }
            _ => {}
        }
        violations
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackupListResponse {
    pub backups: Vec<Backup>,
    #[serde(default)]
    pub total_count: u64,
    #[serde(default)]
    pub total_size_bytes: u64,
    #[serde(default)]
    pub total_size_human: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestoreRequest {
    pub confirm: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestoreResponse {
    pub status: String,
    pub message: String,
    #[serde(default)]
    pub pre_restore_backup_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Where and how a backup's content can be fetched
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadDescriptor {
    pub download_url: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
    pub storage_type: Reported<StorageBackend>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScheduleStatus {
    pub scheduled: bool,
    #[serde(default, with = "timestamp::option")]
    pub next_run: Option<DateTime<Utc>>,
}

impl ScheduleStatus {
    /// Next run only when scheduling is active
    pub fn upcoming(&self) -> Option<DateTime<Utc>> {
        if self.scheduled {
            self.next_run
        } else {
            None
        }
    }
}

/// Recurrence policy. Both conditional fields are always sent; the server
/// ignores the one that does not apply to the frequency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupSchedule {
    pub frequency: Frequency,
    /// UTC, `HH:MM`
    pub time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day_of_week: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day_of_month: Option<u8>,
}

/// Schedule as stored on the server. Every field may be missing or carry a
/// value this client does not know; the draft falls back to its defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSchedule {
    #[serde(default)]
    pub frequency: Option<Reported<Frequency>>,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub day_of_week: Option<u8>,
    #[serde(default)]
    pub day_of_month: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct S3ConfigInput {
    pub endpoint_url: String,
    pub bucket_name: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub region: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SftpConfigInput {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub remote_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalConfig {
    pub path: String,
}

/// Write model. A backend sub-config that is `None` is left out of the
/// payload entirely, which the server reads as "keep the stored credentials".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupConfigInput {
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<BackupSchedule>,
    pub retention_days: u32,
    /// An unrecognised type read from the server is written back verbatim
    pub storage_type: Reported<StorageBackend>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s3_config: Option<S3ConfigInput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sftp_config: Option<SftpConfigInput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_config: Option<LocalConfig>,
}

/// Read model. Secrets are never echoed back, only `*_configured` flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfigResponse {
    pub enabled: bool,
    #[serde(default)]
    pub schedule: Option<StoredSchedule>,
    pub retention_days: u32,
    pub storage_type: Reported<StorageBackend>,
    #[serde(default)]
    pub s3_configured: bool,
    #[serde(default)]
    pub s3_endpoint: Option<String>,
    #[serde(default)]
    pub s3_bucket: Option<String>,
    #[serde(default)]
    pub sftp_configured: bool,
    #[serde(default)]
    pub sftp_host: Option<String>,
    #[serde(default)]
    pub sftp_path: Option<String>,
    #[serde(default)]
    pub local_configured: bool,
    #[serde(default)]
    pub local_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub id: String,
    pub contact_email: String,
    #[serde(default)]
    pub backup_config: Option<BackupConfigResponse>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_config: Option<BackupConfigInput>,
}

/// Connection check payload: the discriminator plus every backend field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestConnectionRequest {
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

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestConnectionResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{operation} is already in progress")]
    AlreadyInFlight { operation: &'static str },

    #[error("No backup selected for {operation}")]
    NoSelection { operation: &'static str },

    #[error("Backup {id} is not completed (status: {status})")]
    NotCompleted { id: String, status: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Timeout error: backup {id} not finished after {seconds} seconds")]
    Timeout { id: String, seconds: u64 },
}

impl BackupError {
    /// Text for a user-facing notification: the server's `detail` when there
    /// is one, otherwise `fallback`.
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            BackupError::Api(e) => e.user_message(fallback),
            BackupError::Validation(message) => message.clone(),
            BackupError::Io(_) => fallback.to_string(),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, BackupError>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn backup_json(status: &str) -> serde_json::Value {
        json!({
            "id": "b1",
            "filename": "backup_20240101.gz",
            "storage_path": "/app/backups/backup_20240101.gz",
            "storage_type": "local",
            "size_bytes": 2048,
            "size_human": "2.0 KB",
            "created_at": "2024-01-01T02:00:00Z",
            "completed_at": "2024-01-01T02:00:05Z",
            "duration_seconds": 5.2,
            "status": status,
            "trigger": "scheduled"
        })
    }

    #[test]
    fn test_backup_decodes_known_values() {
        let backup: Backup = serde_json::from_value(backup_json("completed")).unwrap();
        assert!(backup.is_completed());
        assert!(backup.trigger.is(&BackupTrigger::Scheduled));
        assert!(backup.storage_type.is(&StorageBackend::Local));
        assert!(backup.invariant_violations().is_empty());
    }

    #[test]
    fn test_unknown_discriminators_are_kept_verbatim() {
        let mut value = backup_json("archived");
        value["trigger"] = json!("api");
        value["storage_type"] = json!("gcs");

        let backup: Backup = serde_json::from_value(value).unwrap();
        assert_eq!(backup.status, Reported::Unknown("archived".to_string()));
        assert_eq!(backup.trigger.to_string(), "api");
        assert_eq!(backup.storage_type.to_string(), "gcs");
        assert!(!backup.is_completed());
    }

    #[test]
    fn test_naive_timestamps_are_read_as_utc() {
        let mut value = backup_json("in_progress");
        value["created_at"] = json!("2024-03-05T10:15:00.123456");
        value["completed_at"] = json!(null);

        let backup: Backup = serde_json::from_value(value).unwrap();
        assert_eq!(backup.created_at.to_rfc3339(), "2024-03-05T10:15:00.123456+00:00");
        assert!(backup.completed_at.is_none());
    }

    #[test]
    fn test_failed_backup_without_message_is_flagged() {
        let mut value = backup_json("failed");
        value["completed_at"] = json!(null);
        let backup: Backup = serde_json::from_value(value).unwrap();
        assert_eq!(
            backup.invariant_violations(),
            vec!["failed backup without error_message"]
        );
    }

    #[test]
    fn test_completed_backup_without_size_is_flagged() {
        let mut value = backup_json("completed");
        value.as_object_mut().unwrap().remove("size_bytes");
        let backup: Backup = serde_json::from_value(value).unwrap();
        assert_eq!(backup.size_bytes, None);
        assert_eq!(
            backup.invariant_violations(),
            vec!["completed backup without size_bytes"]
        );

        let running: Backup = serde_json::from_value({
            let mut value = backup_json("in_progress");
            value["size_bytes"] = json!(null);
            value["completed_at"] = json!(null);
            value
        })
        .unwrap();
        assert!(running.invariant_violations().is_empty());
    }

    #[test]
    fn test_stored_schedule_tolerates_odd_values() {
        let config: BackupConfigResponse = serde_json::from_value(json!({
            "enabled": true,
            "schedule": {"frequency": "hourly"},
            "retention_days": 30,
            "storage_type": "local"
        }))
        .unwrap();
        let schedule = config.schedule.unwrap();
        assert_eq!(
            schedule.frequency,
            Some(Reported::Unknown("hourly".to_string()))
        );
        assert_eq!(schedule.time, None);
    }

    #[test]
    fn test_schedule_status_upcoming_requires_scheduled() {
        let status: ScheduleStatus =
            serde_json::from_value(json!({"scheduled": false, "next_run": "2024-01-02T00:00:00Z"}))
                .unwrap();
        assert!(status.upcoming().is_none());

        let status: ScheduleStatus =
            serde_json::from_value(json!({"scheduled": true, "next_run": null})).unwrap();
        assert!(status.upcoming().is_none());
    }

    #[test]
    fn test_config_input_omits_absent_sub_configs() {
        let input = BackupConfigInput {
            enabled: true,
            schedule: None,
            retention_days: 30,
            storage_type: Reported::Known(StorageBackend::Sftp),
            s3_config: None,
            sftp_config: None,
            local_config: None,
        };
        let value = serde_json::to_value(&input).unwrap();
        assert_eq!(
            value,
            json!({"enabled": true, "retention_days": 30, "storage_type": "sftp"})
        );
    }

    #[test]
    fn test_user_message_prefers_validation_text() {
        let err = BackupError::Validation("Retention must be between 1 and 3650 days".into());
        assert_eq!(
            err.user_message("Failed to save"),
            "Retention must be between 1 and 3650 days"
        );
        let err = BackupError::Io(std::io::Error::other("disk full"));
        assert_eq!(err.user_message("Failed to download backup"), "Failed to download backup");
    }
}

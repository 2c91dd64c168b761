pub mod api;
pub mod application;
pub mod backup;
pub mod config;
pub mod notify;

pub use config::Config;

// Re-export API types
pub use api::{ApiClient, ApiError, ErrorClass, Session};

// Re-export backup orchestration types
pub use backup::{
    Backup, BackupDraft, BackupError, BackupStatus, BackupTrigger, LifecycleController,
    RegistryView, Reported, ScheduleConfigurator, StorageBackend,
};

// Re-export notification types
pub use notify::{Notification, NotificationLevel, Notifier, RecordingNotifier, TracingNotifier};

use crate::{
    api::{ApiClient, Session},
    backup::{
        LifecycleController, LifecycleSettings, PresignedFetcher, RegistryView,
        ScheduleConfigurator, UrlOpener,
    },
    notify::{Notifier, TracingNotifier},
    Config,
};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{debug, info};

/// Dependency injection container for the application
pub struct DependencyContainer {
    // Core configuration
    pub config: Config,

    // Transport layer
    pub session: Arc<Session>,
    pub api: ApiClient,

    // Presentation seams
    pub notifier: Arc<dyn Notifier>,

    // Backup orchestration
    pub registry: Arc<RegistryView>,
    pub lifecycle: Arc<LifecycleController>,
    pub schedule: Arc<ScheduleConfigurator>,
}

impl DependencyContainer {
    /// Console notifications and pre-signed URLs fetched into the download directory.
    pub fn new(config: Config) -> Result<Self> {
        let opener = Arc::new(
            PresignedFetcher::new(config.download_dir.clone())
                .context("Failed to create download client")?,
        );
        Self::with_components(config, Arc::new(TracingNotifier), opener)
    }

    pub fn with_components(
        config: Config,
        notifier: Arc<dyn Notifier>,
        opener: Arc<dyn UrlOpener>,
    ) -> Result<Self> {
        debug!("🔧 Initializing dependency container...");

        let session = Arc::new(Session::load(config.token_file.clone()));
        if !session.is_authenticated() {
            info!("🔒 No stored session; run `jornada-admin login` first");
        }

        let api = ApiClient::new(&config.api_url, session.clone(), config.request_timeout())
            .context("Failed to create API client")?;

        let registry = Arc::new(RegistryView::new(api.clone(), notifier.clone()));
        let lifecycle = Arc::new(LifecycleController::new(
            api.clone(),
            registry.clone(),
            notifier.clone(),
            opener,
            LifecycleSettings {
                refresh_delay: config.refresh_delay(),
                pre_restore_notice: config.pre_restore_notice(),
                download_dir: config.download_dir.clone(),
            },
        ));
        let schedule = Arc::new(ScheduleConfigurator::new(api.clone(), notifier.clone()));

        debug!("✅ Dependency container initialized");

        Ok(Self {
            config,
            session,
            api,
            notifier,
            registry,
            lifecycle,
            schedule,
        })
    }
}

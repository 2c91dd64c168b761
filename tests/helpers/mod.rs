//! Shared fixtures for the integration tests
#![allow(dead_code)]

pub mod mock_api;

use async_trait::async_trait;
use jornada_admin::application::DependencyContainer;
use jornada_admin::backup::UrlOpener;
use jornada_admin::{Config, RecordingNotifier};
use mock_api::{MockApi, MOCK_TOKEN};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Records the URLs it is asked to open instead of fetching them.
#[derive(Debug, Default)]
pub struct RecordingOpener {
    opened: Mutex<Vec<(String, String)>>,
}

impl RecordingOpener {
    pub fn opened(&self) -> Vec<(String, String)> {
        self.opened.lock().unwrap().clone()
    }
}

#[async_trait]
impl UrlOpener for RecordingOpener {
    async fn open(&self, url: &str, filename: &str) -> jornada_admin::backup::Result<()> {
        self.opened
            .lock()
            .unwrap()
            .push((url.to_string(), filename.to_string()));
        Ok(())
    }
}

/// A container wired to a running [`MockApi`], with recording seams.
pub struct TestEnvironment {
    pub mock: MockApi,
    pub container: Arc<DependencyContainer>,
    pub notifier: Arc<RecordingNotifier>,
    pub opener: Arc<RecordingOpener>,
    pub token_file: PathBuf,
    pub download_dir: PathBuf,
    // Keeps the token file and downloads alive for the test's duration
    _dir: TempDir,
}

impl TestEnvironment {
    /// Logged in with the mock's token.
    pub async fn new() -> Self {
        Self::with_token(Some(MOCK_TOKEN)).await
    }

    pub async fn logged_out() -> Self {
        Self::with_token(None).await
    }

    /// `token` is written to the token file before the session loads it.
    pub async fn with_token(token: Option<&str>) -> Self {
        let mock = MockApi::start().await;
        let dir = TempDir::new().unwrap();
        let token_file = dir.path().join("token");
        if let Some(token) = token {
            std::fs::write(&token_file, token).unwrap();
        }
        let download_dir = dir.path().join("downloads");

        let config = Config {
            api_url: mock.base_url.clone(),
            token_file: token_file.clone(),
            request_timeout_seconds: Some(10),
            refresh_delay_ms: 50,
            pre_restore_notice_seconds: 5,
            download_dir: download_dir.clone(),
            log_level: "debug".to_string(),
        };

        let notifier = Arc::new(RecordingNotifier::new());
        let opener = Arc::new(RecordingOpener::default());
        let container = Arc::new(
            DependencyContainer::with_components(config, notifier.clone(), opener.clone())
                .unwrap(),
        );

        Self {
            mock,
            container,
            notifier,
            opener,
            token_file,
            download_dir,
            _dir: dir,
        }
    }
}

//! Backup endpoints under `/api/backups/`

use super::{ApiClient, ApiError};
use crate::backup::{
    Backup, BackupListResponse, DownloadDescriptor, MessageResponse, RestoreRequest,
    RestoreResponse, ScheduleStatus, TestConnectionRequest, TestConnectionResponse,
};
use reqwest::{Method, Response};

const BACKUPS: &str = "backups";

impl ApiClient {
    pub async fn list_backups(&self) -> Result<BackupListResponse, ApiError> {
        self.get_json(&["api", BACKUPS, ""]).await
    }

    pub async fn get_backup(&self, id: &str) -> Result<Backup, ApiError> {
        self.get_json(&["api", BACKUPS, id]).await
    }

    /// Starts a backup job; the returned record is usually still `in_progress`.
    pub async fn trigger_backup(&self) -> Result<Backup, ApiError> {
        self.send_json::<(), _>(Method::POST, &["api", BACKUPS, "trigger"], None)
            .await
    }

    pub async fn delete_backup(&self, id: &str) -> Result<MessageResponse, ApiError> {
        self.send_json::<(), _>(Method::DELETE, &["api", BACKUPS, id], None)
            .await
    }

    /// Always sends `{"confirm": true}`; the server refuses restores without it.
    pub async fn restore_backup(&self, id: &str) -> Result<RestoreResponse, ApiError> {
        self.send_json(
            Method::POST,
            &["api", BACKUPS, id, "restore"],
            Some(&RestoreRequest { confirm: true }),
        )
        .await
    }

    pub async fn download_descriptor(&self, id: &str) -> Result<DownloadDescriptor, ApiError> {
        self.get_json(&["api", BACKUPS, id, "download-url"]).await
    }

    /// Authenticated binary fetch of a backup's content. The caller streams the body.
    pub async fn download_content(&self, id: &str) -> Result<Response, ApiError> {
        let url = self.endpoint(&["api", BACKUPS, id, "download"])?;
        self.send(self.request(Method::GET, url)).await
    }

    pub async fn test_connection(
        &self,
        request: &TestConnectionRequest,
    ) -> Result<TestConnectionResponse, ApiError> {
        self.send_json(
            Method::POST,
            &["api", BACKUPS, "test-connection"],
            Some(request),
        )
        .await
    }

    pub async fn schedule_status(&self) -> Result<ScheduleStatus, ApiError> {
        self.get_json(&["api", BACKUPS, "schedule", "status"]).await
    }
}

use super::{ApiClient, ApiError};
use crate::backup::{Settings, UpdateSettings};
use reqwest::Method;

impl ApiClient {
    pub async fn get_settings(&self) -> Result<Settings, ApiError> {
        self.get_json(&["api", "settings", ""]).await
    }

    /// Partial update; absent fields are left untouched server-side.
    pub async fn update_settings(&self, update: &UpdateSettings) -> Result<Settings, ApiError> {
        self.send_json(Method::PATCH, &["api", "settings", ""], Some(update))
            .await
    }
}

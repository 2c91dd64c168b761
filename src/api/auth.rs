use super::client::TOKEN_PATH;
use super::{ApiClient, ApiError};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    #[serde(default)]
    pub id: Option<String>,
    pub username: String,
    pub email: String,
    /// `admin` or `tracker`
    pub role: String,
    pub is_active: bool,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl ApiClient {
    /// OAuth2 password form; the email goes in the `username` field.
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginResponse, ApiError> {
        let url = self.endpoint(TOKEN_PATH)?;
        let builder = self
            .request(Method::POST, url)
            .form(&[("username", email), ("password", password)]);
        let response = self.send(builder).await?;
        let login: LoginResponse = Self::decode(response).await?;

        self.session().set_token(&login.access_token)?;
        info!("Logged in as {}", email);
        Ok(login)
    }

    pub async fn current_user(&self) -> Result<User, ApiError> {
        self.get_json(&["api", "users", "me"]).await
    }

    pub fn logout(&self) {
        self.session().clear();
        info!("Logged out");
    }
}

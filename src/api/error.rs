use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Session expired or missing, log in again")]
    SessionExpired,

    #[error("Server rejected request with HTTP {status}: {}", detail.as_deref().unwrap_or("no detail"))]
    Server {
        status: StatusCode,
        detail: Option<String>,
    },

    #[error("Response parsing failed: {0}")]
    Decode(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse failure classes. Only `Authentication` is handled globally; the
/// rest are surfaced where the call was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Transport,
    Authentication,
    Rejected,
    ServerFault,
}

#[derive(Deserialize)]
struct ErrorBody {
    detail: Option<serde_json::Value>,
}

impl ApiError {
    pub(crate) fn from_response_body(status: StatusCode, body: &str) -> Self {
        let detail = serde_json::from_str::<ErrorBody>(body)
            .ok()
            .and_then(|b| b.detail)
            .and_then(|d| match d {
                serde_json::Value::String(s) if !s.trim().is_empty() => Some(s),
                _ => None,
            });
        ApiError::Server { status, detail }
    }

    /// Server-provided `detail`, if the error carried one
    pub fn detail(&self) -> Option<&str> {
        match self {
            ApiError::Server { detail, .. } => detail.as_deref(),
            _ => None,
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::Server { status, .. } => Some(*status),
            ApiError::Http(e) => e.status(),
            ApiError::SessionExpired => Some(StatusCode::UNAUTHORIZED),
            _ => None,
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            ApiError::SessionExpired => ErrorClass::Authentication,
            ApiError::Server { status, .. } if status.is_server_error() => ErrorClass::ServerFault,
            ApiError::Server { .. } => ErrorClass::Rejected,
            ApiError::Decode(_) => ErrorClass::ServerFault,
            ApiError::Http(_) | ApiError::InvalidUrl(_) | ApiError::Io(_) => ErrorClass::Transport,
        }
    }

    /// Most specific message available: server `detail`, else `fallback`.
    pub fn user_message(&self, fallback: &str) -> String {
        self.detail()
            .map(str::to_owned)
            .unwrap_or_else(|| fallback.to_owned())
    }
}

pub mod auth;
pub mod backups;
pub mod client;
pub mod error;
pub mod session;
pub mod settings;

pub use auth::{LoginResponse, User};
pub use client::ApiClient;
pub use error::{ApiError, ErrorClass};
pub use session::Session;

use super::Result;
use crate::api::ApiError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Strip any directory components from a server-provided file name.
pub fn safe_filename(filename: &str, id: &str) -> String {
    Path::new(filename)
        .file_name()
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty() && *name != "..")
        .map(str::to_owned)
        .unwrap_or_else(|| format!("{id}.gz"))
}

/// Stream a response body into `dir/filename`.
///
/// The body is written to a temporary file in `dir` first and only renamed
/// into place once complete; on every error path the temporary file is
/// removed when its handle drops.
pub async fn save_response(
    mut response: reqwest::Response,
    dir: &Path,
    filename: &str,
) -> Result<PathBuf> {
    fs::create_dir_all(dir).await?;

    let temp = tempfile::Builder::new()
        .prefix(".download-")
        .suffix(".part")
        .tempfile_in(dir)?;
    let (std_file, temp_path) = temp.into_parts();
    let mut file = fs::File::from_std(std_file);

    let mut written: u64 = 0;
    while let Some(chunk) = response.chunk().await.map_err(ApiError::from)? {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    file.sync_all().await?;
    drop(file);

    let destination = dir.join(filename);
    temp_path
        .persist(&destination)
        .map_err(|e| e.error)?;

    debug!("Wrote {} bytes to {}", written, destination.display());
    Ok(destination)
}

/// Hands a self-authorising URL (a pre-signed link) to whatever opens it.
#[async_trait]
pub trait UrlOpener: Send + Sync {
    async fn open(&self, url: &str, filename: &str) -> Result<()>;
}

/// Opens pre-signed URLs by fetching them without credentials and saving the
/// body into a directory.
#[derive(Debug, Clone)]
pub struct PresignedFetcher {
    http: reqwest::Client,
    dir: PathBuf,
}

impl PresignedFetcher {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(ApiError::from)?;
        Ok(Self {
            http,
            dir: dir.into(),
        })
    }
}

#[async_trait]
impl UrlOpener for PresignedFetcher {
    async fn open(&self, url: &str, filename: &str) -> Result<()> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(ApiError::from)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::from_response_body(status, &body).into());
        }

        let path = save_response(response, &self.dir, filename).await?;
        info!("Saved {}", path.display());
        Ok(())
    }
}

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::{debug, warn};

/// Authenticated session: the bearer token attached to every outgoing request.
///
/// The token is loaded from its file once at startup and written back on
/// login. Logout and any 401 outside the token endpoint clear both the
/// in-memory copy and the file.
pub struct Session {
    token: RwLock<Option<String>>,
    store: Option<PathBuf>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("authenticated", &self.is_authenticated())
            .field("store", &self.store)
            .finish()
    }
}

impl Session {
    /// Session backed by a token file. A missing or empty file means "not logged in".
    pub fn load(store: impl Into<PathBuf>) -> Self {
        let store = store.into();
        let token = match fs::read_to_string(&store) {
            Ok(content) => {
                let trimmed = content.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!("Could not read token file {}: {}", store.display(), e);
                None
            }
        };
        debug!(
            "Session loaded from {} (authenticated: {})",
            store.display(),
            token.is_some()
        );

        Self {
            token: RwLock::new(token),
            store: Some(store),
        }
    }

    /// Session that lives only as long as the process
    pub fn in_memory(token: Option<String>) -> Self {
        Self {
            token: RwLock::new(token),
            store: None,
        }
    }

    pub fn store_path(&self) -> Option<&Path> {
        self.store.as_deref()
    }

    pub fn token(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.token().is_some()
    }

    pub fn set_token(&self, token: &str) -> io::Result<()> {
        *self
            .token
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(token.to_string());

        if let Some(path) = &self.store {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, token)?;
            restrict_permissions(path)?;
        }
        Ok(())
    }

    pub fn clear(&self) {
        *self
            .token
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = None;

        if let Some(path) = &self.store {
            match fs::remove_file(path) {
                Ok(()) => debug!("Removed token file {}", path.display()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!("Could not remove token file {}: {}", path.display(), e),
            }
        }
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> io::Result<()> {
    Ok(())
}

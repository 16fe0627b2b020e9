//! Atomic file-based token storage with secure permissions.
//!
//! Writes go through a temp file in the same directory followed by a rename,
//! so a crash mid-write never leaves a partial token behind.

use async_trait::async_trait;
use claudine_types::{StoreError, TokenStore};
use std::io::Write as _;
use std::path::{Path, PathBuf};

/// File-backed [`TokenStore`].
///
/// The parent directory is created with mode `0700`; the token file is
/// written with mode `0600` and reads fail if the mode has drifted.
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    /// Create a store for the given path, creating parent directories with
    /// `0700` permissions if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is empty or the directory cannot be
    /// created.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if path.as_os_str().is_empty() {
            return Err(StoreError::Missing("file path cannot be empty".into()));
        }

        if let Some(dir) = path.parent() {
            create_private_dir(dir)?;
        }

        Ok(Self { path })
    }
}

#[cfg(unix)]
fn create_private_dir(dir: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::DirBuilderExt as _;
    std::fs::DirBuilder::new()
        .recursive(true)
        .mode(0o700)
        .create(dir)
}

#[cfg(not(unix))]
fn create_private_dir(dir: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)
}

#[cfg(unix)]
fn check_permissions(path: &Path) -> Result<(), StoreError> {
    use std::os::unix::fs::PermissionsExt as _;
    let meta = std::fs::metadata(path).map_err(to_store_error(path))?;
    let mode = meta.permissions().mode() & 0o777;
    if mode != 0o600 {
        return Err(StoreError::InsecurePermissions {
            path: path.display().to_string(),
            mode,
        });
    }
    Ok(())
}

#[cfg(not(unix))]
fn check_permissions(_path: &Path) -> Result<(), StoreError> {
    Ok(())
}

fn to_store_error(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |err| {
        if err.kind() == std::io::ErrorKind::NotFound {
            StoreError::Missing(path.display().to_string())
        } else {
            StoreError::Io(err)
        }
    }
}

fn read_sync(path: &Path) -> Result<String, StoreError> {
    check_permissions(path)?;

    let data = std::fs::read_to_string(path).map_err(to_store_error(path))?;
    let token = data.trim();
    if token.is_empty() {
        return Err(StoreError::Empty(path.display().to_string()));
    }
    Ok(token.to_string())
}

fn write_sync(path: &Path, token: &str) -> Result<(), StoreError> {
    let dir = path
        .parent()
        .ok_or_else(|| StoreError::Missing("token file has no parent directory".into()))?;

    // tempfile creates the file with 0600 on unix; it is removed on drop if
    // the rename below never consumes it.
    let mut temp = tempfile::NamedTempFile::new_in(dir)?;
    temp.write_all(token.trim().as_bytes())?;
    temp.write_all(b"\n")?;
    temp.flush()?;

    temp.persist(path).map_err(|e| StoreError::Io(e.error))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt as _;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }

    Ok(())
}

#[async_trait]
impl TokenStore for FileStore {
    /// Read the stored token after trimming whitespace. Fails if the file is
    /// missing, empty, or has permissions other than `0600`.
    async fn read(&self) -> Result<String, StoreError> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || read_sync(&path))
            .await
            .map_err(|e| StoreError::Io(std::io::Error::other(e)))?
    }

    /// Atomically persist the token followed by a single newline.
    async fn write(&self, token: &str) -> Result<(), StoreError> {
        let path = self.path.clone();
        let token = token.to_string();
        tokio::task::spawn_blocking(move || write_sync(&path, &token))
            .await
            .map_err(|e| StoreError::Io(std::io::Error::other(e)))?
    }
}

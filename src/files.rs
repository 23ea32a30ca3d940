//! Local filesystem helpers for downloaded artifacts.
//!
//! Permission modes are octal strings such as `"0644"`. They are applied on
//! unix and ignored elsewhere.

use std::io;
use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, warn};

use crate::error::{ProviderError, Result};

/// Largest permission mode accepted.
pub const MAX_MODE: u32 = 0o777;

/// What currently exists at a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKind {
    /// Nothing.
    Missing,
    /// A regular file (or anything that is not a directory).
    File,
    /// A directory.
    Directory,
}

/// Resolve `path` against the current directory. Nothing is touched on disk.
pub fn to_absolute_path(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir()
        .map_err(|e| ProviderError::filesystem("resolve current directory for", path, e))?;
    Ok(cwd.join(path))
}

/// Parse an octal permission string: three octal digits, optionally
/// preceded by `0`. Setuid, setgid and sticky bits are not accepted.
pub fn parse_mode(mode: &str) -> Result<u32> {
    let digits = mode.trim();
    let digits = match digits.len() {
        4 => digits.strip_prefix('0'),
        3 => Some(digits),
        _ => None,
    }
    .filter(|d| d.bytes().all(|b| (b'0'..=b'7').contains(&b)))
    .ok_or_else(|| {
        ProviderError::Validation(format!(
            "invalid file mode '{mode}': expected three octal digits with an optional leading 0, \
             such as 0644"
        ))
    })?;
    u32::from_str_radix(digits, 8)
        .map_err(|e| ProviderError::Validation(format!("invalid file mode '{mode}': {e}")))
}

/// Render a permission mode the way it is stored in state.
pub fn format_mode(mode: u32) -> String {
    format!("{:04o}", mode & MAX_MODE)
}

/// Parse then re-render `mode`, so `"644"` and `"0644"` compare equal.
pub fn normalize_mode(mode: &str) -> Result<String> {
    parse_mode(mode).map(format_mode)
}

/// Inspect what exists at `path` without following it into a directory.
pub async fn inspect(path: &Path) -> Result<PathKind> {
    match fs::metadata(path).await {
        Ok(meta) if meta.is_dir() => Ok(PathKind::Directory),
        Ok(_) => Ok(PathKind::File),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(PathKind::Missing),
        Err(e) => Err(ProviderError::filesystem("inspect", path, e)),
    }
}

/// Whether anything exists at `path`.
pub async fn path_exists(path: &Path) -> Result<bool> {
    Ok(inspect(path).await? != PathKind::Missing)
}

/// Create `path` and any missing parents with `mode`. Existing directories
/// are left as they are.
pub async fn create_directory(path: &Path, mode: u32) -> Result<()> {
    match inspect(path).await? {
        PathKind::Directory => return Ok(()),
        PathKind::File => {
            return Err(ProviderError::FailedPrecondition(format!(
                "{} exists and is not a directory",
                path.display()
            )))
        }
        PathKind::Missing => {}
    }

    debug!(path = %path.display(), mode = %format_mode(mode), "creating directory");
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(mode);
    #[cfg(not(unix))]
    let _ = mode;
    builder
        .create(path)
        .await
        .map_err(|e| ProviderError::filesystem("create directory", path, e))
}

/// Create `path` for writing, creating its parent directory first.
///
/// With `overwrite` unset an existing file is an
/// [`ProviderError::AlreadyExists`] error.
pub async fn create_file(
    path: &Path,
    directory_mode: u32,
    file_mode: u32,
    overwrite: bool,
) -> Result<fs::File> {
    if let Some(parent) = path.parent() {
        create_directory(parent, directory_mode).await?;
    }

    let mut options = fs::OpenOptions::new();
    options.write(true);
    if overwrite {
        options.create(true).truncate(true);
    } else {
        options.create_new(true);
    }

    let file = options.open(path).await.map_err(|e| {
        if e.kind() == io::ErrorKind::AlreadyExists {
            already_exists(path)
        } else {
            ProviderError::filesystem("create", path, e)
        }
    })?;
    remove_on_error(path, set_mode(path, file_mode).await).await?;
    Ok(file)
}

/// Pass `result` through, removing the file at `path` first when it failed.
pub(crate) async fn remove_on_error<T>(path: &Path, result: Result<T>) -> Result<T> {
    if result.is_err() {
        remove_quietly(path).await;
    }
    result
}

pub(crate) fn already_exists(path: &Path) -> ProviderError {
    ProviderError::AlreadyExists(format!(
        "the destination file already exists and should not be overwritten: {}",
        path.display()
    ))
}

/// Apply a permission mode. A no-op on non-unix platforms.
pub async fn set_mode(path: &Path, mode: u32) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
            .await
            .map_err(|e| ProviderError::filesystem("set permissions on", path, e))?;
    }
    #[cfg(not(unix))]
    debug!(path = %path.display(), mode = %format_mode(mode), "skipping chmod on this platform");
    Ok(())
}

/// The current permission mode of `path`, or `None` where modes do not apply.
#[cfg(unix)]
pub async fn current_mode(path: &Path) -> Result<Option<String>> {
    use std::os::unix::fs::PermissionsExt;
    let meta = fs::metadata(path)
        .await
        .map_err(|e| ProviderError::filesystem("stat", path, e))?;
    Ok(Some(format_mode(meta.permissions().mode())))
}

/// The current permission mode of `path`, or `None` where modes do not apply.
#[cfg(not(unix))]
pub async fn current_mode(_path: &Path) -> Result<Option<String>> {
    Ok(None)
}

/// Move a file. Falls back to copy and remove when the rename would cross
/// filesystems.
pub async fn move_file(src: &Path, dest: &Path) -> Result<()> {
    match fs::rename(src, dest).await {
        Ok(()) => Ok(()),
        Err(e) if e.raw_os_error() == Some(18) || e.kind() == io::ErrorKind::CrossesDevices => {
            debug!(
                src = %src.display(),
                dest = %dest.display(),
                "rename crosses filesystems, copying instead"
            );
            fs::copy(src, dest)
                .await
                .map_err(|e| ProviderError::filesystem("copy to", dest, e))?;
            fs::remove_file(src)
                .await
                .map_err(|e| ProviderError::filesystem("remove", src, e))
        }
        Err(e) => Err(ProviderError::filesystem("move", src, e)),
    }
}

/// Remove a file.
pub async fn remove_file(path: &Path) -> Result<()> {
    fs::remove_file(path)
        .await
        .map_err(|e| ProviderError::filesystem("remove", path, e))
}

/// Best-effort removal used when unwinding a failed operation.
pub async fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        if e.kind() != io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "failed to clean up file");
        }
    }
}

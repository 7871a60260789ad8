//! Program path resolution and validation.
//!
//! Brick programs are named relative to a configured directory
//! (`vdepath`, `qemupath`). The directory may start with `~`.

use std::env;
use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Errors that can occur while validating a program path
#[derive(Debug, thiserror::Error)]
pub enum BinaryError {
    #[error("Program not found: {path}")]
    NotFound { path: String },

    #[error("Program is not executable: {path}")]
    NotExecutable { path: String },

    #[error("Invalid path: {path}")]
    InvalidPath { path: String },
}

/// Expand a leading `~` to `$HOME`; other paths are returned unchanged
pub fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix('~') {
        Some(rest) => match env::var("HOME") {
            Ok(home) => PathBuf::from(format!("{}{}", home, rest)),
            Err(_) => PathBuf::from(path),
        },
        None => PathBuf::from(path),
    }
}

/// Resolve `program` inside `dir`.
///
/// A program containing `/` is taken as an explicit path and only gets
/// `~` expansion.
///
/// ```
/// use brickworks::utils::binary::resolve_program;
///
/// assert_eq!(resolve_program("/usr/bin", "vde_switch"), "/usr/bin/vde_switch");
/// assert_eq!(resolve_program("/usr/bin", "/opt/vde/wirefilter"), "/opt/vde/wirefilter");
/// ```
pub fn resolve_program(dir: &str, program: &str) -> String {
    if program.contains('/') {
        return expand_home(program).display().to_string();
    }
    expand_home(dir).join(program).display().to_string()
}

/// Check that a program exists and has an execute bit set
pub fn validate_program(path: &Path) -> Result<(), BinaryError> {
    if !path.exists() {
        return Err(BinaryError::NotFound {
            path: path.display().to_string(),
        });
    }

    let metadata = path.metadata().map_err(|_| BinaryError::InvalidPath {
        path: path.display().to_string(),
    })?;

    if metadata.permissions().mode() & 0o111 == 0 {
        return Err(BinaryError::NotExecutable {
            path: path.display().to_string(),
        });
    }

    Ok(())
}

/// Whether `dir` is a directory the current process may create entries in.
///
/// Asks the kernel (`access(2)` with `W_OK | X_OK`), so ownership, group
/// membership, ACLs and read-only mounts are all taken into account.
pub fn is_writable_dir(dir: &Path) -> bool {
    if !dir.is_dir() {
        return false;
    }
    let Ok(cpath) = CString::new(dir.as_os_str().as_bytes()) else {
        return false;
    };
    // SAFETY: `cpath` is a valid NUL-terminated string for the whole call
    unsafe { libc::access(cpath.as_ptr(), libc::W_OK | libc::X_OK) == 0 }
}

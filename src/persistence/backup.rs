//! Crash-safe replacement of project files.
//!
//! Saving writes `.<file>.sav`, keeps a copy of the previous file as
//! `<file>~` while the new one is moved into place, and drops the copy once
//! the rename succeeded. A `<file>~` found at load time therefore means the
//! last save was interrupted, and the copy is put back before reading.

use log::{debug, error, info, warn};
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

fn sibling(path: &Path, prefix: &str, suffix: &str) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{}{}{}", prefix, name, suffix))
}

pub fn backup_path(path: &Path) -> PathBuf {
    sibling(path, "", "~")
}

pub fn temp_path(path: &Path) -> PathBuf {
    sibling(path, ".", ".sav")
}

fn restored_aside_path(path: &Path) -> PathBuf {
    sibling(path, "", ".back")
}

/// Replace `path` with what `write` produces.
///
/// On error the previous content is still available, either untouched at
/// `path` or as the `<file>~` copy.
pub fn write_atomically<F>(path: &Path, write: F) -> io::Result<()>
where
    F: FnOnce(&mut dyn Write) -> io::Result<()>,
{
    let backup = backup_path(path);
    let has_backup = match fs::copy(path, &backup) {
        Ok(_) => true,
        Err(e) if e.kind() == io::ErrorKind::NotFound => false,
        Err(e) => return Err(e),
    };

    let tmp = temp_path(path);
    {
        let mut out = BufWriter::new(fs::File::create(&tmp)?);
        write(&mut out)?;
        out.flush()?;
        out.get_ref().sync_all()?;
    }
    fs::rename(&tmp, path)?;

    if has_backup {
        fs::remove_file(&backup)?;
    }
    debug!("Project written to {:?}", path);
    Ok(())
}

/// Put back the copy left by an interrupted save.
///
/// Returns `true` when a backup was restored. The file found in place is kept
/// aside as `<file>.back` for the duration of the swap and put back if the
/// swap fails.
pub fn restore_backup(path: &Path) -> io::Result<bool> {
    let backup = backup_path(path);
    if !backup.exists() {
        return Ok(false);
    }

    let aside = restored_aside_path(path);
    let moved_aside = match fs::rename(path, &aside) {
        Ok(()) => {
            info!("Current project file kept aside as {:?}", aside);
            true
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => false,
        Err(e) => {
            error!("Cannot move {:?} aside: {}", path, e);
            return Err(e);
        }
    };

    if let Err(e) = fs::rename(&backup, path) {
        warn!("Cannot restore backup {:?}: {}", backup, e);
        if moved_aside {
            fs::rename(&aside, path)?;
        }
        return Err(e);
    }

    warn!("A backup of the project from an interrupted save has been restored");
    if moved_aside {
        fs::remove_file(&aside)?;
    }
    Ok(true)
}

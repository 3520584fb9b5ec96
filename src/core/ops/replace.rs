//! core::ops::replace
//!
//! Crash-safe replacement of a file.
//!
//! # Algorithm
//!
//! 1. Write the new contents to `<file>.tmp` in the same directory and fsync
//! 2. Rename the current file to a free backup name `<file>.bak<N>`
//! 3. Rename the temporary file to the current name
//! 4. Delete the backup
//!
//! If step 3 fails the backup is renamed back to the current name. A crash
//! between steps leaves either the untouched current file (crash after 1) or
//! exactly one of {current, backup} (crash after 2), and whichever survives
//! is a complete file. [`list_backups`] and [`restore_backup`] let a reader
//! finish the recovery.
//!
//! Callers must hold the store lock; nothing here coordinates writers.
//!
//! # Fault Injection
//!
//! Under `cfg(test)` or the `fault_injection` feature, [`fault_injection`]
//! can stop the algorithm at each step to simulate a crash.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

/// Highest backup suffix probed before giving up.
const MAX_BACKUP_SLOTS: u32 = 1000;

/// Errors from file replacement.
///
/// In every case the previously committed file is left in place (or, after a
/// simulated crash, recoverable from its backup).
#[derive(Debug, Error)]
pub enum ReplaceError {
    #[error("failed to write temporary file {}: {source}", .path.display())]
    TempWrite { path: PathBuf, source: io::Error },

    #[error("failed to move {} to a backup: {source}", .path.display())]
    Backup { path: PathBuf, source: io::Error },

    #[error("failed to install {}: {source}", .path.display())]
    Install {
        path: PathBuf,
        source: io::Error,
        /// Whether the previous file was put back under its name.
        restored: bool,
    },
}

/// Replace `target` with `contents`.
pub fn replace_file(target: &Path, contents: &[u8]) -> Result<(), ReplaceError> {
    replace_inner(target, contents, false)
}

/// Replace `target` with `contents`, readable by the owner only on unix.
pub fn replace_private_file(target: &Path, contents: &[u8]) -> Result<(), ReplaceError> {
    replace_inner(target, contents, true)
}

fn replace_inner(target: &Path, contents: &[u8], private: bool) -> Result<(), ReplaceError> {
    let temp = temp_path(target);
    write_temp(&temp, contents, private).map_err(|source| ReplaceError::TempWrite {
        path: temp.clone(),
        source,
    })?;

    #[cfg(any(test, feature = "fault_injection"))]
    if fault_injection::hit(fault_injection::FaultPoint::AfterTempWrite) {
        return Err(ReplaceError::TempWrite {
            path: temp,
            source: fault_injection::simulated(),
        });
    }

    let backup = move_aside(target)?;

    #[cfg(any(test, feature = "fault_injection"))]
    if fault_injection::hit(fault_injection::FaultPoint::AfterBackup) {
        return Err(ReplaceError::Install {
            path: target.to_path_buf(),
            source: fault_injection::simulated(),
            restored: false,
        });
    }

    if let Err(source) = install(&temp, target) {
        let restored = match &backup {
            Some(backup) => match fs::rename(backup, target) {
                Ok(()) => true,
                Err(e) => {
                    warn!(
                        backup = %backup.display(),
                        error = %e,
                        "failed to restore backup after failed install"
                    );
                    false
                }
            },
            None => false,
        };
        let _ = fs::remove_file(&temp);
        return Err(ReplaceError::Install {
            path: target.to_path_buf(),
            source,
            restored,
        });
    }

    if let Some(backup) = backup {
        if let Err(e) = fs::remove_file(&backup) {
            warn!(backup = %backup.display(), error = %e, "failed to remove backup");
        }
    }

    debug!(path = %target.display(), bytes = contents.len(), "file replaced");
    Ok(())
}

/// Temporary file used while replacing `target`.
pub fn temp_path(target: &Path) -> PathBuf {
    sibling(target, ".tmp")
}

/// Backup name with suffix `n`.
pub fn backup_path(target: &Path, n: u32) -> PathBuf {
    sibling(target, &format!(".bak{}", n))
}

fn sibling(target: &Path, suffix: &str) -> PathBuf {
    let mut name = target.file_name().unwrap_or_default().to_os_string();
    name.push(suffix);
    target.with_file_name(name)
}

fn write_temp(temp: &Path, contents: &[u8], private: bool) -> io::Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(temp)?;

    #[cfg(unix)]
    if private {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(0o600))?;
    }
    #[cfg(not(unix))]
    let _ = private;

    file.write_all(contents)?;
    file.sync_all()?;
    Ok(())
}

/// Rename `target` to the first usable backup slot.
///
/// A slot is usable when nothing exists under its name or when the stale
/// backup there could be deleted. Returns `None` when there is no current
/// file to move.
fn move_aside(target: &Path) -> Result<Option<PathBuf>, ReplaceError> {
    if !target.exists() {
        return Ok(None);
    }

    let mut last_error = None;
    for n in 0..MAX_BACKUP_SLOTS {
        let candidate = backup_path(target, n);
        if candidate.exists() {
            if let Err(e) = fs::remove_file(&candidate) {
                last_error = Some(e);
                continue;
            }
        }

        match fs::rename(target, &candidate) {
            Ok(()) => return Ok(Some(candidate)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => last_error = Some(e),
        }
    }

    Err(ReplaceError::Backup {
        path: target.to_path_buf(),
        source: last_error
            .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "no free backup slot")),
    })
}

fn install(temp: &Path, target: &Path) -> io::Result<()> {
    #[cfg(any(test, feature = "fault_injection"))]
    if fault_injection::hit(fault_injection::FaultPoint::Install) {
        return Err(fault_injection::simulated());
    }

    fs::rename(temp, target)
}

/// Existing backups of `target`, ordered by suffix.
pub fn list_backups(target: &Path) -> io::Result<Vec<PathBuf>> {
    let Some(dir) = target.parent() else {
        return Ok(Vec::new());
    };
    let prefix = format!(
        "{}.bak",
        target.file_name().unwrap_or_default().to_string_lossy()
    );

    let mut found: Vec<(u32, PathBuf)> = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if let Some(n) = name
            .strip_prefix(&prefix)
            .and_then(|suffix| suffix.parse::<u32>().ok())
        {
            found.push((n, entry.path()));
        }
    }

    found.sort_by_key(|(n, _)| *n);
    Ok(found.into_iter().map(|(_, path)| path).collect())
}

/// Put `backup` back under the name `target`.
///
/// Refuses to overwrite an existing `target`.
pub fn restore_backup(backup: &Path, target: &Path) -> io::Result<()> {
    if target.exists() {
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("{} already exists", target.display()),
        ));
    }
    fs::rename(backup, target)
}

/// Fault injection for crash-safety tests.
///
/// State is thread-local, so tests running in parallel do not interfere.
#[cfg(any(test, feature = "fault_injection"))]
pub mod fault_injection {
    use std::cell::Cell;
    use std::io;

    /// Step of the replace algorithm at which to inject a fault.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum FaultPoint {
        /// Stop after the temporary file is written (simulated crash).
        AfterTempWrite,
        /// Stop after the current file was moved to its backup (simulated crash).
        AfterBackup,
        /// Make the final rename fail; the normal restore path runs.
        Install,
    }

    thread_local! {
        static ARMED: Cell<Option<FaultPoint>> = const { Cell::new(None) };
    }

    /// Arm a one-shot fault at `point`.
    pub fn set_fault(point: FaultPoint) {
        ARMED.with(|c| c.set(Some(point)));
    }

    /// Disarm any pending fault.
    pub fn reset() {
        ARMED.with(|c| c.set(None));
    }

    /// Whether a fault is armed on this thread.
    pub fn is_armed() -> bool {
        ARMED.with(|c| c.get().is_some())
    }

    /// Consume the armed fault if it matches `point`.
    pub(crate) fn hit(point: FaultPoint) -> bool {
        ARMED.with(|c| {
            if c.get() == Some(point) {
                c.set(None);
                true
            } else {
                false
            }
        })
    }

    pub(crate) fn simulated() -> io::Error {
        io::Error::new(
            io::ErrorKind::Other,
            "simulated crash for fault injection testing",
        )
    }
}

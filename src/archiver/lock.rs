//! Single-instance lock for a working directory.
//!
//! The lock file must be absent for a daemon to start. It is removed on every
//! exit path: guard drop, fatal error, or a termination signal.

use crate::error::ArchiveErrorCode;
use anyhow::{Context, Result};
use chrono::Local;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use signal_hook::consts::signal::{SIGABRT, SIGHUP, SIGINT, SIGQUIT, SIGTERM, SIGXCPU};
use signal_hook::iterator::Signals;
use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

pub const SHUTDOWN_SIGNALS: [i32; 6] = [SIGHUP, SIGINT, SIGQUIT, SIGABRT, SIGTERM, SIGXCPU];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockPayload {
    pub pid: u32,
    pub build_uuid: String,
    pub start_time: String,
    pub workdir: String,
    pub remote_base: String,
}

#[derive(Debug)]
struct LockState {
    path: PathBuf,
    released: AtomicBool,
    file: Mutex<Option<File>>,
}

impl LockState {
    fn release(&self) -> bool {
        if self.released.swap(true, Ordering::SeqCst) {
            return false;
        }
        if let Ok(mut file) = self.file.lock() {
            if let Some(file) = file.take() {
                let _ = FileExt::unlock(&file);
            }
        }
        match fs::remove_file(&self.path) {
            Ok(()) => true,
            Err(err) if err.kind() == ErrorKind::NotFound => true,
            Err(err) => {
                tracing::warn!(path = %self.path.display(), error = %err, "failed to remove lock file");
                false
            }
        }
    }
}

/// Holds the working-directory lock; dropping it removes the lock file.
#[derive(Debug)]
pub struct LockGuard {
    state: Arc<LockState>,
}

impl LockGuard {
    pub fn path(&self) -> &Path {
        &self.state.path
    }

    #[cfg(test)]
    pub fn is_released(&self) -> bool {
        self.state.released.load(Ordering::SeqCst)
    }

    /// Idempotent. Returns `true` only for the call that removed the file.
    pub fn release(&self) -> bool {
        self.state.release()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            state: Arc::clone(&self.state),
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.state.release();
    }
}

/// Shares the guard's cleanup with a signal listener without owning the lock.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    state: Arc<LockState>,
}

impl ShutdownHandle {
    pub fn release(&self) -> bool {
        self.state.release()
    }
}

pub fn acquire(path: &Path, workdir: &Path, remote_base: &str) -> Result<LockGuard> {
    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == ErrorKind::AlreadyExists => {
            anyhow::bail!(
                "{}: {} already exists; make sure no other instance is running in {} (use `simarchive stop` to clear a stale lock)",
                ArchiveErrorCode::E001Locked.as_str(),
                path.display(),
                workdir.display()
            );
        }
        Err(err) => {
            return Err(err).with_context(|| format!("failed to create {}", path.display()));
        }
    };

    // From here on the guard owns cleanup, so a failure below removes the file.
    let guard = LockGuard {
        state: Arc::new(LockState {
            path: path.to_path_buf(),
            released: AtomicBool::new(false),
            file: Mutex::new(None),
        }),
    };

    FileExt::try_lock_exclusive(&file)
        .with_context(|| format!("failed to lock {}", path.display()))?;

    let payload = LockPayload {
        pid: std::process::id(),
        build_uuid: env!("BUILD_UUID").to_string(),
        start_time: Local::now().to_rfc3339(),
        workdir: workdir.display().to_string(),
        remote_base: remote_base.to_string(),
    };
    let body = serde_json::to_string_pretty(&payload)?;
    file.write_all(format!("{body}\n").as_bytes())
        .with_context(|| format!("failed to write {}", path.display()))?;
    file.flush()?;
    if let Ok(mut slot) = guard.state.file.lock() {
        *slot = Some(file);
    }

    tracing::debug!(path = %path.display(), pid = payload.pid, "acquired lock");
    Ok(guard)
}

pub fn read_payload(path: &Path) -> Result<LockPayload> {
    let raw =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let payload = serde_json::from_str(&raw)
        .with_context(|| format!("invalid lock payload in {}", path.display()))?;
    Ok(payload)
}

/// Whether some process currently holds the advisory lock on `path`.
pub fn is_held(path: &Path) -> Result<bool> {
    let file = match OpenOptions::new().read(true).open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(err).with_context(|| format!("failed to open {}", path.display())),
    };
    match FileExt::try_lock_shared(&file) {
        Ok(()) => {
            let _ = FileExt::unlock(&file);
            Ok(false)
        }
        Err(err) if err.kind() == io::ErrorKind::WouldBlock => Ok(true),
        Err(err) if err.raw_os_error() == fs2::lock_contended_error().raw_os_error() => Ok(true),
        Err(err) => Err(err).with_context(|| format!("failed to probe {}", path.display())),
    }
}

/// Release the lock and exit when a termination signal arrives. Any external
/// command still running is abandoned.
pub fn install_shutdown_hook(guard: &LockGuard) -> Result<()> {
    let mut signals =
        Signals::new(SHUTDOWN_SIGNALS).context("failed to register shutdown signals")?;
    let handle = guard.shutdown_handle();
    thread::Builder::new()
        .name("shutdown-hook".to_string())
        .spawn(move || {
            if let Some(signal) = signals.forever().next() {
                tracing::info!(signal, "caught terminating signal, shutting down");
                handle.release();
                std::process::exit(0);
            }
        })
        .context("failed to spawn shutdown hook thread")?;
    Ok(())
}

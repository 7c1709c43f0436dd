//! Restart marker and relaunch loop
//!
//! A watchdog-forced shutdown leaves a marker file behind and exits with
//! `RESTART_EXIT_CODE`. Under `--supervise` the parent process relaunches the
//! crawler for as long as it keeps exiting with that code. The relaunched
//! crawler consumes the marker and waits a grace period before resuming.

use crate::{HarvestError, Result};
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Exit code meaning "checkpoint saved, relaunch me"
pub const RESTART_EXIT_CODE: i32 = 75;

/// Presence-only marker file announcing a forced restart
#[derive(Debug, Clone)]
pub struct RestartMarker {
    path: PathBuf,
}

impl RestartMarker {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Creates the marker
    pub fn write(&self) -> io::Result<()> {
        std::fs::write(&self.path, b"restart")
    }

    /// Deletes the marker if present
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - A marker was found and removed
    /// * `Ok(false)` - No marker existed
    pub fn consume(&self) -> io::Result<bool> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Runs `program` with `args` until it exits with something other than
/// `RESTART_EXIT_CODE`
///
/// # Returns
///
/// * `Ok(code)` - The first exit code that was not a restart request
/// * `Err(HarvestError)` - The child could not be spawned or was killed by a signal
pub async fn supervise(program: &Path, args: &[OsString]) -> Result<i32> {
    let mut launches: u32 = 0;

    loop {
        launches += 1;
        tracing::info!("Launching crawler (launch {})", launches);

        let status = Command::new(program).args(args).status().await?;

        match status.code() {
            Some(RESTART_EXIT_CODE) => {
                tracing::warn!("Crawler requested a restart; relaunching");
            }
            Some(code) => {
                tracing::info!("Crawler exited with code {} after {} launches", code, launches);
                return Ok(code);
            }
            None => {
                return Err(HarvestError::Supervisor(format!(
                    "crawler terminated by signal ({})",
                    status
                )));
            }
        }
    }
}

// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Bounded-duration recordings.
//!
//! A recording is a single ffmpeg transcode of the camera stream into one
//! file. ffmpeg stops itself after [`RecordingLimits::duration`]; the process
//! is killed if it is still alive at [`RecordingLimits::kill_guard`].

use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::{RecorderError, Result};

/// Recording length.
pub const RECORDING_DURATION: Duration = Duration::from_secs(30);
/// Outer bound after which a recording process is killed.
pub const RECORDING_KILL_GUARD: Duration = Duration::from_secs(35);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordingLimits {
    pub duration: Duration,
    pub kill_guard: Duration,
}

impl Default for RecordingLimits {
    fn default() -> Self {
        Self { duration: RECORDING_DURATION, kill_guard: RECORDING_KILL_GUARD }
    }
}

/// Starts recording processes. Must not wait for them.
#[async_trait]
pub trait RecordingLauncher: Send + Sync {
    async fn launch(&self, source: &str, output: &Path, duration: Duration) -> Result<Child>;
}

/// [`RecordingLauncher`] running an ffmpeg transcode to H.264/AAC at 960x720.
pub struct FfmpegRecorder {
    binary: PathBuf,
}

impl FfmpegRecorder {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self { binary: binary.into() }
    }
}

#[async_trait]
impl RecordingLauncher for FfmpegRecorder {
    async fn launch(&self, source: &str, output: &Path, duration: Duration) -> Result<Child> {
        let secs = duration.as_secs().max(1).to_string();
        Command::new(&self.binary)
            .args(["-y", "-rtsp_transport", "tcp", "-i", source, "-t", secs.as_str()])
            .args(["-vf", "scale=960:720"])
            .args(["-c:v", "libx264", "-preset", "ultrafast"])
            .args(["-c:a", "aac"])
            .args(["-threads", "1"])
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                RecorderError::Launch(format!("cannot run {}: {e}", self.binary.display()))
            })
    }
}

/// How a recording process came to an end.
#[derive(Debug)]
pub enum RecordingExit {
    /// Exited on its own.
    Finished(ExitStatus),
    /// Still running at the kill-guard and killed.
    KillGuard(ExitStatus),
    /// Killed because the recorder is shutting down.
    Cancelled(ExitStatus),
    /// The exit status could not be collected.
    WaitFailed(io::Error),
}

impl RecordingExit {
    pub fn is_clean(&self) -> bool {
        matches!(self, RecordingExit::Finished(status) if status.success())
    }
}

/// One in-flight recording, owned by its reaper until the process exits.
#[derive(Debug)]
pub struct RecordingJob {
    pub source: String,
    pub output_path: PathBuf,
    pub started_at: NaiveDateTime,
    pub limits: RecordingLimits,
    child: Child,
}

impl RecordingJob {
    pub fn new(
        source: String,
        output_path: PathBuf,
        started_at: NaiveDateTime,
        limits: RecordingLimits,
        child: Child,
    ) -> Self {
        Self { source, output_path, started_at, limits, child }
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    /// Wait for the process to exit, killing it at the kill-guard or on
    /// `cancel`. The exit status is collected exactly once.
    pub async fn wait_for_exit(&mut self, cancel: &CancellationToken) -> RecordingExit {
        enum Wake {
            Exited(io::Result<ExitStatus>),
            GuardElapsed,
            Cancelled,
        }

        let wake = tokio::select! {
            res = tokio::time::timeout(self.limits.kill_guard, self.child.wait()) => match res {
                Ok(status) => Wake::Exited(status),
                Err(_) => Wake::GuardElapsed,
            },
            _ = cancel.cancelled() => Wake::Cancelled,
        };

        match wake {
            Wake::Exited(Ok(status)) => RecordingExit::Finished(status),
            Wake::Exited(Err(e)) => RecordingExit::WaitFailed(e),
            Wake::GuardElapsed => {
                warn!(
                    path = %self.output_path.display(),
                    guard = ?self.limits.kill_guard,
                    "Recording outlived its kill-guard, killing"
                );
                match self.kill().await {
                    Ok(status) => RecordingExit::KillGuard(status),
                    Err(e) => RecordingExit::WaitFailed(e),
                }
            }
            Wake::Cancelled => match self.kill().await {
                Ok(status) => RecordingExit::Cancelled(status),
                Err(e) => RecordingExit::WaitFailed(e),
            },
        }
    }

    async fn kill(&mut self) -> io::Result<ExitStatus> {
        // Fails only if the process already exited; the wait below still reaps it.
        if let Err(e) = self.child.start_kill() {
            warn!(error = %e, "Failed to signal recording process");
        }
        self.child.wait().await
    }
}

// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Recording controller: the sampling loop and the recording state machine.
//!
//! ```text
//!            classify == true && Idle
//!   Idle ───────────────────────────────→ Recording
//!    ▲                                       │
//!    └───────── reaper: process exited ──────┘
//! ```
//!
//! The sampling loop (capture → classify → maybe start → sleep) never waits
//! on a recording. Each started recording gets one reaper task that waits
//! for the process to exit and then releases the busy flag. The loop only
//! ever moves the flag Idle → Recording and the reaper only ever moves it
//! Recording → Idle.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDateTime};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::classifier::Classifier;
use crate::recording::{RecordingExit, RecordingJob, RecordingLauncher, RecordingLimits};
use crate::sampler::FrameSource;
use crate::storage::layout;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingState {
    Idle,
    Recording,
}

/// The busy flag. Cloning shares the same flag.
#[derive(Debug, Clone, Default)]
pub struct BusyFlag {
    recording: Arc<AtomicBool>,
}

impl BusyFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> RecordingState {
        if self.recording.load(Ordering::Acquire) {
            RecordingState::Recording
        } else {
            RecordingState::Idle
        }
    }

    pub fn is_recording(&self) -> bool {
        self.state() == RecordingState::Recording
    }

    /// Move Idle → Recording. Returns `None` if already recording.
    ///
    /// The returned guard moves the flag back to Idle when dropped.
    pub fn try_acquire(&self) -> Option<BusyGuard> {
        self.recording
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| BusyGuard { recording: self.recording.clone() })
    }
}

/// Proof that the flag is held. Exactly one exists while recording.
#[derive(Debug)]
pub struct BusyGuard {
    recording: Arc<AtomicBool>,
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.recording.store(false, Ordering::Release);
    }
}

/// Result of one loop iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    CaptureFailed,
    ClassificationFailed,
    NoMotion,
    /// Motion seen while a recording is already running; ignored.
    AlreadyRecording,
    /// The day directory could not be created; nothing was launched.
    PrepareFailed,
    LaunchFailed,
    RecordingStarted(PathBuf),
}

/// Static parameters of the loop.
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub source: String,
    pub base_path: PathBuf,
    pub extension: String,
    pub interval: Duration,
    pub limits: RecordingLimits,
}

pub struct Controller<S, C, L> {
    settings: ControllerSettings,
    sampler: S,
    classifier: C,
    launcher: L,
    busy: BusyFlag,
    reapers: TaskTracker,
    cancel: CancellationToken,
}

impl<S, C, L> Controller<S, C, L>
where
    S: FrameSource,
    C: Classifier,
    L: RecordingLauncher,
{
    pub fn new(settings: ControllerSettings, sampler: S, classifier: C, launcher: L) -> Self {
        Self {
            settings,
            sampler,
            classifier,
            launcher,
            busy: BusyFlag::new(),
            reapers: TaskTracker::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn settings(&self) -> &ControllerSettings {
        &self.settings
    }

    pub fn state(&self) -> RecordingState {
        self.busy.state()
    }

    pub fn busy_flag(&self) -> BusyFlag {
        self.busy.clone()
    }

    /// Token that stops [`run`](Self::run) and kills any active recording.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the sampling loop until cancelled.
    pub async fn run(&self) {
        info!(
            source = %self.settings.source,
            base_path = %self.settings.base_path.display(),
            interval = ?self.settings.interval,
            "Sampling loop started"
        );

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = self.step() => {}
            }
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.settings.interval) => {}
            }
        }

        info!("Sampling loop stopped");
    }

    /// One iteration: capture, classify, and start a recording if warranted.
    pub async fn step(&self) -> StepOutcome {
        let frame = match self.sampler.capture(&self.settings.source).await {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "Failed to capture frame");
                return StepOutcome::CaptureFailed;
            }
        };

        match self.classifier.classify(frame).await {
            Ok(true) => self.trigger(Local::now().naive_local()).await,
            Ok(false) => {
                debug!("No motion");
                StepOutcome::NoMotion
            }
            Err(e) => {
                warn!(error = %e, "Detection failed");
                StepOutcome::ClassificationFailed
            }
        }
    }

    /// Handle a positive classification observed at `at`.
    pub async fn trigger(&self, at: NaiveDateTime) -> StepOutcome {
        let Some(guard) = self.busy.try_acquire() else {
            debug!("Motion detected while recording, ignoring");
            return StepOutcome::AlreadyRecording;
        };

        let output = layout::output_path(&self.settings.base_path, at, &self.settings.extension);
        let day_dir = layout::day_dir(&self.settings.base_path, at);
        if let Err(e) = layout::ensure_dir(&day_dir).await {
            error!(error = %e, "Failed to prepare output path");
            return StepOutcome::PrepareFailed;
        }

        info!(path = %output.display(), "Motion detected, starting recording");

        let limits = self.settings.limits;
        let child = match self
            .launcher
            .launch(&self.settings.source, &output, limits.duration)
            .await
        {
            Ok(child) => child,
            Err(e) => {
                error!(error = %e, path = %output.display(), "Failed to start recording");
                return StepOutcome::LaunchFailed;
            }
        };

        let job = RecordingJob::new(self.settings.source.clone(), output.clone(), at, limits, child);
        self.reapers.spawn(reap(job, guard, self.cancel.clone()));
        StepOutcome::RecordingStarted(output)
    }

    /// Stop the loop, kill any active recording, and wait for every reaper.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.reapers.close();
        self.reapers.wait().await;
    }

    /// Wait for outstanding reapers without cancelling them.
    pub async fn wait_for_reapers(&self) {
        self.reapers.close();
        self.reapers.wait().await;
        self.reapers.reopen();
    }
}

/// Reaper: sole owner of the Recording → Idle transition for `job`.
async fn reap(mut job: RecordingJob, guard: BusyGuard, cancel: CancellationToken) {
    let path = job.output_path.display().to_string();
    info!(path = %path, pid = ?job.pid(), "Recording in progress");

    match job.wait_for_exit(&cancel).await {
        RecordingExit::Finished(status) if status.success() => {
            info!(path = %path, "Recording finished");
        }
        RecordingExit::Finished(status) => {
            warn!(path = %path, %status, "Recording process exited abnormally");
        }
        RecordingExit::KillGuard(status) => {
            warn!(path = %path, %status, "Recording killed at kill-guard");
        }
        RecordingExit::Cancelled(status) => {
            info!(path = %path, %status, "Recording stopped for shutdown");
        }
        RecordingExit::WaitFailed(e) => {
            error!(path = %path, error = %e, "Failed to wait for recording process");
        }
    }

    drop(guard);
}

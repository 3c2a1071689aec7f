// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Motion recorder: wires the ffmpeg sampler, the HTTP classifier and the
//! ffmpeg recorder into a [`Controller`] and owns its sampling task.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::classifier::HttpClassifier;
use crate::config::Config;
use crate::controller::{Controller, ControllerSettings, RecordingState};
use crate::error::{RecorderError, Result};
use crate::recording::{FfmpegRecorder, RecordingLimits};
use crate::sampler::FfmpegSampler;

/// Controller with the production collaborators.
pub type LiveController = Controller<FfmpegSampler, HttpClassifier, FfmpegRecorder>;

/// Build a [`LiveController`] from a validated [`Config`].
pub fn build_controller(config: &Config) -> Result<LiveController> {
    let settings = ControllerSettings {
        source: config.stream.url.clone(),
        base_path: config.storage.base_path.clone(),
        extension: config.storage.extension.clone(),
        interval: Duration::from_secs(config.sampling.interval_secs),
        limits: RecordingLimits::default(),
    };
    let sampler = FfmpegSampler::new(
        &config.ffmpeg.binary,
        Duration::from_secs(config.sampling.capture_timeout_secs),
    );
    let classifier = HttpClassifier::new(&config.classifier.endpoint)?;
    let recorder = FfmpegRecorder::new(&config.ffmpeg.binary);

    Ok(Controller::new(settings, sampler, classifier, recorder))
}

/// Top-level handle to a running recorder.
pub struct MotionRecorder {
    controller: Arc<LiveController>,
    loop_handle: JoinHandle<()>,
}

impl MotionRecorder {
    /// Create the base directory and spawn the sampling loop.
    pub fn start(config: &Config) -> Result<Self> {
        std::fs::create_dir_all(&config.storage.base_path)
            .map_err(|e| RecorderError::Storage(format!("Cannot create base_path: {e}")))?;

        let controller = Arc::new(build_controller(config)?);
        let looped = controller.clone();
        let loop_handle = tokio::spawn(async move { looped.run().await });

        info!(
            source = %config.stream.url,
            classifier = %config.classifier.endpoint,
            "Motion recorder started"
        );

        Ok(MotionRecorder { controller, loop_handle })
    }

    pub fn state(&self) -> RecordingState {
        self.controller.state()
    }

    /// Stop sampling, kill any active recording and wait for it to be reaped.
    pub async fn shutdown(self) {
        info!("Motion recorder shutting down…");
        self.controller.shutdown().await;
        if let Err(e) = self.loop_handle.await {
            warn!(error = %e, "Sampling task did not stop cleanly");
        }
        info!("Motion recorder stopped");
    }
}

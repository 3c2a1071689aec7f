// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Still-frame sampling from the camera stream.
//!
//! Each call runs one short-lived ffmpeg process:
//!   rtsp (tcp) → decode first frame → png → stdout
//!
//! The process is always reaped before `capture` returns.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::process::Command;
use tracing::debug;

use crate::error::{RecorderError, Result};

/// A single encoded still image. Lives for one loop iteration.
#[derive(Debug, Clone)]
pub struct Frame {
    pub data: Bytes,
}

impl Frame {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Something that can pull one frame from a stream.
#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Grab one frame from `source`. Launch failure, non-zero exit and empty
    /// output all surface as [`RecorderError::Capture`].
    async fn capture(&self, source: &str) -> Result<Frame>;
}

/// [`FrameSource`] backed by the ffmpeg CLI.
pub struct FfmpegSampler {
    binary: PathBuf,
    timeout: Duration,
}

impl FfmpegSampler {
    pub fn new(binary: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self { binary: binary.into(), timeout }
    }

    fn args(source: &str) -> [&str; 11] {
        [
            "-rtsp_transport", "tcp",
            "-i", source,
            "-frames:v", "1",
            "-f", "image2pipe",
            "-vcodec", "png",
            "-",
        ]
    }
}

#[async_trait]
impl FrameSource for FfmpegSampler {
    async fn capture(&self, source: &str) -> Result<Frame> {
        let output = Command::new(&self.binary)
            .args(Self::args(source))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .output();

        // Dropping the `output` future on timeout kills the child.
        let output = match tokio::time::timeout(self.timeout, output).await {
            Ok(Ok(out)) => out,
            Ok(Err(e)) => {
                return Err(RecorderError::Capture(format!(
                    "cannot run {}: {e}",
                    self.binary.display()
                )))
            }
            Err(_) => {
                return Err(RecorderError::Capture(format!(
                    "no frame within {:?}",
                    self.timeout
                )))
            }
        };

        if !output.status.success() {
            return Err(RecorderError::Capture(format!("ffmpeg exited with {}", output.status)));
        }
        if output.stdout.is_empty() {
            return Err(RecorderError::Capture("ffmpeg produced no output".into()));
        }

        debug!(bytes = output.stdout.len(), "Frame captured");
        Ok(Frame::new(output.stdout))
    }
}

// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Frame capture failed: {0}")]
    Capture(String),

    /// The classifier could not be reached or did not answer in time.
    /// A negative verdict is never reported through this variant.
    #[error("Classification failed: {0}")]
    Classification(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Recording launch failed: {0}")]
    Launch(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RecorderError>;

// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Recording file layout.
//!
//! ```text
//! <base_path>/
//!   20240305/
//!     motion_070809.mp4
//!     motion_071532.mp4
//!   20240306/
//!     ...
//! ```
//!
//! One directory per calendar day, one file per trigger named by time of day.
//! Two triggers in the same second map to the same file; the later one
//! overwrites the earlier.

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;

use crate::error::{RecorderError, Result};

/// Directory holding all recordings of the day `at` falls on.
pub fn day_dir(base_path: &Path, at: NaiveDateTime) -> PathBuf {
    base_path.join(at.format("%Y%m%d").to_string())
}

/// Output file for a recording triggered at `at`.
pub fn output_path(base_path: &Path, at: NaiveDateTime, extension: &str) -> PathBuf {
    day_dir(base_path, at).join(format!("motion_{}.{extension}", at.format("%H%M%S")))
}

/// Create `dir` and any missing parents. Succeeds if it already exists.
pub async fn ensure_dir(dir: &Path) -> Result<()> {
    tokio::fs::create_dir_all(dir).await.map_err(|e| {
        RecorderError::Storage(format!("Cannot create directory {}: {e}", dir.display()))
    })
}

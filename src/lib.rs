// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

pub mod classifier;
pub mod config;
pub mod controller;
pub mod error;
pub mod manager;
pub mod recording;
pub mod sampler;
pub mod storage;

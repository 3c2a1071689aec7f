// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Detection service client.
//!
//! The frame is POSTed as the raw request body. Only the response status is
//! interpreted: 2xx means something of interest is in the frame, any other
//! status means nothing is. Transport failures are errors.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Url};
use tracing::debug;

use crate::error::{RecorderError, Result};
use crate::sampler::Frame;

/// Round-trip limit for one classification request.
pub const CLASSIFY_TIMEOUT: Duration = Duration::from_secs(5);

#[async_trait]
pub trait Classifier: Send + Sync {
    /// `Ok(true)` if the service reports interest, `Ok(false)` if it answers
    /// anything else, `Err` if it could not be asked.
    async fn classify(&self, frame: Frame) -> Result<bool>;
}

/// [`Classifier`] talking HTTP to the detection service.
pub struct HttpClassifier {
    client: Client,
    endpoint: Url,
}

impl HttpClassifier {
    pub fn new(endpoint: &str) -> Result<Self> {
        Self::with_timeout(endpoint, CLASSIFY_TIMEOUT)
    }

    pub fn with_timeout(endpoint: &str, timeout: Duration) -> Result<Self> {
        let endpoint = Url::parse(endpoint).map_err(|e| {
            RecorderError::Classification(format!("invalid endpoint '{endpoint}': {e}"))
        })?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RecorderError::Classification(format!("cannot build client: {e}")))?;
        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl Classifier for HttpClassifier {
    async fn classify(&self, frame: Frame) -> Result<bool> {
        let resp = self
            .client
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(frame.data)
            .send()
            .await
            .map_err(|e| {
                let kind = if e.is_timeout() { "timed out" } else { "request failed" };
                RecorderError::Classification(format!("{kind}: {e}"))
            })?;

        let status = resp.status();
        debug!(%status, "Classifier responded");
        Ok(status.is_success())
    }
}

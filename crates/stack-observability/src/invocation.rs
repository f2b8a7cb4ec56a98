//! Structured record of one handler invocation.

use std::time::Duration;

use serde::Serialize;

/// What a workload reports about one invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvocationRecord {
    pub endpoint: String,
    pub request_id: String,
    pub path: String,
    pub status_code: u16,
    /// Handler duration in microseconds.
    pub elapsed_us: u64,
}

impl InvocationRecord {
    pub fn new(
        endpoint: impl Into<String>,
        request_id: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            request_id: request_id.into(),
            path: path.into(),
            status_code: 200,
            elapsed_us: 0,
        }
    }

    pub fn with_status(mut self, status_code: u16) -> Self {
        self.status_code = status_code;
        self
    }

    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed_us = elapsed.as_micros().min(u64::MAX as u128) as u64;
        self
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| self.request_id.clone())
    }

    /// Emit as a single `tracing` event.
    pub fn emit(&self) {
        if self.status_code >= 500 {
            tracing::error!(
                endpoint = %self.endpoint,
                request_id = %self.request_id,
                path = %self.path,
                status = self.status_code,
                elapsed_us = self.elapsed_us,
                "invocation failed"
            );
        } else {
            tracing::info!(
                endpoint = %self.endpoint,
                request_id = %self.request_id,
                path = %self.path,
                status = self.status_code,
                elapsed_us = self.elapsed_us,
                "invocation complete"
            );
        }
    }
}

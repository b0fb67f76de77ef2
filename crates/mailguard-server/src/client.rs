//! Client for the streaming run endpoint

use mailguard_core::{Error, EventStreamReader, Result, StreamEvent};
use mailguard_policy::ReviewRequest;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error};

use crate::routes::RunRequest;

/// Submits drafts to a running server and decodes the event stream
pub struct RunClient {
    base_url: String,
    http_client: reqwest::Client,
}

impl RunClient {
    /// Create a client for the server at `base_url`
    ///
    /// `connect_timeout` bounds connection setup only; runs may stream for
    /// as long as the loop takes.
    pub fn new(base_url: impl Into<String>, connect_timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| Error::config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.into(),
            http_client,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/api/run-agent", self.base_url.trim_end_matches('/'))
    }

    /// Start a run and hand every event to `handler` as it arrives
    ///
    /// The next record is only read once `handler` has finished with the
    /// previous one. Returns the number of events handled.
    pub async fn stream_run<F, Fut>(&self, request: &ReviewRequest, handler: F) -> Result<usize>
    where
        F: FnMut(StreamEvent) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        debug!(url = %self.endpoint(), "Submitting draft for review");
        let response = self
            .http_client
            .post(self.endpoint())
            .json(&RunRequest::from(request))
            .send()
            .await
            .map_err(|e| Error::transport(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            error!(status = %response.status(), "Server rejected the run");
            return Err(Error::transport(format!(
                "server returned {}",
                response.status()
            )));
        }

        EventStreamReader::new(response.bytes_stream())
            .for_each_event(handler)
            .await
    }
}

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::config::Configuration;
use crate::request::PreparedRequest;

/// Performs the network round-trip for a frozen request.
///
/// Implementations report only what the wire produced; status handling and
/// body decoding belong to [`crate::Request::call`].
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends `request` using the connection settings of `config`.
    ///
    /// # Errors
    /// [`TransportError`] when no HTTP status could be obtained.
    async fn send(
        &self,
        request: &PreparedRequest,
        config: &Configuration,
    ) -> Result<RawResponse, TransportError>;
}

/// What came back from the wire, before any interpretation.
#[derive(Debug, Clone, Default)]
pub struct RawResponse {
    /// HTTP status code; 0 means no status was received.
    pub status: u16,
    /// `Name: value` lines separated by newlines.
    pub headers: String,
    pub body: Bytes,
    pub info: TransferInfo,
}

impl RawResponse {
    #[must_use]
    pub fn new(status: u16, headers: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: headers.into(),
            body: body.into(),
            info: TransferInfo::default(),
        }
    }

    #[must_use]
    pub fn with_info(mut self, info: TransferInfo) -> Self {
        self.info = info;
        self
    }
}

/// Diagnostic details of one exchange, passed through untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferInfo {
    /// Final URL after redirects.
    pub url: String,
    pub elapsed: Duration,
    pub http_version: Option<String>,
    pub remote_addr: Option<SocketAddr>,
    pub size_download: u64,
}

/// The exchange failed before an HTTP status was received.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportError {
    reason: Option<String>,
}

impl TransportError {
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self {
            reason: (!reason.trim().is_empty()).then_some(reason),
        }
    }

    #[must_use]
    pub fn unknown() -> Self {
        Self { reason: None }
    }

    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.reason().unwrap_or("Unknown reason."))
    }
}

impl std::error::Error for TransportError {}

/// In-memory transport for tests.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_support {
    use std::collections::VecDeque;
    use std::sync::Arc;

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::{RawResponse, Transport, TransportError};
    use crate::config::Configuration;
    use crate::request::PreparedRequest;

    /// Replays queued outcomes in order and records every request it sees.
    ///
    /// Once the queue is drained every further call fails.
    #[derive(Debug, Default, Clone)]
    pub struct ScriptedTransport {
        outcomes: Arc<Mutex<VecDeque<Result<RawResponse, TransportError>>>>,
        sent: Arc<Mutex<Vec<PreparedRequest>>>,
    }

    impl ScriptedTransport {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        #[must_use]
        pub fn respond(self, response: RawResponse) -> Self {
            self.outcomes.lock().push_back(Ok(response));
            self
        }

        #[must_use]
        pub fn respond_json(self, status: u16, body: &str) -> Self {
            self.respond(RawResponse::new(
                status,
                "Content-Type: application/json",
                body.to_owned(),
            ))
        }

        #[must_use]
        pub fn fail(self, error: TransportError) -> Self {
            self.outcomes.lock().push_back(Err(error));
            self
        }

        /// Every request sent so far, oldest first.
        #[must_use]
        pub fn sent(&self) -> Vec<PreparedRequest> {
            self.sent.lock().clone()
        }

        #[must_use]
        pub fn last_sent(&self) -> Option<PreparedRequest> {
            self.sent.lock().last().cloned()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(
            &self,
            request: &PreparedRequest,
            _config: &Configuration,
        ) -> Result<RawResponse, TransportError> {
            self.sent.lock().push(request.clone());
            self.outcomes
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err(TransportError::new("no scripted response left")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_display() {
        assert_eq!(
            TransportError::new("connection refused").to_string(),
            "connection refused"
        );
        assert_eq!(TransportError::unknown().to_string(), "Unknown reason.");
        assert_eq!(TransportError::new("   ").reason(), None);
    }

    #[test]
    fn test_raw_response_builder() {
        let info = TransferInfo {
            url: "http://localhost/a".into(),
            size_download: 2,
            ..TransferInfo::default()
        };
        let raw = RawResponse::new(200, "A: b", "{}").with_info(info.clone());
        assert_eq!(raw.status, 200);
        assert_eq!(raw.body, Bytes::from_static(b"{}"));
        assert_eq!(raw.info, info);
    }
}

use std::sync::Arc;

use crate::config::{ClientSettings, Configuration};
use crate::headers::HeaderError;
use crate::reqwest_transport::ReqwestTransport;
use crate::request::Request;
use crate::transport::Transport;

/// Entry point pairing one connection profile with one transport.
///
/// Requests borrow the client's configuration, so many of them can be built
/// concurrently from a single client.
#[derive(Clone)]
pub struct ApiClient {
    config: Configuration,
    transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    /// Create a client using the `reqwest` transport.
    #[must_use]
    pub fn from_config(config: Configuration) -> Self {
        Self {
            config,
            transport: Arc::new(ReqwestTransport::new()),
        }
    }

    /// Create a client from a deserialized profile.
    ///
    /// # Errors
    /// Returns [`HeaderError`] when a default header has unsupported content.
    pub fn from_settings(settings: ClientSettings) -> Result<Self, HeaderError> {
        Ok(Self::from_config(Configuration::from_settings(settings)?))
    }

    /// Swap the transport, e.g. for an in-memory one in tests.
    #[must_use]
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = transport;
        self
    }

    #[must_use]
    pub fn config(&self) -> &Configuration {
        &self.config
    }

    /// Start a request borrowing this client's configuration.
    #[must_use]
    pub fn request(&self) -> Request<'_> {
        Request::new(&self.config).transport(Arc::clone(&self.transport))
    }

    /// Start a request on a private copy of the configuration, free to
    /// change headers or credentials without affecting other requests.
    #[must_use]
    pub fn detached_request(&self) -> Request<'static> {
        Request::detached(self.config.clone()).transport(Arc::clone(&self.transport))
    }
}

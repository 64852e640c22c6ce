use thiserror::Error;
use tracing::Level;

use crate::config::Configuration;
use crate::headers::HeaderError;
use crate::request::Method;
use crate::response::Response;
use crate::transport::TransportError;

/// Why a request never produced a [`Response`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestErrorKind {
    /// `call()` was reached without a method or a path.
    Incomplete,
    /// The builder was misused: null body, non-mapping query, unknown verb
    /// or response type.
    Usage,
    /// The transport failed before any HTTP status was received.
    Transport,
}

impl RequestErrorKind {
    #[must_use]
    pub fn code(self) -> u16 {
        match self {
            RequestErrorKind::Incomplete => 10,
            RequestErrorKind::Usage => 5,
            RequestErrorKind::Transport => 0,
        }
    }
}

/// Build-time or transport failure. Carries what was being attempted so the
/// caller can log or retry.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct RequestError {
    kind: RequestErrorKind,
    message: String,
    method: Option<Method>,
    uri: String,
}

impl RequestError {
    /// Builds the error and reports it through the configuration log hook.
    pub(crate) fn new(
        kind: RequestErrorKind,
        message: impl Into<String>,
        method: Option<Method>,
        uri: String,
        config: &Configuration,
    ) -> Self {
        let message = message.into();
        config.log(
            Level::ERROR,
            &format!("api.request.error -> {message}"),
            method.map_or("", Method::as_str),
            &uri,
        );
        Self {
            kind,
            message,
            method,
            uri,
        }
    }

    pub(crate) fn transport(
        method: Method,
        uri: String,
        err: &TransportError,
        config: &Configuration,
    ) -> Self {
        let message = match err.reason() {
            Some(reason) => format!("API call to `{uri}` failed: {reason}"),
            None => format!("API call to `{uri}` failed: Unknown reason."),
        };
        Self::new(RequestErrorKind::Transport, message, Some(method), uri, config)
    }

    #[must_use]
    pub fn kind(&self) -> RequestErrorKind {
        self.kind
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn method(&self) -> Option<Method> {
        self.method
    }

    #[must_use]
    pub fn uri(&self) -> &str {
        &self.uri
    }

    #[must_use]
    pub fn code(&self) -> u16 {
        self.kind.code()
    }

    /// Always 0: no HTTP status was received.
    #[must_use]
    pub fn status(&self) -> u16 {
        0
    }
}

/// The server answered with a status outside 200..=299.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ResponseError {
    message: String,
    response: Response,
}

impl ResponseError {
    pub(crate) fn new(response: Response, config: &Configuration) -> Self {
        let message = format!(
            "Error while requesting server, received a non successful HTTP code `{}` with response body: {}.",
            response.status(),
            response.body()
        );
        config.log(
            Level::ERROR,
            &format!("api.request.error -> {message}"),
            response.method().as_str(),
            response.uri(),
        );
        Self { message, response }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn status(&self) -> u16 {
        self.response.status()
    }

    #[must_use]
    pub fn response(&self) -> &Response {
        &self.response
    }

    #[must_use]
    pub fn into_response(self) -> Response {
        self.response
    }
}

/// Every failure `Request` can report.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    #[error(transparent)]
    Request(#[from] RequestError),

    #[error(transparent)]
    Response(Box<ResponseError>),

    #[error(transparent)]
    Header(#[from] HeaderError),
}

impl From<ResponseError> for ApiError {
    fn from(err: ResponseError) -> Self {
        ApiError::Response(Box::new(err))
    }
}

impl ApiError {
    /// HTTP status for response errors, 0 for everything else.
    #[must_use]
    pub fn status(&self) -> u16 {
        match self {
            ApiError::Response(err) => err.status(),
            ApiError::Request(_) | ApiError::Header(_) => 0,
        }
    }

    #[must_use]
    pub fn response(&self) -> Option<&Response> {
        match self {
            ApiError::Response(err) => Some(err.response()),
            ApiError::Request(_) | ApiError::Header(_) => None,
        }
    }

    /// True when the server was never reached.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(self, ApiError::Request(err) if err.kind() == RequestErrorKind::Transport)
    }
}

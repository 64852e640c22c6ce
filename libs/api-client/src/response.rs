use serde::de::DeserializeOwned;

use crate::body::{BodyType, ResponseBody};
use crate::headers::HeaderBag;
use crate::request::{Method, PreparedRequest};
use crate::transport::TransferInfo;

/// Outcome of one completed HTTP exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    status: u16,
    headers: HeaderBag,
    body: ResponseBody,
    info: TransferInfo,
    request: PreparedRequest,
}

impl Response {
    #[must_use]
    pub fn new(
        status: u16,
        headers: HeaderBag,
        body: ResponseBody,
        info: TransferInfo,
        request: PreparedRequest,
    ) -> Self {
        Self {
            status,
            headers,
            body,
            info,
            request,
        }
    }

    /// Every body type a request may ask for.
    #[must_use]
    pub fn all_body_types() -> [BodyType; 4] {
        BodyType::ALL
    }

    #[must_use]
    pub fn status(&self) -> u16 {
        self.status
    }

    /// True for 200..=299.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    #[must_use]
    pub fn method(&self) -> Method {
        self.request.method()
    }

    /// Resolved URI the request was sent to.
    #[must_use]
    pub fn uri(&self) -> &str {
        self.request.uri()
    }

    #[must_use]
    pub fn body(&self) -> &ResponseBody {
        &self.body
    }

    #[must_use]
    pub fn into_body(self) -> ResponseBody {
        self.body
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderBag {
        &self.headers
    }

    /// The frozen request this response answers.
    #[must_use]
    pub fn request(&self) -> &PreparedRequest {
        &self.request
    }

    /// Transport diagnostics: final URL, timing, sizes.
    #[must_use]
    pub fn info(&self) -> &TransferInfo {
        &self.info
    }

    /// Deserializes the body into `T`.
    ///
    /// # Errors
    /// Returns the `serde_json` error when the body does not match `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        self.body.deserialize()
    }

    /// Body rendered as text; JSON bodies are re-serialized.
    #[must_use]
    pub fn text(&self) -> String {
        self.body.to_string()
    }
}

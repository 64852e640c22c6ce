//! Configurable HTTP API client.
//!
//! A [`Configuration`] holds the connection profile (host, timeouts, proxy,
//! TLS, default headers, credentials). A [`Request`] is built fluently
//! against it, frozen into a [`PreparedRequest`] and sent through a
//! [`Transport`]. The outcome is a [`Response`] or an [`ApiError`] that tells
//! "never reached the server" apart from "server answered with an error".
//!
//! # Examples
//!
//! ```no_run
//! use api_client::{ApiClient, Configuration};
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Configuration::new("https://jsonplaceholder.typicode.com")
//!     .with_timeout(10)
//!     .with_header("Accept", "application/json")?;
//! let client = ApiClient::from_config(config);
//!
//! let response = client
//!     .request()
//!     .post("/posts", json!({"title": "foo", "userId": 1}))?
//!     .header("Content-Type", "application/x-www-form-urlencoded")?
//!     .call()
//!     .await?;
//!
//! let post: serde_json::Value = response.json()?;
//! println!("created post {}", post["id"]);
//! # Ok(())
//! # }
//! ```
//!
//! ## Blocking usage
//!
//! ```no_run
//! use api_client::{ApiClient, Configuration};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = ApiClient::from_config(Configuration::new("https://api.example.com"));
//! let response = client
//!     .request()
//!     .get("/posts/{id}")
//!     .params([("id", 1)])
//!     .call_blocking()?;
//! println!("{}", response.text());
//! # Ok(())
//! # }
//! ```

pub mod body;
pub mod client;
pub mod config;
pub mod error;
pub mod form;
pub mod headers;
pub mod reqwest_transport;
pub mod request;
pub mod response;
pub mod transport;

pub use body::{BodyType, ResponseBody, UnknownBodyType};
pub use client::ApiClient;
pub use config::{ApiKey, BasicAuthSettings, ClientSettings, Configuration, ProxyKind, ProxySettings};
pub use error::{ApiError, RequestError, RequestErrorKind, ResponseError};
pub use headers::{HeaderBag, HeaderContent, HeaderError, HeaderInput};
pub use reqwest_transport::ReqwestTransport;
pub use request::{Method, PreparedRequest, Request, UnknownMethod};
pub use response::Response;
pub use transport::{RawResponse, TransferInfo, Transport, TransportError};

#[cfg(feature = "test-utils")]
pub use transport::test_support;

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use secrecy::ExposeSecret;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::runtime::RuntimeFlavor;
use tracing::Level;

use crate::body::{BodyType, ResponseBody, encode_request_body};
use crate::config::{ApiKey, Configuration};
use crate::error::{ApiError, RequestError, RequestErrorKind, ResponseError};
use crate::form;
use crate::headers::{HeaderBag, HeaderContent, HeaderInput};
use crate::reqwest_transport::ReqwestTransport;
use crate::response::Response;
use crate::transport::{Transport, TransportError};

const INCOMPLETE_REQUEST: &str =
    "Cannot do an API call before set Request HTTP method and/or path.";
const INVALID_QUERY: &str =
    "Query parameters must be an array or an object containing properties.";

/// HTTP verbs the client can issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Head,
    Delete,
    Options,
    Patch,
    Post,
    Put,
}

impl Method {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Delete => "DELETE",
            Method::Options => "OPTIONS",
            Method::Patch => "PATCH",
            Method::Post => "POST",
            Method::Put => "PUT",
        }
    }

    /// Whether the verb carries the request body on the wire.
    #[must_use]
    pub fn has_body(self) -> bool {
        !matches!(self, Method::Get | Method::Head)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported HTTP method `{0}`")]
pub struct UnknownMethod(pub String);

impl FromStr for Method {
    type Err = UnknownMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            Method::Get,
            Method::Head,
            Method::Delete,
            Method::Options,
            Method::Patch,
            Method::Post,
            Method::Put,
        ]
        .into_iter()
        .find(|method| method.as_str().eq_ignore_ascii_case(s.trim()))
        .ok_or_else(|| UnknownMethod(s.to_owned()))
    }
}

impl TryFrom<&str> for Method {
    type Error = UnknownMethod;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Method> for http::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => http::Method::GET,
            Method::Head => http::Method::HEAD,
            Method::Delete => http::Method::DELETE,
            Method::Options => http::Method::OPTIONS,
            Method::Patch => http::Method::PATCH,
            Method::Post => http::Method::POST,
            Method::Put => http::Method::PUT,
        }
    }
}

/// Frozen execution plan handed to the [`Transport`].
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedRequest {
    method: Method,
    uri: String,
    headers: HeaderBag,
    body: Option<String>,
    response_type: BodyType,
}

impl PreparedRequest {
    #[must_use]
    pub fn method(&self) -> Method {
        self.method
    }

    #[must_use]
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Default headers overlaid with the request's own.
    #[must_use]
    pub fn headers(&self) -> &HeaderBag {
        &self.headers
    }

    /// Encoded payload; `None` for `GET` and `HEAD`.
    #[must_use]
    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }

    #[must_use]
    pub fn response_type(&self) -> BodyType {
        self.response_type
    }
}

/// Fluent request builder.
///
/// Steps that cannot fail return `Self`; steps that validate their input
/// return `Result<Self, ApiError>` so chains read `.post(..)?.query(..)?`.
/// Nothing touches the network until [`Request::call`].
#[derive(Clone)]
pub struct Request<'c> {
    config: Cow<'c, Configuration>,
    transport: Arc<dyn Transport>,
    method: Option<Method>,
    path: Option<String>,
    query: String,
    params: Vec<(String, String)>,
    data: Option<Value>,
    headers: HeaderBag,
    response_type: BodyType,
}

impl fmt::Debug for Request<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("host", &self.config.host())
            .field("method", &self.method)
            .field("path", &self.path)
            .field("query", &self.query)
            .field("params", &self.params)
            .field("data", &self.data)
            .field("headers", &self.headers)
            .field("response_type", &self.response_type)
            .finish_non_exhaustive()
    }
}

impl<'c> Request<'c> {
    /// Starts a request against a borrowed configuration.
    #[must_use]
    pub fn new(config: &'c Configuration) -> Self {
        Self::with_config(Cow::Borrowed(config))
    }

    fn with_config(config: Cow<'c, Configuration>) -> Self {
        Self {
            config,
            transport: Arc::new(ReqwestTransport::new()),
            method: None,
            path: None,
            query: String::new(),
            params: Vec::new(),
            data: None,
            headers: HeaderBag::new(),
            response_type: BodyType::default(),
        }
    }

    /// Replaces the transport used by [`Request::call`].
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = transport;
        self
    }

    #[must_use]
    pub fn config(&self) -> &Configuration {
        &self.config
    }

    /// Mutable access to the configuration. A borrowed configuration is
    /// cloned first so the shared original is never touched.
    pub fn config_mut(&mut self) -> &mut Configuration {
        self.config.to_mut()
    }

    #[must_use]
    pub fn get(self, path: impl AsRef<str>) -> Self {
        self.set_target(Method::Get, path)
    }

    #[must_use]
    pub fn head(self, path: impl AsRef<str>) -> Self {
        self.set_target(Method::Head, path)
    }

    /// # Errors
    /// Usage error when `body` is `null`.
    pub fn delete(self, path: impl AsRef<str>, body: impl Into<Value>) -> Result<Self, ApiError> {
        self.with_body(Method::Delete, path, body.into())
    }

    /// # Errors
    /// Usage error when `body` is `null`.
    pub fn options(self, path: impl AsRef<str>, body: impl Into<Value>) -> Result<Self, ApiError> {
        self.with_body(Method::Options, path, body.into())
    }

    /// # Errors
    /// Usage error when `body` is `null`.
    pub fn patch(self, path: impl AsRef<str>, body: impl Into<Value>) -> Result<Self, ApiError> {
        self.with_body(Method::Patch, path, body.into())
    }

    /// # Errors
    /// Usage error when `body` is `null`.
    pub fn post(self, path: impl AsRef<str>, body: impl Into<Value>) -> Result<Self, ApiError> {
        self.with_body(Method::Post, path, body.into())
    }

    /// # Errors
    /// Usage error when `body` is `null`.
    pub fn put(self, path: impl AsRef<str>, body: impl Into<Value>) -> Result<Self, ApiError> {
        self.with_body(Method::Put, path, body.into())
    }

    fn set_target(mut self, method: Method, path: impl AsRef<str>) -> Self {
        self.method = Some(method);
        self.path(path)
    }

    fn with_body(self, method: Method, path: impl AsRef<str>, body: Value) -> Result<Self, ApiError> {
        let request = self.set_target(method, path);
        if body.is_null() {
            return Err(request.usage_error(format!(
                "The HTTP method `{method}` does not support a NULL body."
            )));
        }
        Ok(request.data(body))
    }

    /// Sets the verb from a [`Method`] or its name.
    ///
    /// # Errors
    /// Usage error for an unknown verb.
    pub fn method<M>(mut self, method: M) -> Result<Self, ApiError>
    where
        M: TryInto<Method>,
        M::Error: fmt::Display,
    {
        match method.try_into() {
            Ok(method) => {
                self.method = Some(method);
                Ok(self)
            }
            Err(err) => Err(self.usage_error(err.to_string())),
        }
    }

    /// Sets the path relative to the configured host; a leading `/` is
    /// dropped.
    #[must_use]
    pub fn path(mut self, path: impl AsRef<str>) -> Self {
        self.path = Some(path.as_ref().trim_start_matches('/').to_owned());
        self
    }

    /// Replaces the query string with the form encoding of `query`.
    ///
    /// # Errors
    /// Usage error when `query` does not serialize to a map or a list.
    pub fn query<T: Serialize + ?Sized>(mut self, query: &T) -> Result<Self, ApiError> {
        self.query = self.encode_query(query)?;
        Ok(self)
    }

    /// Adds the form encoding of `query` after the current query string.
    ///
    /// # Errors
    /// Usage error when `query` does not serialize to a map or a list.
    pub fn append_query<T: Serialize + ?Sized>(mut self, query: &T) -> Result<Self, ApiError> {
        let encoded = self.encode_query(query)?;
        if self.query.is_empty() {
            self.query = encoded;
        } else if !encoded.is_empty() {
            self.query.push('&');
            self.query.push_str(&encoded);
        }
        Ok(self)
    }

    fn encode_query<T: Serialize + ?Sized>(&self, query: &T) -> Result<String, ApiError> {
        match serde_json::to_value(query) {
            Ok(value @ (Value::Object(_) | Value::Array(_))) => Ok(form::encode(&value)),
            Ok(_) | Err(_) => Err(self.usage_error(INVALID_QUERY)),
        }
    }

    /// Replaces the `{name}` substitution table.
    #[must_use]
    pub fn params<K, V>(mut self, params: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: ToString,
    {
        self.params.clear();
        self.add_params(params)
    }

    /// Merges entries into the `{name}` substitution table. A known key
    /// keeps its position and takes the new value.
    #[must_use]
    pub fn add_params<K, V>(mut self, params: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: ToString,
    {
        for (key, value) in params {
            let key = key.into();
            let value = value.to_string();
            match self.params.iter_mut().find(|(known, _)| *known == key) {
                Some((_, slot)) => *slot = value,
                None => self.params.push((key, value)),
            }
        }
        self
    }

    /// Folds a bag, a list of entries or a raw header block into the
    /// request headers. Entries append to existing values.
    ///
    /// # Errors
    /// [`ApiError::Header`] for content that is neither a string nor a list.
    pub fn headers(mut self, headers: impl Into<HeaderInput>) -> Result<Self, ApiError> {
        self.headers.apply(headers)?;
        Ok(self)
    }

    /// Appends a single header.
    ///
    /// # Errors
    /// [`ApiError::Header`] for content that is neither a string nor a list.
    pub fn header(mut self, name: &str, content: impl Into<HeaderContent>) -> Result<Self, ApiError> {
        self.headers.append(name, content)?;
        Ok(self)
    }

    #[must_use]
    pub fn header_bag(&self) -> &HeaderBag {
        &self.headers
    }

    pub fn header_bag_mut(&mut self) -> &mut HeaderBag {
        &mut self.headers
    }

    /// Sets how the response body is interpreted.
    ///
    /// # Errors
    /// Usage error when the type is not one of [`BodyType::ALL`].
    pub fn response_type<T>(mut self, response_type: T) -> Result<Self, ApiError>
    where
        T: TryInto<BodyType>,
        T::Error: fmt::Display,
    {
        match response_type.try_into() {
            Ok(response_type) => {
                self.response_type = response_type;
                Ok(self)
            }
            Err(err) => Err(self.usage_error(err.to_string())),
        }
    }

    /// Stores the body as given; encoding is decided at dispatch time from
    /// the effective `Content-Type`.
    #[must_use]
    pub fn data(mut self, body: impl Into<Value>) -> Self {
        self.data = Some(body.into());
        self
    }

    /// Serializes `value` as the body and defaults `Content-Type` to JSON.
    ///
    /// # Errors
    /// Usage error when `value` cannot be serialized.
    pub fn json<T: Serialize + ?Sized>(mut self, value: &T) -> Result<Self, ApiError> {
        let data = match serde_json::to_value(value) {
            Ok(data) => data,
            Err(err) => return Err(self.usage_error(format!("Cannot serialize request body: {err}"))),
        };
        if !self.headers.has("content-type") && !self.config.headers().has("content-type") {
            self.headers.set("Content-Type", "application/json");
        }
        self.data = Some(data);
        Ok(self)
    }

    /// Adds `Authorization: Basic ...` from the configured credentials.
    /// No-op when neither a username nor a password is configured.
    #[must_use]
    pub fn basic_auth(mut self) -> Self {
        let username = self.config.username().unwrap_or_default();
        let password = self
            .config
            .password()
            .map(|secret| secret.expose_secret().to_owned());
        if username.is_empty() && password.is_none() {
            return self;
        }
        let credentials = format!("{username}:{}", password.unwrap_or_default());
        let value = format!("Basic {}", STANDARD.encode(credentials));
        self.headers.set("Authorization", value);
        self
    }

    /// Adds `Authorization` from the named API key; unknown identifiers are
    /// ignored.
    #[must_use]
    pub fn authorization(mut self, identifier: &str) -> Self {
        if let Some(value) = self.config.api_key(identifier).map(ApiKey::header_value) {
            self.headers.set("Authorization", value);
        }
        self
    }

    /// Adds `Authorization: Bearer ...` from the configured access token.
    #[must_use]
    pub fn bearer(mut self) -> Self {
        if let Some(value) = self
            .config
            .access_token()
            .map(|token| format!("Bearer {}", token.expose_secret()))
        {
            self.headers.set("Authorization", value);
        }
        self
    }

    /// Encoded query string, without the leading `?`.
    #[must_use]
    pub fn query_string(&self) -> &str {
        &self.query
    }

    /// `host/path`, then `?query`, then every `{key}` replaced from the
    /// params table in insertion order.
    #[must_use]
    pub fn uri(&self) -> String {
        let mut uri = format!(
            "{}/{}",
            self.config.host(),
            self.path.as_deref().unwrap_or_default()
        );
        if !self.query.is_empty() {
            uri.push('?');
            uri.push_str(&self.query);
        }
        for (key, value) in &self.params {
            uri = uri.replace(&format!("{{{key}}}"), value);
        }
        uri
    }

    /// Freezes the builder into the plan the transport will execute.
    ///
    /// # Errors
    /// Incomplete-request error when the method is missing or the path is
    /// missing or empty.
    pub fn prepare(&self) -> Result<PreparedRequest, ApiError> {
        let path = self.path.as_deref().filter(|path| !path.is_empty());
        let (Some(method), Some(_)) = (self.method, path) else {
            return Err(RequestError::new(
                RequestErrorKind::Incomplete,
                INCOMPLETE_REQUEST,
                self.method,
                self.uri(),
                &self.config,
            )
            .into());
        };

        let mut headers = self.config.clone_headers();
        headers.merge_with(&self.headers);
        let body = method
            .has_body()
            .then(|| encode_request_body(&headers, self.data.as_ref()));

        Ok(PreparedRequest {
            method,
            uri: self.uri(),
            headers,
            body,
            response_type: self.response_type,
        })
    }

    /// Executes the request.
    ///
    /// # Errors
    /// - [`ApiError::Request`] when the request is incomplete or the server
    ///   was never reached.
    /// - [`ApiError::Response`] when the server answered outside 2xx; the
    ///   decoded [`Response`] is attached.
    pub async fn call(&self) -> Result<Response, ApiError> {
        let prepared = self.prepare()?;
        let config: &Configuration = &self.config;
        let method = prepared.method();

        config.log(Level::DEBUG, "api.request.send", method.as_str(), prepared.uri());

        let raw = match self.transport.send(&prepared, config).await {
            Ok(raw) if raw.status != 0 => raw,
            Ok(_) => {
                return Err(RequestError::transport(
                    method,
                    prepared.uri().to_owned(),
                    &TransportError::unknown(),
                    config,
                )
                .into());
            }
            Err(err) => {
                return Err(
                    RequestError::transport(method, prepared.uri().to_owned(), &err, config).into(),
                );
            }
        };

        let headers = HeaderBag::parse(&raw.headers);
        let body = ResponseBody::decode(raw.body, prepared.response_type());
        let response = Response::new(raw.status, headers, body, raw.info, prepared);

        config.log(
            Level::DEBUG,
            &format!("api.request.done -> {}", response.status()),
            method.as_str(),
            response.uri(),
        );

        if !response.is_success() {
            return Err(ResponseError::new(response, config).into());
        }
        Ok(response)
    }

    /// Blocking version of [`Request::call`] for sync contexts.
    ///
    /// On a multi-threaded tokio runtime the call runs in place on the
    /// current handle. A current-thread runtime cannot be blocked in place,
    /// so the call moves to a scoped thread with its own runtime. Outside
    /// any runtime a temporary current-thread runtime is used.
    ///
    /// # Errors
    /// Same as [`Request::call`]; failing to start the temporary runtime is
    /// reported as a transport error.
    pub fn call_blocking(&self) -> Result<Response, ApiError> {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                tokio::task::block_in_place(|| handle.block_on(self.call()))
            }
            Ok(_) => std::thread::scope(|scope| {
                scope
                    .spawn(|| self.call_on_temporary_runtime())
                    .join()
                    .unwrap_or_else(|_| {
                        Err(self.blocking_failure("blocking call thread panicked"))
                    })
            }),
            Err(_) => self.call_on_temporary_runtime(),
        }
    }

    fn call_on_temporary_runtime(&self) -> Result<Response, ApiError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|err| self.blocking_failure(err.to_string()))?;
        runtime.block_on(self.call())
    }

    fn blocking_failure(&self, reason: impl Into<String>) -> ApiError {
        RequestError::transport(
            self.method.unwrap_or(Method::Get),
            self.uri(),
            &TransportError::new(reason),
            &self.config,
        )
        .into()
    }

    fn usage_error(&self, message: impl Into<String>) -> ApiError {
        RequestError::new(
            RequestErrorKind::Usage,
            message,
            self.method,
            self.uri(),
            &self.config,
        )
        .into()
    }
}

impl Request<'static> {
    /// Starts a request that owns its configuration, for flows that adjust
    /// headers or credentials per request without touching a shared profile.
    #[must_use]
    pub fn detached(config: Configuration) -> Self {
        Self::with_config(Cow::Owned(config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::RawResponse;
    use crate::transport::test_support::ScriptedTransport;
    use serde_json::json;
    use tracing_test::traced_test;

    fn config() -> Configuration {
        Configuration::new("https://api.example.com/")
    }

    fn request_error(err: ApiError) -> RequestError {
        let ApiError::Request(err) = err else {
            panic!("expected a request error");
        };
        err
    }

    #[test]
    fn test_method_parsing() {
        assert_eq!("post".parse::<Method>().unwrap(), Method::Post);
        assert_eq!(Method::try_from(" DELETE ").unwrap(), Method::Delete);
        assert!("TRACE".parse::<Method>().is_err());
        assert_eq!(http::Method::from(Method::Patch), http::Method::PATCH);
        assert!(!Method::Head.has_body());
        assert!(Method::Options.has_body());
    }

    #[test]
    fn test_uri_resolution_with_params_and_query() {
        let config = config();
        let request = Request::new(&config).get("/posts/{id}").params([("id", 1)]);
        assert_eq!(request.uri(), "https://api.example.com/posts/1");

        let request = request.query(&json!({"foo": "bar"})).unwrap();
        assert_eq!(request.uri(), "https://api.example.com/posts/1?foo=bar");
    }

    #[test]
    fn test_params_leave_encoded_query_intact() {
        let config = config();
        let request = Request::new(&config)
            .get("search")
            .query(&json!({"owner": "{user}"}))
            .unwrap()
            .params([("user", "ana")]);
        assert_eq!(request.query_string(), "owner=%7Buser%7D");
        assert_eq!(request.uri(), "https://api.example.com/search?owner=%7Buser%7D");

        let request = Request::new(&config)
            .get("users/{user}/repos")
            .params([("user", "ana")])
            .add_params([("unused", "x")]);
        assert_eq!(request.uri(), "https://api.example.com/users/ana/repos");
    }

    #[test]
    fn test_params_replaces_and_add_params_merges() {
        let config = config();
        let request = Request::new(&config)
            .get("{a}/{b}")
            .params([("a", "1"), ("b", "2")])
            .params([("a", "x")]);
        assert_eq!(request.uri(), "https://api.example.com/x/{b}");

        let request = request.add_params([("b", "y")]);
        assert_eq!(request.uri(), "https://api.example.com/x/y");
    }

    #[test]
    fn test_params_substitute_in_insertion_order() {
        let config = config();
        let request = Request::new(&config)
            .get("x/{b}")
            .params([("b", "{a}"), ("a", "1")]);
        assert_eq!(request.uri(), "https://api.example.com/x/1");

        let request = request.add_params([("b", "{a}-2")]);
        assert_eq!(request.uri(), "https://api.example.com/x/1-2");
    }

    #[test]
    fn test_append_query() {
        let config = config();
        let request = Request::new(&config)
            .get("items")
            .append_query(&json!({"page": 2}))
            .unwrap()
            .append_query(&json!({"size": 10}))
            .unwrap();
        assert_eq!(request.query_string(), "page=2&size=10");

        let request = request.query(&json!({"only": true})).unwrap();
        assert_eq!(request.query_string(), "only=1");
    }

    #[test]
    fn test_scalar_query_is_rejected() {
        let config = config();
        let err = request_error(Request::new(&config).get("items").query(&"page=2").unwrap_err());
        assert_eq!(err.kind(), RequestErrorKind::Usage);
        assert_eq!(err.code(), 5);
        assert_eq!(err.message(), INVALID_QUERY);
        assert_eq!(err.method(), Some(Method::Get));
    }

    #[test]
    fn test_null_body_is_rejected() {
        let config = config();
        let err = request_error(Request::new(&config).post("posts", Value::Null).unwrap_err());
        assert_eq!(err.kind(), RequestErrorKind::Usage);
        assert_eq!(
            err.message(),
            "The HTTP method `POST` does not support a NULL body."
        );
        assert_eq!(err.uri(), "https://api.example.com/posts");
    }

    #[test]
    fn test_incomplete_request() {
        let config = config();
        let err = request_error(Request::new(&config).prepare().unwrap_err());
        assert_eq!(err.kind(), RequestErrorKind::Incomplete);
        assert_eq!(err.code(), 10);
        assert_eq!(err.status(), 0);
        assert_eq!(err.message(), INCOMPLETE_REQUEST);

        let err = request_error(
            Request::new(&config)
                .method("GET")
                .unwrap()
                .prepare()
                .unwrap_err(),
        );
        assert_eq!(err.kind(), RequestErrorKind::Incomplete);
        assert_eq!(err.method(), Some(Method::Get));

        let err = request_error(Request::new(&config).path("x").prepare().unwrap_err());
        assert_eq!(err.kind(), RequestErrorKind::Incomplete);
    }

    #[test]
    fn test_empty_path_is_incomplete() {
        let config = config();
        for path in ["/", "", "///"] {
            let err = request_error(Request::new(&config).get(path).prepare().unwrap_err());
            assert_eq!(err.kind(), RequestErrorKind::Incomplete);
            assert_eq!(err.message(), INCOMPLETE_REQUEST);
        }
    }

    #[test]
    fn test_unknown_method_and_response_type() {
        let config = config();
        let err = request_error(Request::new(&config).method("BREW").unwrap_err());
        assert_eq!(err.kind(), RequestErrorKind::Usage);

        let err = request_error(Request::new(&config).get("a").response_type("xml").unwrap_err());
        assert_eq!(err.kind(), RequestErrorKind::Usage);

        let request = Request::new(&config)
            .get("a")
            .response_type(BodyType::String)
            .unwrap()
            .response_type("file-stream")
            .unwrap();
        assert_eq!(request.prepare().unwrap().response_type(), BodyType::FileStream);
    }

    #[test]
    fn test_request_headers_win_over_defaults() {
        let config = config()
            .with_header("Accept", "text/html")
            .unwrap()
            .with_header("X-Client", "sdk")
            .unwrap();
        let prepared = Request::new(&config)
            .get("a")
            .header("Accept", "application/json")
            .unwrap()
            .prepare()
            .unwrap();

        let accept: &[String] = &["application/json".to_owned()];
        assert_eq!(prepared.headers().get("accept"), Some(accept));
        assert!(prepared.headers().has("x-client"));
        assert!(!config.headers().contains("accept", "application/json"));
    }

    #[test]
    fn test_malformed_header_surfaces_as_header_error() {
        let config = config();
        let err = Request::new(&config)
            .get("a")
            .header("X-Count", json!(12345))
            .unwrap_err();
        assert!(matches!(err, ApiError::Header(_)));
    }

    #[test]
    fn test_headers_accepts_block_and_entries() {
        let config = config();
        let request = Request::new(&config)
            .get("a")
            .headers("X-A: 1\r\nX-B: 2")
            .unwrap()
            .headers([("X-A", "3")])
            .unwrap();
        let values: &[String] = &["1".to_owned(), "3".to_owned()];
        assert_eq!(request.header_bag().get("x-a"), Some(values));
        assert!(request.header_bag().has("x-b"));
    }

    #[test]
    fn test_body_encoding_follows_content_type() {
        let config = config();
        let body = json!({"id": 1, "title": "foo"});

        let form = Request::new(&config)
            .post("posts", body.clone())
            .unwrap()
            .header("Content-Type", "application/x-www-form-urlencoded")
            .unwrap()
            .prepare()
            .unwrap();
        assert_eq!(form.body(), Some("id=1&title=foo"));

        let json = Request::new(&config)
            .post("posts", body)
            .unwrap()
            .header("Content-Type", "application/json")
            .unwrap()
            .prepare()
            .unwrap();
        assert_eq!(json.body(), Some(r#"{"id":1,"title":"foo"}"#));
    }

    #[test]
    fn test_default_content_type_drives_encoding() {
        let config = config()
            .with_header("Content-Type", "application/x-www-form-urlencoded")
            .unwrap();
        let prepared = Request::new(&config)
            .put("posts/1", json!({"title": "bar"}))
            .unwrap()
            .prepare()
            .unwrap();
        assert_eq!(prepared.body(), Some("title=bar"));
    }

    #[test]
    fn test_get_and_head_carry_no_body() {
        let config = config();
        let prepared = Request::new(&config)
            .get("a")
            .data(json!({"ignored": true}))
            .prepare()
            .unwrap();
        assert_eq!(prepared.body(), None);

        let prepared = Request::new(&config).head("a").prepare().unwrap();
        assert_eq!(prepared.method(), Method::Head);
        assert_eq!(prepared.body(), None);
    }

    #[test]
    fn test_json_sets_content_type_once() {
        #[derive(Serialize)]
        struct NewPost<'a> {
            title: &'a str,
        }

        let config = config();
        let prepared = Request::new(&config)
            .method(Method::Post)
            .unwrap()
            .path("posts")
            .json(&NewPost { title: "foo" })
            .unwrap()
            .prepare()
            .unwrap();
        assert!(prepared.headers().is("content-type", "application/json"));
        assert_eq!(prepared.body(), Some(r#"{"title":"foo"}"#));

        let prepared = Request::new(&config)
            .method(Method::Post)
            .unwrap()
            .path("posts")
            .header("Content-Type", "text/plain")
            .unwrap()
            .json(&"hello")
            .unwrap()
            .prepare()
            .unwrap();
        assert!(prepared.headers().contains("content-type", "text/plain"));
        assert_eq!(prepared.body(), Some("hello"));
    }

    #[test]
    fn test_basic_auth_header() {
        let config = config().with_basic_auth("user", "pass");
        let request = Request::new(&config).get("a").basic_auth();
        let values: &[String] = &["Basic dXNlcjpwYXNz".to_owned()];
        assert_eq!(request.header_bag().get("authorization"), Some(values));

        let bare = Configuration::new("http://localhost");
        let request = Request::new(&bare).get("a").basic_auth();
        assert!(!request.header_bag().has("authorization"));
    }

    #[test]
    fn test_api_key_authorization() {
        let config = config()
            .with_api_key("github", "s3cr3t", Some("token"))
            .with_api_key("plain", "abc", None);

        let request = Request::new(&config).get("a").authorization("github");
        let values: &[String] = &["token s3cr3t".to_owned()];
        assert_eq!(request.header_bag().get("authorization"), Some(values));

        let request = Request::new(&config).get("a").authorization("plain");
        let values: &[String] = &["abc".to_owned()];
        assert_eq!(request.header_bag().get("authorization"), Some(values));

        let request = Request::new(&config).get("a").authorization("missing");
        assert!(!request.header_bag().has("authorization"));
    }

    #[test]
    fn test_bearer_token() {
        let config = config().with_access_token("tok-123");
        let request = Request::new(&config).get("a").bearer();
        let values: &[String] = &["Bearer tok-123".to_owned()];
        assert_eq!(request.header_bag().get("authorization"), Some(values));
    }

    #[test]
    fn test_config_mut_does_not_leak_into_shared_profile() {
        let config = config();
        let mut request = Request::new(&config).get("a");
        request
            .config_mut()
            .headers_mut()
            .set("X-Env", "sandbox");
        assert!(request.prepare().unwrap().headers().has("x-env"));
        assert!(!config.headers().has("x-env"));
    }

    #[test]
    fn test_detached_request_owns_its_configuration() {
        let request = Request::detached(config().with_access_token("t")).get("me").bearer();
        assert_eq!(request.uri(), "https://api.example.com/me");
        assert!(request.header_bag().has("authorization"));
    }

    #[tokio::test]
    async fn test_call_decodes_success_body() {
        let transport = ScriptedTransport::new().respond_json(200, r#"{"id": 1}"#);
        let config = config();
        let response = Request::new(&config)
            .transport(Arc::new(transport.clone()))
            .get("posts/1")
            .call()
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
        assert_eq!(response.body(), &ResponseBody::Json(json!({"id": 1})));
        assert_eq!(
            transport.last_sent().unwrap().uri(),
            "https://api.example.com/posts/1"
        );
    }

    #[tokio::test]
    async fn test_zero_status_is_a_transport_failure() {
        let transport = ScriptedTransport::new().respond(RawResponse::new(0, "", ""));
        let config = config();
        let err = Request::new(&config)
            .transport(Arc::new(transport))
            .get("a")
            .call()
            .await
            .unwrap_err();
        assert!(err.is_transport());
        assert_eq!(
            err.to_string(),
            "API call to `https://api.example.com/a` failed: Unknown reason."
        );
    }

    #[tokio::test]
    #[traced_test]
    async fn test_response_error_is_logged() {
        let transport = ScriptedTransport::new().respond_json(500, r#"{"error":"boom"}"#);
        let config = config().with_env("staging");
        let err = Request::new(&config)
            .transport(Arc::new(transport))
            .delete("posts/1", "")
            .unwrap()
            .call()
            .await
            .unwrap_err();

        assert_eq!(err.status(), 500);
        assert!(logs_contain("staging :: api.request.error -> Error while requesting server"));
        assert!(logs_contain("DELETE"));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_debug_events_follow_debug_flag() {
        let transport = ScriptedTransport::new()
            .respond_json(200, "{}")
            .respond_json(204, "");
        let quiet = config();
        let request = Request::new(&quiet).transport(Arc::new(transport.clone())).get("a");
        request.call().await.unwrap();
        assert!(!logs_contain("api.request.send"));

        let verbose = config().with_debug(true);
        let request = Request::new(&verbose).transport(Arc::new(transport)).get("a");
        request.call().await.unwrap();
        assert!(logs_contain("api.request.send"));
        assert!(logs_contain("api.request.done -> 204"));
    }

    #[test]
    fn test_call_blocking_outside_runtime() {
        let transport = ScriptedTransport::new().respond_json(201, r#"{"ok":true}"#);
        let config = config();
        let response = Request::new(&config)
            .transport(Arc::new(transport))
            .post("things", json!({"a": 1}))
            .unwrap()
            .call_blocking()
            .unwrap();
        assert_eq!(response.status(), 201);
    }

    #[tokio::test]
    async fn test_call_blocking_inside_current_thread_runtime() {
        let transport = ScriptedTransport::new().respond_json(200, r#"{"id":7}"#);
        let config = config();
        let response = Request::new(&config)
            .transport(Arc::new(transport.clone()))
            .get("things/7")
            .call_blocking()
            .unwrap();
        assert_eq!(response.body(), &ResponseBody::Json(json!({"id": 7})));
        assert_eq!(transport.sent().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_call_blocking_inside_runtime() {
        let transport = ScriptedTransport::new().respond_json(200, "[]");
        let config = config();
        let response = Request::new(&config)
            .transport(Arc::new(transport))
            .get("things")
            .call_blocking()
            .unwrap();
        assert_eq!(response.body(), &ResponseBody::Json(json!([])));
    }
}

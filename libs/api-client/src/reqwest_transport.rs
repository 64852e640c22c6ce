use std::error::Error as StdError;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use http::{HeaderMap, HeaderName, HeaderValue, Version};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;

use crate::config::Configuration;
use crate::request::PreparedRequest;
use crate::transport::{RawResponse, TransferInfo, Transport, TransportError};

/// [`Transport`] backed by `reqwest`.
///
/// A client is built for every call from the configuration of the request
/// being sent, so one transport can serve requests with different profiles.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReqwestTransport;

impl ReqwestTransport {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(
        &self,
        request: &PreparedRequest,
        config: &Configuration,
    ) -> Result<RawResponse, TransportError> {
        let client = ClientOptions::from_config(config).build()?;
        let started = Instant::now();

        let mut builder = client
            .request(request.method().into(), request.uri())
            .headers(wire_headers(&request.headers().to_wire_lines())?);
        if let Some(body) = request.body() {
            builder = builder.body(body.to_owned());
        }

        let response = builder.send().await.map_err(|err| TransportError::new(error_chain(&err)))?;

        let status = response.status().as_u16();
        let headers = render_headers(response.headers());
        let url = response.url().to_string();
        let http_version = version_label(response.version());
        let remote_addr = response.remote_addr();

        let body = response
            .bytes()
            .await
            .map_err(|err| TransportError::new(error_chain(&err)))?;

        let info = TransferInfo {
            url,
            elapsed: started.elapsed(),
            http_version,
            remote_addr,
            size_download: u64::try_from(body.len()).unwrap_or(u64::MAX),
        };

        Ok(RawResponse {
            status,
            headers,
            body,
            info,
        })
    }
}

/// Effective client settings: the configuration first, then the raw
/// transport options on top.
#[derive(Debug, Clone, Default)]
struct ClientOptions {
    timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
    verify_tls: bool,
    user_agent: Option<String>,
    proxy: Option<String>,
    proxy_auth: Option<(String, SecretString)>,
    no_proxy: bool,
    verbose: bool,
    http1_only: Option<bool>,
    https_only: Option<bool>,
    tcp_nodelay: Option<bool>,
    redirect_limit: Option<usize>,
    pool_max_idle_per_host: Option<usize>,
    pool_idle_timeout: Option<Option<Duration>>,
}

impl ClientOptions {
    fn from_config(config: &Configuration) -> Self {
        let mut options = Self {
            timeout: config.timeout_duration(),
            connect_timeout: config.connect_timeout_duration(),
            verify_tls: config.verify_tls(),
            user_agent: config.user_agent().map(str::to_owned),
            verbose: config.is_debugging(),
            ..Self::default()
        };

        if let Some(proxy) = config.proxy() {
            options.proxy = Some(proxy.url());
            options.proxy_auth = proxy.user.clone().map(|user| {
                let password = proxy
                    .password
                    .clone()
                    .unwrap_or_else(|| SecretString::from(String::new()));
                (user, password)
            });
        }

        for (key, value) in config.transport_options() {
            if !options.apply(key, value) {
                tracing::warn!(option = %key, "ignoring unknown or malformed transport option");
            }
        }
        options
    }

    /// Applies one override; false when the key is unknown or the value has
    /// the wrong shape.
    fn apply(&mut self, key: &str, value: &Value) -> bool {
        match key {
            "timeout" => replace(&mut self.timeout, value.as_u64().map(non_zero_secs)),
            "connect_timeout" => replace(&mut self.connect_timeout, value.as_u64().map(non_zero_secs)),
            "verify_tls" => replace(&mut self.verify_tls, value.as_bool()),
            "user_agent" => replace(&mut self.user_agent, value.as_str().map(|ua| Some(ua.to_owned()))),
            "proxy" => self.apply_proxy(value),
            "verbose" => replace(&mut self.verbose, value.as_bool()),
            "http1_only" => replace(&mut self.http1_only, value.as_bool().map(Some)),
            "https_only" => replace(&mut self.https_only, value.as_bool().map(Some)),
            "tcp_nodelay" => replace(&mut self.tcp_nodelay, value.as_bool().map(Some)),
            "redirect_limit" => replace(&mut self.redirect_limit, as_usize(value).map(Some)),
            "pool_max_idle_per_host" => {
                replace(&mut self.pool_max_idle_per_host, as_usize(value).map(Some))
            }
            "pool_idle_timeout" => replace(
                &mut self.pool_idle_timeout,
                value.as_u64().map(|secs| Some(non_zero_secs(secs))),
            ),
            _ => false,
        }
    }

    fn apply_proxy(&mut self, value: &Value) -> bool {
        match value {
            Value::String(url) => {
                self.proxy = Some(url.clone());
                self.proxy_auth = None;
                self.no_proxy = false;
                true
            }
            Value::Null | Value::Bool(false) => {
                self.proxy = None;
                self.proxy_auth = None;
                self.no_proxy = true;
                true
            }
            _ => false,
        }
    }

    fn build(self) -> Result<reqwest::Client, TransportError> {
        let mut builder = reqwest::Client::builder()
            .danger_accept_invalid_certs(!self.verify_tls)
            .connection_verbose(self.verbose);

        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(timeout) = self.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        if let Some(user_agent) = &self.user_agent {
            builder = builder.user_agent(user_agent.as_str());
        }
        if let Some(url) = &self.proxy {
            let mut proxy = reqwest::Proxy::all(url.as_str())
                .map_err(|err| TransportError::new(error_chain(&err)))?;
            if let Some((user, password)) = &self.proxy_auth {
                proxy = proxy.basic_auth(user, password.expose_secret());
            }
            builder = builder.proxy(proxy);
        } else if self.no_proxy {
            builder = builder.no_proxy();
        }
        if self.http1_only == Some(true) {
            builder = builder.http1_only();
        }
        if let Some(https_only) = self.https_only {
            builder = builder.https_only(https_only);
        }
        if let Some(nodelay) = self.tcp_nodelay {
            builder = builder.tcp_nodelay(nodelay);
        }
        if let Some(limit) = self.redirect_limit {
            builder = builder.redirect(reqwest::redirect::Policy::limited(limit));
        }
        if let Some(max) = self.pool_max_idle_per_host {
            builder = builder.pool_max_idle_per_host(max);
        }
        if let Some(idle) = self.pool_idle_timeout {
            builder = builder.pool_idle_timeout(idle);
        }

        builder
            .build()
            .map_err(|err| TransportError::new(error_chain(&err)))
    }
}

fn replace<T>(slot: &mut T, value: Option<T>) -> bool {
    if let Some(value) = value {
        *slot = value;
        true
    } else {
        false
    }
}

fn non_zero_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

fn as_usize(value: &Value) -> Option<usize> {
    value.as_u64().and_then(|n| usize::try_from(n).ok())
}

/// Turns `name: value` lines into a header map. Lines without a colon are
/// skipped.
fn wire_headers(lines: &[String]) -> Result<HeaderMap, TransportError> {
    let mut headers = HeaderMap::new();
    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            tracing::trace!(line = %line, "skipping header line without a colon");
            continue;
        };
        let name = HeaderName::from_bytes(name.trim().as_bytes())
            .map_err(|err| TransportError::new(format!("invalid header name `{}`: {err}", name.trim())))?;
        let value = HeaderValue::from_str(value.trim())
            .map_err(|err| TransportError::new(format!("invalid value for header `{name}`: {err}")))?;
        headers.append(name, value);
    }
    Ok(headers)
}

/// Renders response headers as a `Name: value` block for `HeaderBag::parse`.
fn render_headers(headers: &HeaderMap) -> String {
    headers
        .iter()
        .map(|(name, value)| format!("{name}: {}", String::from_utf8_lossy(value.as_bytes())))
        .collect::<Vec<_>>()
        .join("\n")
}

fn version_label(version: Version) -> Option<String> {
    let label = match version {
        Version::HTTP_09 => "HTTP/0.9",
        Version::HTTP_10 => "HTTP/1.0",
        Version::HTTP_11 => "HTTP/1.1",
        Version::HTTP_2 => "HTTP/2",
        Version::HTTP_3 => "HTTP/3",
        _ => return None,
    };
    Some(label.to_owned())
}

/// Error message followed by each source, `: `-separated.
fn error_chain(err: &dyn StdError) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        if !message.contains(&cause_text) {
            message.push_str(": ");
            message.push_str(&cause_text);
        }
        source = cause.source();
    }
    message
}

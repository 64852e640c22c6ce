use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;
use tracing::Level;

use crate::headers::{HeaderBag, HeaderContent, HeaderError};

const DEFAULT_ENV: &str = "default";

/// A named API key: optional scheme prefix plus the secret itself.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiKey {
    #[serde(default)]
    pub prefix: Option<String>,
    pub key: SecretString,
}

impl ApiKey {
    /// `Authorization` value: `<prefix> <key>`, or just the key.
    #[must_use]
    pub fn header_value(&self) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix} {}", self.key.expose_secret()),
            None => self.key.expose_secret().to_owned(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyKind {
    #[default]
    Http,
    Https,
    Socks5,
}

impl ProxyKind {
    #[must_use]
    pub fn scheme(self) -> &'static str {
        match self {
            ProxyKind::Http => "http",
            ProxyKind::Https => "https",
            ProxyKind::Socks5 => "socks5",
        }
    }
}

/// Outbound proxy settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ProxySettings {
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default, rename = "type")]
    pub kind: ProxyKind,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<SecretString>,
}

impl ProxySettings {
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: None,
            kind: ProxyKind::default(),
            user: None,
            password: None,
        }
    }

    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    #[must_use]
    pub fn with_kind(mut self, kind: ProxyKind) -> Self {
        self.kind = kind;
        self
    }

    #[must_use]
    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self.password = Some(SecretString::from(password.into()));
        self
    }

    /// Proxy URL. A host that already carries a scheme keeps it.
    #[must_use]
    pub fn url(&self) -> String {
        let base = if self.host.contains("://") {
            self.host.clone()
        } else {
            format!("{}://{}", self.kind.scheme(), self.host)
        };
        match self.port {
            Some(port) => format!("{base}:{port}"),
            None => base,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BasicAuthSettings {
    pub username: String,
    pub password: SecretString,
}

/// Serializable connection profile, loadable from any serde format.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientSettings {
    pub host: String,
    pub user_agent: Option<String>,
    /// Total timeout in seconds, 0 for none.
    pub timeout: u64,
    /// Connect timeout in seconds, 0 for none.
    pub connect_timeout: u64,
    /// Defaults to `true` when omitted.
    pub verify_tls: Option<bool>,
    pub debug: bool,
    pub env: Option<String>,
    pub headers: BTreeMap<String, HeaderContent>,
    pub api_keys: BTreeMap<String, ApiKey>,
    pub basic_auth: Option<BasicAuthSettings>,
    pub proxy: Option<ProxySettings>,
}

/// Reusable connection profile consumed by [`crate::Request`].
///
/// Cloning deep-copies the default header bag, so a fork can be mutated
/// without affecting the original.
#[derive(Clone)]
pub struct Configuration {
    host: String,
    user_agent: Option<String>,
    timeout: u64,
    connect_timeout: u64,
    verify_tls: bool,
    proxy: Option<ProxySettings>,
    headers: HeaderBag,
    api_keys: HashMap<String, ApiKey>,
    username: Option<String>,
    password: Option<SecretString>,
    access_token: Option<SecretString>,
    debug: bool,
    logging: bool,
    env: String,
    custom: HashMap<String, Value>,
    transport_options: BTreeMap<String, Value>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            host: String::new(),
            user_agent: None,
            timeout: 0,
            connect_timeout: 0,
            verify_tls: true,
            proxy: None,
            headers: HeaderBag::new(),
            api_keys: HashMap::new(),
            username: None,
            password: None,
            access_token: None,
            debug: false,
            logging: true,
            env: DEFAULT_ENV.to_owned(),
            custom: HashMap::new(),
            transport_options: BTreeMap::new(),
        }
    }
}

impl fmt::Debug for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Configuration")
            .field("host", &self.host)
            .field("user_agent", &self.user_agent)
            .field("timeout", &self.timeout)
            .field("connect_timeout", &self.connect_timeout)
            .field("verify_tls", &self.verify_tls)
            .field("proxy", &self.proxy)
            .field("headers", &self.headers)
            .field("api_keys", &self.api_keys.keys().collect::<Vec<_>>())
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("access_token", &self.access_token.as_ref().map(|_| "[REDACTED]"))
            .field("debug", &self.debug)
            .field("logging", &self.logging)
            .field("env", &self.env)
            .field("custom", &self.custom)
            .field("transport_options", &self.transport_options)
            .finish()
    }
}

impl Configuration {
    #[must_use]
    pub fn new(host: impl AsRef<str>) -> Self {
        Self::default().with_host(host)
    }

    /// Builds a configuration from a deserialized profile.
    ///
    /// # Errors
    /// Returns [`HeaderError`] when a default header carries content that is
    /// neither a string nor a list of strings.
    pub fn from_settings(settings: ClientSettings) -> Result<Self, HeaderError> {
        let mut config = Self::new(&settings.host)
            .with_timeout(settings.timeout)
            .with_connect_timeout(settings.connect_timeout)
            .with_verify_tls(settings.verify_tls.unwrap_or(true))
            .with_debug(settings.debug);

        if let Some(user_agent) = settings.user_agent {
            config = config.with_user_agent(user_agent);
        }
        if let Some(env) = settings.env {
            config = config.with_env(env);
        }
        for (name, content) in settings.headers {
            config.headers.add(&name, content)?;
        }
        config.api_keys.extend(settings.api_keys);
        if let Some(auth) = settings.basic_auth {
            config.username = Some(auth.username);
            config.password = Some(auth.password);
        }
        config.proxy = settings.proxy;
        Ok(config)
    }

    /// Sets the base host; leading and trailing slashes are stripped.
    #[must_use]
    pub fn with_host(mut self, host: impl AsRef<str>) -> Self {
        self.host = host.as_ref().trim_matches('/').to_owned();
        self
    }

    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Total request timeout in seconds; 0 disables it.
    #[must_use]
    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout = seconds;
        self
    }

    /// Connection timeout in seconds; 0 disables it.
    #[must_use]
    pub fn with_connect_timeout(mut self, seconds: u64) -> Self {
        self.connect_timeout = seconds;
        self
    }

    #[must_use]
    pub fn with_verify_tls(mut self, verify: bool) -> Self {
        self.verify_tls = verify;
        self
    }

    #[must_use]
    pub fn with_proxy(mut self, proxy: ProxySettings) -> Self {
        self.proxy = Some(proxy);
        self
    }

    /// Adds a default header sent with every request.
    ///
    /// # Errors
    /// Returns [`HeaderError::MalformedContent`] for unsupported content.
    pub fn with_header(
        mut self,
        name: &str,
        content: impl Into<HeaderContent>,
    ) -> Result<Self, HeaderError> {
        self.headers.add(name, content)?;
        Ok(self)
    }

    #[must_use]
    pub fn with_api_key(
        mut self,
        identifier: impl Into<String>,
        key: impl Into<String>,
        prefix: Option<&str>,
    ) -> Self {
        self.api_keys.insert(
            identifier.into(),
            ApiKey {
                prefix: prefix.map(str::to_owned),
                key: SecretString::from(key.into()),
            },
        );
        self
    }

    #[must_use]
    pub fn with_basic_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(SecretString::from(password.into()));
        self
    }

    /// Stores an OAuth access token for [`crate::Request::bearer`].
    #[must_use]
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(SecretString::from(token.into()));
        self
    }

    #[must_use]
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Turns the error/debug log hook on or off.
    #[must_use]
    pub fn with_logging(mut self, enabled: bool) -> Self {
        self.logging = enabled;
        self
    }

    /// Label prefixed to every log message, `default` unless set.
    #[must_use]
    pub fn with_env(mut self, env: impl Into<String>) -> Self {
        self.env = env.into();
        self
    }

    #[must_use]
    pub fn with_custom(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.custom.insert(key.into(), value.into());
        self
    }

    /// Raw transport override, applied after every other setting.
    #[must_use]
    pub fn with_transport_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.transport_options.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[must_use]
    pub fn user_agent(&self) -> Option<&str> {
        self.user_agent.as_deref()
    }

    #[must_use]
    pub fn timeout(&self) -> u64 {
        self.timeout
    }

    #[must_use]
    pub fn connect_timeout(&self) -> u64 {
        self.connect_timeout
    }

    /// Total timeout as a duration, `None` when disabled.
    #[must_use]
    pub fn timeout_duration(&self) -> Option<Duration> {
        (self.timeout > 0).then(|| Duration::from_secs(self.timeout))
    }

    #[must_use]
    pub fn connect_timeout_duration(&self) -> Option<Duration> {
        (self.connect_timeout > 0).then(|| Duration::from_secs(self.connect_timeout))
    }

    #[must_use]
    pub fn verify_tls(&self) -> bool {
        self.verify_tls
    }

    #[must_use]
    pub fn proxy(&self) -> Option<&ProxySettings> {
        self.proxy.as_ref()
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderBag {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderBag {
        &mut self.headers
    }

    #[must_use]
    pub fn clone_headers(&self) -> HeaderBag {
        self.headers.clone()
    }

    /// Looks up a named key; unknown identifiers are simply absent.
    #[must_use]
    pub fn api_key(&self, identifier: &str) -> Option<&ApiKey> {
        self.api_keys.get(identifier)
    }

    #[must_use]
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    #[must_use]
    pub fn password(&self) -> Option<&SecretString> {
        self.password.as_ref()
    }

    #[must_use]
    pub fn access_token(&self) -> Option<&SecretString> {
        self.access_token.as_ref()
    }

    #[must_use]
    pub fn is_debugging(&self) -> bool {
        self.debug
    }

    #[must_use]
    pub fn is_logging(&self) -> bool {
        self.logging
    }

    #[must_use]
    pub fn env(&self) -> &str {
        &self.env
    }

    #[must_use]
    pub fn custom(&self, key: &str) -> Option<&Value> {
        self.custom.get(key)
    }

    #[must_use]
    pub fn transport_options(&self) -> &BTreeMap<String, Value> {
        &self.transport_options
    }

    /// Log hook used by the request lifecycle errors.
    ///
    /// No-op when logging is off; `DEBUG` events are dropped unless the
    /// configuration is in debug mode.
    pub fn log(&self, level: Level, message: &str, method: &str, uri: &str) {
        if !self.logging || (level == Level::DEBUG && !self.debug) {
            return;
        }
        let env = self.env.as_str();
        match level {
            Level::ERROR => tracing::error!(method, uri, "{env} :: {message}"),
            Level::WARN => tracing::warn!(method, uri, "{env} :: {message}"),
            Level::INFO => tracing::info!(method, uri, "{env} :: {message}"),
            Level::DEBUG => tracing::debug!(method, uri, "{env} :: {message}"),
            _ => tracing::trace!(method, uri, "{env} :: {message}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tracing_test::traced_test;

    #[test]
    fn test_host_is_trimmed() {
        let config = Configuration::new("https://api.example.com/");
        assert_eq!(config.host(), "https://api.example.com");
        assert_eq!(Configuration::new("/v1/").host(), "v1");
    }

    #[test]
    fn test_defaults() {
        let config = Configuration::default();
        assert_eq!(config.timeout(), 0);
        assert!(config.timeout_duration().is_none());
        assert!(config.verify_tls());
        assert!(config.is_logging());
        assert!(!config.is_debugging());
        assert_eq!(config.env(), "default");
    }

    #[test]
    fn test_timeouts() {
        let config = Configuration::default()
            .with_timeout(30)
            .with_connect_timeout(5);
        assert_eq!(config.timeout_duration(), Some(Duration::from_secs(30)));
        assert_eq!(config.connect_timeout_duration(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_unknown_api_key_is_absent() {
        let config = Configuration::default().with_api_key("main", "secret", Some("Bearer"));
        assert!(config.api_key("other").is_none());
        assert_eq!(config.api_key("main").unwrap().header_value(), "Bearer secret");

        let config = config.with_api_key("plain", "token", None);
        assert_eq!(config.api_key("plain").unwrap().header_value(), "token");
    }

    #[test]
    fn test_clone_isolates_headers() {
        let original = Configuration::new("https://api.example.com")
            .with_header("Accept", "application/json")
            .unwrap();
        let mut fork = original.clone();
        fork.headers_mut().add("Accept", "text/html").unwrap();
        fork.headers_mut().add("X-Env", "sandbox").unwrap();

        assert_eq!(original.headers().get("accept").unwrap(), ["application/json"]);
        assert!(!original.headers().has("x-env"));
    }

    #[test]
    fn test_custom_values_and_transport_options() {
        let config = Configuration::default()
            .with_custom("tenant", "acme")
            .with_transport_option("http1_only", true);
        assert_eq!(config.custom("tenant"), Some(&json!("acme")));
        assert!(config.custom("missing").is_none());
        assert_eq!(config.transport_options().get("http1_only"), Some(&json!(true)));
    }

    #[test]
    fn test_proxy_url() {
        assert_eq!(ProxySettings::new("proxy.local").with_port(3128).url(), "http://proxy.local:3128");
        assert_eq!(
            ProxySettings::new("proxy.local").with_kind(ProxyKind::Socks5).url(),
            "socks5://proxy.local"
        );
        assert_eq!(ProxySettings::new("https://p.local").url(), "https://p.local");
    }

    #[test]
    fn test_debug_output_redacts_secrets() {
        let config = Configuration::default()
            .with_basic_auth("foo", "hunter2")
            .with_api_key("main", "sk-live-123", None)
            .with_access_token("tok-456");
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("sk-live-123"));
        assert!(!rendered.contains("tok-456"));
        assert!(rendered.contains("main"));
    }

    #[test]
    fn test_from_settings() {
        let settings: ClientSettings = serde_json::from_value(json!({
            "host": "https://api.example.com/",
            "user_agent": "Testing/1.0",
            "timeout": 10,
            "env": "sandbox",
            "headers": {"Accept": "application/json, text/plain", "X-Tags": ["a", "b"]},
            "api_keys": {"main": {"prefix": "Bearer", "key": "abc"}},
            "basic_auth": {"username": "foo", "password": "bar"},
            "proxy": {"host": "proxy.local", "port": 8080, "type": "https"}
        }))
        .unwrap();

        let config = Configuration::from_settings(settings).unwrap();
        assert_eq!(config.host(), "https://api.example.com");
        assert_eq!(config.user_agent(), Some("Testing/1.0"));
        assert_eq!(config.timeout(), 10);
        assert!(config.verify_tls());
        assert_eq!(config.env(), "sandbox");
        assert_eq!(
            config.headers().get("accept").unwrap(),
            ["application/json", "text/plain"]
        );
        assert_eq!(config.headers().get("x-tags").unwrap(), ["a", "b"]);
        assert_eq!(config.api_key("main").unwrap().header_value(), "Bearer abc");
        assert_eq!(config.username(), Some("foo"));
        assert_eq!(config.proxy().unwrap().url(), "https://proxy.local:8080");
    }

    #[test]
    fn test_from_settings_rejects_bad_header_content() {
        let settings: ClientSettings =
            serde_json::from_value(json!({"headers": {"X-Count": 3}})).unwrap();
        assert!(Configuration::from_settings(settings).is_err());
    }

    #[test]
    #[traced_test]
    fn test_log_prefixes_env_and_respects_debug() {
        let config = Configuration::default().with_env("sandbox");
        config.log(Level::ERROR, "api.request.error -> boom", "GET", "https://x");
        config.log(Level::DEBUG, "hidden debug line", "GET", "https://x");
        assert!(logs_contain("sandbox :: api.request.error -> boom"));
        assert!(!logs_contain("hidden debug line"));

        let config = config.with_debug(true);
        config.log(Level::DEBUG, "visible debug line", "GET", "https://x");
        assert!(logs_contain("visible debug line"));
    }

    #[test]
    #[traced_test]
    fn test_log_is_noop_when_disabled() {
        let config = Configuration::default().with_logging(false);
        config.log(Level::ERROR, "silenced error", "GET", "https://x");
        assert!(!logs_contain("silenced error"));
    }
}

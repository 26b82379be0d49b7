//! Provider configuration.
//!
//! One immutable [`ProviderConfig`] value is handed to the gate, the token
//! lifecycle manager and the endpoint layer when they are built.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use super::signature::SignatureMethod;

/// How consumer registration status gates the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsumerPolicy {
    /// Status is informational only.
    #[default]
    Advisory,
    /// Only `Accepted` consumers may use any endpoint.
    AcceptedOnly,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Signature methods accepted by the gate.
    pub signature_methods: Vec<SignatureMethod>,
    /// Length of generated token keys.
    pub key_size: usize,
    /// Length of generated token and consumer secrets.
    pub secret_size: usize,
    /// Length of generated consumer keys.
    pub consumer_key_size: usize,
    /// Length of generated verifiers.
    pub verifier_size: usize,
    /// Callback hostnames that are refused.
    pub blacklisted_hostnames: Vec<String>,
    /// Realm advertised in `WWW-Authenticate`.
    pub realm: String,
    pub request_token_ttl_secs: Option<i64>,
    /// `None` keeps access tokens until they are revoked.
    pub access_token_ttl_secs: Option<i64>,
    /// Requests with an older `oauth_timestamp` are rejected, and ledger
    /// entries older than this may be purged. `None` retains every nonce.
    pub nonce_window_secs: Option<i64>,
    /// Refuse PLAINTEXT signatures on non-https requests.
    pub plaintext_requires_tls: bool,
    pub consumer_policy: ConsumerPolicy,
    /// Scope used when a request-token request does not name one.
    pub default_scope: Option<String>,
    pub approval_ticket_ttl_secs: i64,
    pub request_token_path: String,
    pub authorize_path: String,
    pub access_token_path: String,
    /// Login page unauthenticated users are sent to from the authorize endpoint.
    pub login_url: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        ProviderConfig {
            signature_methods: vec![SignatureMethod::Plaintext, SignatureMethod::HmacSha1],
            key_size: 16,
            secret_size: 16,
            consumer_key_size: 256,
            verifier_size: 10,
            blacklisted_hostnames: Vec::new(),
            realm: String::new(),
            request_token_ttl_secs: Some(600),
            access_token_ttl_secs: None,
            nonce_window_secs: None,
            plaintext_requires_tls: true,
            consumer_policy: ConsumerPolicy::Advisory,
            default_scope: None,
            approval_ticket_ttl_secs: 600,
            request_token_path: "/oauth/request_token/".into(),
            authorize_path: "/oauth/authorize/".into(),
            access_token_path: "/oauth/access_token/".into(),
            login_url: "/accounts/login/".into(),
        }
    }
}

impl ProviderConfig {
    /// Loads a configuration from JSON; absent fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn with_signature_methods(mut self, methods: impl IntoIterator<Item = SignatureMethod>) -> Self {
        self.signature_methods = methods.into_iter().collect();
        self
    }

    pub fn with_realm<S: Into<String>>(mut self, realm: S) -> Self {
        self.realm = realm.into();
        self
    }

    pub fn with_blacklisted_hostnames<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.blacklisted_hostnames = hosts.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_request_token_ttl(mut self, secs: Option<i64>) -> Self {
        self.request_token_ttl_secs = secs;
        self
    }

    pub fn with_access_token_ttl(mut self, secs: Option<i64>) -> Self {
        self.access_token_ttl_secs = secs;
        self
    }

    pub fn with_nonce_window(mut self, secs: Option<i64>) -> Self {
        self.nonce_window_secs = secs;
        self
    }

    /// Accept PLAINTEXT signatures over plain http as well.
    pub fn allow_plaintext_over_http(mut self) -> Self {
        self.plaintext_requires_tls = false;
        self
    }

    pub fn with_consumer_policy(mut self, policy: ConsumerPolicy) -> Self {
        self.consumer_policy = policy;
        self
    }

    pub fn with_default_scope<S: Into<String>>(mut self, scope: S) -> Self {
        self.default_scope = Some(scope.into());
        self
    }

    pub fn with_login_url<S: Into<String>>(mut self, url: S) -> Self {
        self.login_url = url.into();
        self
    }

    pub fn accepts(&self, method: SignatureMethod) -> bool {
        self.signature_methods.contains(&method)
    }

    pub fn is_blacklisted(&self, host: &str) -> bool {
        self.blacklisted_hostnames
            .iter()
            .any(|blocked| blocked.eq_ignore_ascii_case(host))
    }

    pub fn request_token_ttl(&self) -> Option<Duration> {
        self.request_token_ttl_secs.and_then(Duration::try_seconds)
    }

    pub fn access_token_ttl(&self) -> Option<Duration> {
        self.access_token_ttl_secs.and_then(Duration::try_seconds)
    }

    pub fn nonce_window(&self) -> Option<Duration> {
        self.nonce_window_secs.and_then(Duration::try_seconds)
    }

    pub fn approval_ticket_ttl(&self) -> Duration {
        Duration::try_seconds(self.approval_ticket_ttl_secs).unwrap_or_else(Duration::zero)
    }
}

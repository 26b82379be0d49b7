//! OAuth 1.0a core records: Consumer, Resource, Token and errors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::config::ProviderConfig;
use super::crypto::random_string;
use super::http::OAuthResponse;

/// Registration status of a consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConsumerStatus {
    Pending,
    Accepted,
    Canceled,
    Rejected,
}

/// A registered API client holding a key/secret pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Consumer {
    /// Public identifier (`oauth_consumer_key`).
    pub key: String,
    /// Shared secret, never echoed back in any response.
    pub secret: String,
    /// Display name shown on the approval page.
    pub name: String,
    /// Principal that registered the consumer.
    pub owner: String,
    pub status: ConsumerStatus,
}

impl Consumer {
    /// Creates a consumer with known credentials, in `Pending` status.
    pub fn new(
        key: impl Into<String>,
        secret: impl Into<String>,
        name: impl Into<String>,
        owner: impl Into<String>,
    ) -> Self {
        Consumer {
            key: key.into(),
            secret: secret.into(),
            name: name.into(),
            owner: owner.into(),
            status: ConsumerStatus::Pending,
        }
    }

    /// Creates a consumer with a random key and secret sized by `config`.
    pub fn generate_credentials(
        name: impl Into<String>,
        owner: impl Into<String>,
        config: &ProviderConfig,
    ) -> Result<Self, OAuthError> {
        Ok(Consumer::new(
            random_string(config.consumer_key_size)?,
            random_string(config.secret_size)?,
            name,
            owner,
        ))
    }

    /// Replaces the shared secret; the key stays stable.
    pub fn rotate_secret(&mut self, config: &ProviderConfig) -> Result<(), OAuthError> {
        self.secret = random_string(config.secret_size)?;
        Ok(())
    }

    pub fn with_status(mut self, status: ConsumerStatus) -> Self {
        self.status = status;
        self
    }
}

/// A named, URL-scoped protected resource category ("scope").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub name: String,
    pub url: String,
}

impl Resource {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Resource { name: name.into(), url: url.into() }
    }
}

/// The two token kinds sharing the [`Token`] shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenType {
    Request,
    Access,
}

/// User decision recorded on a token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Approval {
    /// No decision yet.
    Pending,
    /// Approved; the verifier must be presented at exchange.
    Granted { verifier: String },
    /// Refused; terminal, the token can never be exchanged.
    Denied,
}

/// Request or access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub key: String,
    pub secret: String,
    pub token_type: TokenType,
    /// Key of the owning consumer.
    pub consumer_key: String,
    /// Name of the resource (scope) the token is bound to.
    pub resource: String,
    /// Principal that approved the token; `None` until approval.
    pub user: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    /// Callback URL, `None` when the consumer asked for out-of-band delivery.
    pub callback: Option<String>,
    /// True only when a real callback URL was supplied.
    pub callback_confirmed: bool,
    pub approval: Approval,
}

impl Token {
    pub fn is_approved(&self) -> bool {
        matches!(self.approval, Approval::Granted { .. })
    }

    pub fn is_denied(&self) -> bool {
        matches!(self.approval, Approval::Denied)
    }

    pub fn verifier(&self) -> Option<&str> {
        match &self.approval {
            Approval::Granted { verifier } => Some(verifier),
            _ => None,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    pub fn is_out_of_band(&self) -> bool {
        self.callback.is_none()
    }
}

/// Infrastructure failure of the credential store or nonce ledger.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Every rejection the provider can produce.
///
/// All variants except [`OAuthError::Store`] and
/// [`OAuthError::RandomUnavailable`] are expected, user-facing outcomes.
#[derive(Debug, thiserror::Error)]
pub enum OAuthError {
    /// Missing, duplicated or unparsable protocol parameters. The detail is
    /// logged, never sent.
    #[error("Invalid request parameters.")]
    MalformedRequest(String),
    /// Same as `MalformedRequest`, raised on the access-token exchange.
    #[error("Invalid request parameters.")]
    MalformedExchange(String),
    #[error("Invalid consumer: {0}")]
    UnknownConsumer(String),
    #[error("Resource {0} does not exist.")]
    UnknownResource(String),
    #[error("Invalid access token: {0}")]
    UnknownToken(String),
    #[error("Invalid request token.")]
    InvalidToken,
    #[error("Invalid signature method: {0}")]
    InvalidSignatureMethod(String),
    #[error("Invalid signature. Expected signature base string: {base_string}")]
    SignatureMismatch { base_string: String },
    #[error("Replayed request: {0}")]
    ReplayedRequest(String),
    #[error("Invalid callback URL.")]
    InvalidCallback,
    #[error("Request Token not approved by the user.")]
    NotApproved,
    #[error("Invalid OAuth verifier.")]
    InvalidVerifier,
    #[error("Token scope {granted} does not cover resource {requested}.")]
    ScopeMismatch { granted: String, requested: String },
    #[error("Token expired: {0}")]
    TokenExpired(String),
    #[error("Consumer {0} has been revoked.")]
    Revoked(String),
    #[error("Consumer {0} is not accepted.")]
    ConsumerNotAccepted(String),
    #[error("Action not allowed.")]
    ActionNotAllowed,
    #[error("secure random source unavailable")]
    RandomUnavailable,
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl OAuthError {
    /// Stable machine-readable reason code.
    pub fn code(&self) -> &'static str {
        match self {
            OAuthError::MalformedRequest(_) => "malformed_request",
            OAuthError::MalformedExchange(_) => "malformed_exchange",
            OAuthError::UnknownConsumer(_) => "unknown_consumer",
            OAuthError::UnknownResource(_) => "unknown_resource",
            OAuthError::UnknownToken(_) => "unknown_token",
            OAuthError::InvalidToken => "invalid_token",
            OAuthError::InvalidSignatureMethod(_) => "invalid_signature_method",
            OAuthError::SignatureMismatch { .. } => "signature_mismatch",
            OAuthError::ReplayedRequest(_) => "replayed_request",
            OAuthError::InvalidCallback => "invalid_callback",
            OAuthError::NotApproved => "not_approved",
            OAuthError::InvalidVerifier => "invalid_verifier",
            OAuthError::ScopeMismatch { .. } => "scope_mismatch",
            OAuthError::TokenExpired(_) => "token_expired",
            OAuthError::Revoked(_) => "revoked",
            OAuthError::ConsumerNotAccepted(_) => "consumer_not_accepted",
            OAuthError::ActionNotAllowed => "action_not_allowed",
            OAuthError::RandomUnavailable | OAuthError::Store(_) => "server_error",
        }
    }

    /// HTTP status class for this rejection.
    pub fn status(&self) -> u16 {
        match self {
            OAuthError::MalformedExchange(_)
            | OAuthError::InvalidToken
            | OAuthError::NotApproved
            | OAuthError::InvalidVerifier => 400,
            OAuthError::RandomUnavailable | OAuthError::Store(_) => 500,
            _ => 401,
        }
    }

    /// Diagnostic detail kept out of the response body.
    pub fn detail(&self) -> Option<&str> {
        match self {
            OAuthError::MalformedRequest(detail) | OAuthError::MalformedExchange(detail) => Some(detail),
            _ => None,
        }
    }

    /// True for infrastructure failures the caller should treat as 5xx.
    pub fn is_fatal(&self) -> bool {
        self.status() >= 500
    }

    /// Convert this error into a plain-text response; 401 responses carry
    /// `WWW-Authenticate: OAuth realm="<realm>"`.
    pub fn into_response(&self, realm: &str) -> OAuthResponse {
        let status = self.status();
        let code = self.code();
        warn!(
            error = %self,
            detail = self.detail().unwrap_or_default(),
            error_code = code,
            http_status = status,
            "OAuth request rejected"
        );
        let body = if self.is_fatal() {
            "Internal server error.".to_string()
        } else {
            self.to_string()
        };
        let mut resp = OAuthResponse::text(status, body);
        if status == 401 {
            resp.headers.push((
                "WWW-Authenticate".to_string(),
                format!("OAuth realm=\"{}\"", realm),
            ));
        }
        resp
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn token() -> Token {
        Token {
            key: "k".into(),
            secret: "s".into(),
            token_type: TokenType::Request,
            consumer_key: "c".into(),
            resource: "photos".into(),
            user: None,
            created_at: Utc::now(),
            expires_at: None,
            callback: None,
            callback_confirmed: false,
            approval: Approval::Pending,
        }
    }

    #[test]
    fn test_token_state_helpers() {
        let mut t = token();
        assert!(!t.is_approved());
        assert!(t.verifier().is_none());
        assert!(t.is_out_of_band());
        t.approval = Approval::Granted { verifier: "v".into() };
        assert!(t.is_approved());
        assert_eq!(t.verifier(), Some("v"));
        t.approval = Approval::Denied;
        assert!(t.is_denied());
        assert!(!t.is_approved());
    }

    #[test]
    fn test_expiry() {
        let now = Utc::now();
        let mut t = token();
        assert!(!t.is_expired_at(now));
        t.expires_at = Some(now - Duration::seconds(1));
        assert!(t.is_expired_at(now));
        t.expires_at = Some(now + Duration::seconds(60));
        assert!(!t.is_expired_at(now));
    }

    #[test]
    fn test_generated_consumer_credentials() {
        let config = ProviderConfig::default();
        let mut consumer = Consumer::generate_credentials("printer", "jane", &config).unwrap();
        assert_eq!(consumer.key.len(), config.consumer_key_size);
        assert_eq!(consumer.secret.len(), config.secret_size);
        assert_eq!(consumer.status, ConsumerStatus::Pending);
        let key = consumer.key.clone();
        let old = consumer.secret.clone();
        consumer.rotate_secret(&config).unwrap();
        assert_eq!(consumer.key, key);
        assert_ne!(consumer.secret, old);
    }

    #[test]
    fn test_store_failures_hide_details() {
        let err = OAuthError::from(StoreError::Unavailable("db password=hunter2".into()));
        let resp = err.into_response("");
        assert_eq!(resp.status, 500);
        assert_eq!(resp.body, "Internal server error.");
        assert!(resp.header("WWW-Authenticate").is_none());
    }

    #[test]
    fn test_malformed_detail_stays_out_of_body() {
        let err = OAuthError::MalformedRequest("missing oauth_nonce".into());
        assert_eq!(err.detail(), Some("missing oauth_nonce"));
        let resp = err.into_response("");
        assert_eq!(resp.status, 401);
        assert_eq!(resp.body, "Invalid request parameters.");
        assert_eq!(resp.header("WWW-Authenticate"), Some("OAuth realm=\"\""));

        let resp = OAuthError::MalformedExchange("missing oauth_token".into()).into_response("");
        assert_eq!(resp.status, 400);
        assert_eq!(resp.body, "Invalid request parameters.");
        assert!(resp.header("WWW-Authenticate").is_none());
    }
}

//! Authentication Gate: accepts or rejects one signed request.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, instrument};

use super::config::{ConsumerPolicy, ProviderConfig};
use super::http::{OAuthRequest, RequestParameters};
use super::nonce::{NonceCheck, NonceLedger};
use super::oauth_provider::CredentialStore;
use super::signature::{SignatureEngine, SignedRequest};
use super::token_manager::TokenLifecycle;
use super::types::{Consumer, ConsumerStatus, OAuthError, Resource, Token, TokenType};

/// Protocol parameters every signed request carries.
pub const MANDATORY_PARAMETERS: [&str; 6] = [
    "oauth_consumer_key",
    "oauth_signature_method",
    "oauth_signature",
    "oauth_timestamp",
    "oauth_nonce",
    "oauth_version",
];

const OAUTH_VERSION: &str = "1.0";

/// Which token, if any, the endpoint expects the request to be signed with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenRequirement {
    /// Consumer credentials only (request-token endpoint).
    None,
    /// A request token (access-token endpoint).
    Request,
    /// An access token, optionally restricted to one scope.
    Access { scope: Option<String> },
}

/// Outcome of a successful authentication.
#[derive(Debug, Clone)]
pub struct Verdict {
    pub consumer: Consumer,
    /// Principal that approved the presented token.
    pub user: Option<String>,
    pub token: Option<Token>,
    /// Declared scope, resolved.
    pub resource: Option<Resource>,
    /// Everything the request carried, for the endpoint to read.
    pub parameters: RequestParameters,
}

#[derive(Clone)]
pub struct AuthenticationGate {
    store: Arc<dyn CredentialStore>,
    nonces: Arc<dyn NonceLedger>,
    tokens: TokenLifecycle,
    engine: SignatureEngine,
    config: Arc<ProviderConfig>,
}

impl AuthenticationGate {
    pub fn new(store: Arc<dyn CredentialStore>, nonces: Arc<dyn NonceLedger>, config: Arc<ProviderConfig>) -> Self {
        AuthenticationGate {
            tokens: TokenLifecycle::new(store.clone(), config.clone()),
            engine: SignatureEngine::new(&config),
            store,
            nonces,
            config,
        }
    }

    pub fn tokens(&self) -> &TokenLifecycle {
        &self.tokens
    }

    /// Runs every check in order and records the nonce once the signature
    /// has been verified. Structural failures on a request-token exchange
    /// come back as `MalformedExchange`.
    #[instrument(skip(self, request), fields(method = %request.method, url = %request.url), level = "debug")]
    pub async fn authenticate(
        &self,
        request: &OAuthRequest,
        requirement: &TokenRequirement,
    ) -> Result<Verdict, OAuthError> {
        match self.check(request, requirement).await {
            Err(OAuthError::MalformedRequest(detail)) if *requirement == TokenRequirement::Request => {
                Err(OAuthError::MalformedExchange(detail))
            }
            outcome => outcome,
        }
    }

    async fn check(&self, request: &OAuthRequest, requirement: &TokenRequirement) -> Result<Verdict, OAuthError> {
        let parameters = request.parameters()?;
        let missing: Vec<&str> = MANDATORY_PARAMETERS
            .iter()
            .copied()
            .filter(|name| parameters.get(name).is_none_or(str::is_empty))
            .collect();
        if !missing.is_empty() {
            return Err(OAuthError::MalformedRequest(format!("missing {}", missing.join(", "))));
        }
        let param = |name: &str| parameters.get(name).unwrap_or_default();

        if param("oauth_version") != OAUTH_VERSION {
            return Err(OAuthError::MalformedRequest(format!(
                "unsupported oauth_version {}",
                param("oauth_version")
            )));
        }
        let timestamp = param("oauth_timestamp")
            .parse::<u64>()
            .ok()
            .and_then(|ts| i64::try_from(ts).ok())
            .ok_or_else(|| OAuthError::MalformedRequest("oauth_timestamp is not a non-negative integer".into()))?;
        let method = self.engine.method(param("oauth_signature_method"), request.is_secure())?;

        let consumer_key = param("oauth_consumer_key");
        let consumer = self
            .store
            .get_consumer(consumer_key)
            .await?
            .ok_or_else(|| OAuthError::UnknownConsumer(consumer_key.to_string()))?;
        self.admit(&consumer)?;

        let declared = match requirement {
            TokenRequirement::Access { scope: Some(scope) } => Some(scope.clone()),
            TokenRequirement::None => parameters
                .get("scope")
                .map(str::to_string)
                .or_else(|| self.config.default_scope.clone()),
            _ => parameters.get("scope").map(str::to_string),
        };
        let resource = match &declared {
            Some(name) => Some(
                self.store
                    .get_resource(name)
                    .await?
                    .ok_or_else(|| OAuthError::UnknownResource(name.clone()))?,
            ),
            None => None,
        };

        let token = self.resolve_token(&parameters, requirement, &consumer, declared.as_deref()).await?;

        if let Some(window) = self.config.nonce_window() {
            let fresh = Utc::now()
                .timestamp()
                .checked_sub(timestamp)
                .and_then(i64::checked_abs)
                .is_some_and(|age| age <= window.num_seconds());
            if !fresh {
                return Err(OAuthError::ReplayedRequest(format!(
                    "oauth_timestamp {timestamp} is outside the accepted window"
                )));
            }
        }

        let signed = SignedRequest {
            method: &request.method,
            url: &request.url,
            params: parameters.signed(),
        };
        let token_secret = token.as_ref().map(|t| t.secret.as_str()).unwrap_or_default();
        self.engine
            .verify(method, signed, &consumer.secret, token_secret, param("oauth_signature"))?;

        let token_key = token.as_ref().map(|t| t.key.as_str()).unwrap_or_default();
        let nonce = param("oauth_nonce");
        if self
            .nonces
            .check_and_record(&consumer.key, token_key, nonce, timestamp)
            .await?
            == NonceCheck::Duplicate
        {
            return Err(OAuthError::ReplayedRequest(format!("nonce {nonce} has already been used")));
        }

        debug!(consumer = %consumer.key, token = %token_key, "request authenticated");
        Ok(Verdict {
            user: token.as_ref().and_then(|t| t.user.clone()),
            consumer,
            token,
            resource,
            parameters,
        })
    }

    /// Drops ledger entries that fall outside the freshness window.
    /// Without a window every nonce is retained and nothing is purged.
    pub async fn purge_nonces(&self) -> Result<usize, OAuthError> {
        match self.config.nonce_window() {
            Some(window) => Ok(self
                .nonces
                .purge_older_than(Utc::now().timestamp().saturating_sub(window.num_seconds()))
                .await?),
            None => Ok(0),
        }
    }

    fn admit(&self, consumer: &Consumer) -> Result<(), OAuthError> {
        match (self.config.consumer_policy, consumer.status) {
            (ConsumerPolicy::Advisory, _) | (_, ConsumerStatus::Accepted) => Ok(()),
            (_, ConsumerStatus::Pending) => Err(OAuthError::ConsumerNotAccepted(consumer.key.clone())),
            _ => Err(OAuthError::Revoked(consumer.key.clone())),
        }
    }

    async fn resolve_token(
        &self,
        parameters: &RequestParameters,
        requirement: &TokenRequirement,
        consumer: &Consumer,
        scope: Option<&str>,
    ) -> Result<Option<Token>, OAuthError> {
        let presented = parameters.get("oauth_token").filter(|k| !k.is_empty());
        match requirement {
            TokenRequirement::None => match presented {
                Some(key) => match self.store.get_token(key).await? {
                    Some(token) => Ok(Some(token)),
                    None => Err(OAuthError::UnknownToken(key.to_string())),
                },
                None => Ok(None),
            },
            TokenRequirement::Request => {
                let key = presented.ok_or_else(|| OAuthError::MalformedRequest("missing oauth_token".into()))?;
                match self.store.get_token(key).await? {
                    Some(token) if token.token_type == TokenType::Request => Ok(Some(token)),
                    _ => Err(OAuthError::InvalidToken),
                }
            }
            TokenRequirement::Access { .. } => {
                let key = presented.ok_or_else(|| OAuthError::MalformedRequest("missing oauth_token".into()))?;
                Ok(Some(self.tokens.validate_access(key, consumer, scope).await?))
            }
        }
    }
}

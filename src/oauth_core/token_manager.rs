//! Token Lifecycle Manager: issuance, approval, exchange and revocation.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument};
use url::Url;

use super::config::ProviderConfig;
use super::crypto::{constant_time_eq, random_string};
use super::gate::Verdict;
use super::oauth_provider::CredentialStore;
use super::types::{Approval, Consumer, OAuthError, Resource, Token, TokenType};

/// Sentinel for consumers that cannot receive a redirect.
pub const OUT_OF_BAND: &str = "oob";

/// Attempts at drawing a token key that is not already taken.
const KEY_ATTEMPTS: usize = 8;

/// Creates and transitions tokens against a shared credential store.
#[derive(Clone)]
pub struct TokenLifecycle {
    store: Arc<dyn CredentialStore>,
    config: Arc<ProviderConfig>,
}

impl TokenLifecycle {
    pub fn new(store: Arc<dyn CredentialStore>, config: Arc<ProviderConfig>) -> Self {
        TokenLifecycle { store, config }
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// Validates a consumer-supplied callback.
    ///
    /// Returns `None` for out-of-band delivery (`oob` or empty), the URL
    /// otherwise. Relative URLs, URLs without a host and blacklisted hosts
    /// are refused.
    pub fn check_callback(&self, callback: &str) -> Result<Option<String>, OAuthError> {
        let callback = callback.trim();
        if callback.is_empty() || callback.eq_ignore_ascii_case(OUT_OF_BAND) {
            return Ok(None);
        }
        let url = Url::parse(callback).map_err(|_| OAuthError::InvalidCallback)?;
        let host = url.host_str().ok_or(OAuthError::InvalidCallback)?;
        if self.config.is_blacklisted(host) {
            return Err(OAuthError::InvalidCallback);
        }
        Ok(Some(callback.to_string()))
    }

    /// Issues an unapproved request token bound to `resource`.
    #[instrument(skip(self, consumer, resource), fields(consumer = %consumer.key, scope = %resource.name), level = "debug")]
    pub async fn create_request_token(
        &self,
        consumer: &Consumer,
        resource: &Resource,
        callback: &str,
    ) -> Result<Token, OAuthError> {
        let callback = self.check_callback(callback)?;
        let now = Utc::now();
        let token = Token {
            key: self.unused_key().await?,
            secret: random_string(self.config.secret_size)?,
            token_type: TokenType::Request,
            consumer_key: consumer.key.clone(),
            resource: resource.name.clone(),
            user: None,
            created_at: now,
            expires_at: self.config.request_token_ttl().map(|ttl| now + ttl),
            callback_confirmed: callback.is_some(),
            callback,
            approval: Approval::Pending,
        };
        self.store.insert_token(token.clone()).await?;
        info!(consumer = %token.consumer_key, token = %token.key, "request token issued");
        Ok(token)
    }

    /// Records the user's decision on a request token.
    ///
    /// An undecided token may be granted or denied; a granted token may
    /// still be denied. Every other transition, and any decision racing
    /// with another change to the same token, is `ActionNotAllowed`.
    #[instrument(skip(self, token), fields(token = %token.key), level = "debug")]
    pub async fn approve(&self, token: &Token, user: &str, granted: bool) -> Result<Token, OAuthError> {
        if token.token_type != TokenType::Request {
            return Err(OAuthError::InvalidToken);
        }
        if token.is_expired_at(Utc::now()) {
            return Err(OAuthError::TokenExpired(token.key.clone()));
        }
        let approval = match (&token.approval, granted) {
            (Approval::Pending, true) => Approval::Granted {
                verifier: random_string(self.config.verifier_size)?,
            },
            (Approval::Pending, false) | (Approval::Granted { .. }, false) => Approval::Denied,
            _ => return Err(OAuthError::ActionNotAllowed),
        };
        let mut next = token.clone();
        next.user = Some(user.to_string());
        next.approval = approval;
        if !self.store.replace_token(token, next.clone()).await? {
            return Err(OAuthError::ActionNotAllowed);
        }
        info!(consumer = %next.consumer_key, token = %next.key, granted, "request token decided");
        Ok(next)
    }

    /// Trades the verified request token for an access token.
    ///
    /// `verdict` is the gate's proof that the exchange request was signed
    /// with this request token. The request token is consumed exactly once,
    /// even under concurrent attempts.
    #[instrument(skip(self, verdict, verifier), fields(consumer = %verdict.consumer.key), level = "debug")]
    pub async fn exchange(&self, verdict: &Verdict, verifier: &str) -> Result<Token, OAuthError> {
        let presented = verdict.token.as_ref().ok_or(OAuthError::InvalidToken)?;
        let request = match self.store.get_token(&presented.key).await? {
            Some(t) if t.token_type == TokenType::Request => t,
            _ => return Err(OAuthError::InvalidToken),
        };
        if request.consumer_key != verdict.consumer.key {
            return Err(OAuthError::InvalidToken);
        }
        let expected = request.verifier().ok_or(OAuthError::NotApproved)?;
        if verifier.is_empty() || !constant_time_eq(expected.as_bytes(), verifier.as_bytes()) {
            return Err(OAuthError::InvalidVerifier);
        }
        let now = Utc::now();
        if request.is_expired_at(now) {
            return Err(OAuthError::TokenExpired(request.key.clone()));
        }

        let access = Token {
            key: self.unused_key().await?,
            secret: random_string(self.config.secret_size)?,
            token_type: TokenType::Access,
            consumer_key: request.consumer_key.clone(),
            resource: request.resource.clone(),
            user: request.user.clone(),
            created_at: now,
            expires_at: self.config.access_token_ttl().map(|ttl| now + ttl),
            callback: None,
            callback_confirmed: false,
            approval: request.approval.clone(),
        };
        if !self.store.replace_token(&request, access.clone()).await? {
            return Err(OAuthError::InvalidToken);
        }
        info!(consumer = %access.consumer_key, request_token = %request.key, token = %access.key, "access token issued");
        Ok(access)
    }

    /// Resolves an access token presented to a protected resource.
    ///
    /// `scope` is the resource name the caller protects; `None` accepts any
    /// scope.
    pub async fn validate_access(
        &self,
        token_key: &str,
        consumer: &Consumer,
        scope: Option<&str>,
    ) -> Result<Token, OAuthError> {
        let token = match self.store.get_token(token_key).await? {
            Some(t) if t.token_type == TokenType::Access => t,
            _ => return Err(OAuthError::UnknownToken(token_key.to_string())),
        };
        if token.is_expired_at(Utc::now()) {
            return Err(OAuthError::TokenExpired(token.key));
        }
        if let Some(requested) = scope {
            if token.resource != requested {
                return Err(OAuthError::ScopeMismatch {
                    granted: token.resource,
                    requested: requested.to_string(),
                });
            }
        }
        if token.consumer_key != consumer.key {
            return Err(OAuthError::UnknownToken(token_key.to_string()));
        }
        Ok(token)
    }

    /// Deletes a token of either kind.
    pub async fn revoke(&self, token_key: &str) -> Result<Option<Token>, OAuthError> {
        let removed = self.store.delete_token(token_key).await?;
        if let Some(token) = &removed {
            info!(consumer = %token.consumer_key, token = %token.key, "token revoked");
        }
        Ok(removed)
    }

    /// Deletes an access token on behalf of the user who approved it.
    /// Returns `false` when the token is unknown or belongs to someone else.
    pub async fn revoke_for_user(&self, token_key: &str, user: &str) -> Result<bool, OAuthError> {
        let owned = self
            .store
            .get_token(token_key)
            .await?
            .is_some_and(|t| t.token_type == TokenType::Access && t.user.as_deref() == Some(user));
        if !owned {
            return Ok(false);
        }
        Ok(self.revoke(token_key).await?.is_some())
    }

    async fn unused_key(&self) -> Result<String, OAuthError> {
        for _ in 0..KEY_ATTEMPTS {
            let key = random_string(self.config.key_size)?;
            if self.store.get_token(&key).await?.is_none() {
                return Ok(key);
            }
        }
        Err(OAuthError::RandomUnavailable)
    }
}

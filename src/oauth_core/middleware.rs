use std::sync::Arc;

use tracing::instrument;

use super::authorization::{ApprovalTickets, AuthorizationUi, PlainAuthorizationUi, callback_location};
use super::config::ProviderConfig;
use super::encoding::{encode_form, encode_path};
use super::gate::{AuthenticationGate, TokenRequirement, Verdict};
use super::http::{OAuthRequest, OAuthResponse};
use super::memory::InMemoryCredentialStore;
use super::nonce::{InMemoryNonceLedger, NonceLedger};
use super::oauth_provider::CredentialStore;
use super::token_manager::TokenLifecycle;
use super::types::{OAuthError, Token, TokenType};

/// OAuth 1.0a provider endpoints with configurable stores.
#[derive(Clone)]
pub struct OAuthLayer {
    config: Arc<ProviderConfig>,
    store: Arc<dyn CredentialStore>,
    nonces: Arc<dyn NonceLedger>,
    ui: Arc<dyn AuthorizationUi>,
    gate: AuthenticationGate,
    tickets: ApprovalTickets,
}

impl OAuthLayer {
    /// Creates a layer with in-memory stores and the plain approval page.
    pub fn new(config: ProviderConfig) -> Self {
        let config = Arc::new(config);
        let store: Arc<dyn CredentialStore> = Arc::new(InMemoryCredentialStore::new());
        let nonces: Arc<dyn NonceLedger> = Arc::new(InMemoryNonceLedger::new());
        OAuthLayer {
            gate: AuthenticationGate::new(store.clone(), nonces.clone(), config.clone()),
            tickets: ApprovalTickets::new(config.approval_ticket_ttl()),
            ui: Arc::new(PlainAuthorizationUi),
            config,
            store,
            nonces,
        }
    }

    /// Sets a custom credential store.
    pub fn credential_store(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.store = store;
        self.rebuild_gate();
        self
    }

    /// Sets a custom nonce ledger.
    pub fn nonce_ledger(mut self, nonces: Arc<dyn NonceLedger>) -> Self {
        self.nonces = nonces;
        self.rebuild_gate();
        self
    }

    /// Sets the pages shown during authorization.
    pub fn authorization_ui(mut self, ui: Arc<dyn AuthorizationUi>) -> Self {
        self.ui = ui;
        self
    }

    fn rebuild_gate(&mut self) {
        self.gate = AuthenticationGate::new(self.store.clone(), self.nonces.clone(), self.config.clone());
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    pub fn gate(&self) -> &AuthenticationGate {
        &self.gate
    }

    pub fn tokens(&self) -> &TokenLifecycle {
        self.gate.tokens()
    }

    /// Routes a request to the endpoint matching its path.
    #[instrument(skip(self, request), fields(method = %request.method, url = %request.url), level = "debug")]
    pub async fn handle(&self, request: OAuthRequest) -> OAuthResponse {
        let path = match request.path() {
            Ok(path) => path,
            Err(err) => return self.reject(&err),
        };
        let result = if path == self.config.request_token_path {
            self.request_token(&request).await
        } else if path == self.config.authorize_path {
            if request.is_post() {
                self.authorize_decision(&request).await
            } else {
                self.authorize_page(&request).await
            }
        } else if path == self.config.access_token_path {
            self.access_token(&request).await
        } else {
            return OAuthResponse::text(404, "Not found.");
        };
        result.unwrap_or_else(|err| self.reject(&err))
    }

    /// Authenticates a protected-resource request signed with an access
    /// token, restricted to `scope` when given.
    pub async fn protect(&self, request: &OAuthRequest, scope: Option<&str>) -> Result<Verdict, OAuthError> {
        let requirement = TokenRequirement::Access { scope: scope.map(str::to_string) };
        self.gate.authenticate(request, &requirement).await
    }

    /// Renders a rejection with this provider's realm.
    pub fn reject(&self, err: &OAuthError) -> OAuthResponse {
        err.into_response(&self.config.realm)
    }

    /// Drops nonces outside the freshness window and expired approval
    /// tickets. Returns how many entries were removed.
    pub async fn purge_stale(&self) -> Result<usize, OAuthError> {
        Ok(self.gate.purge_nonces().await? + self.tickets.purge_expired())
    }

    /// Temporary credentials: consumer-signed, answers with a request token.
    pub async fn request_token(&self, request: &OAuthRequest) -> Result<OAuthResponse, OAuthError> {
        if request.parameters()?.get("oauth_callback").is_none() {
            return Err(OAuthError::MalformedRequest("missing oauth_callback".into()));
        }
        let verdict = self.gate.authenticate(request, &TokenRequirement::None).await?;
        let resource = verdict
            .resource
            .as_ref()
            .ok_or_else(|| OAuthError::MalformedRequest("missing scope".into()))?;
        let callback = verdict.parameters.get("oauth_callback").unwrap_or_default();
        let token = self
            .tokens()
            .create_request_token(&verdict.consumer, resource, callback)
            .await?;
        // 1.0a providers always confirm, out-of-band included.
        Ok(OAuthResponse::form(encode_form(&[
            ("oauth_token_secret", token.secret.as_str()),
            ("oauth_token", token.key.as_str()),
            ("oauth_callback_confirmed", "true"),
        ])))
    }

    /// Approval page for a logged-in user; others go to the login page.
    pub async fn authorize_page(&self, request: &OAuthRequest) -> Result<OAuthResponse, OAuthError> {
        let Some(user) = request.user.as_deref() else {
            return self.login_redirect(request);
        };
        let parameters = request.parameters()?;
        let token_key = parameters
            .get("oauth_token")
            .ok_or_else(|| OAuthError::MalformedRequest("missing oauth_token".into()))?;
        let token = self.pending_request_token(token_key).await?;
        let consumer = self
            .store
            .get_consumer(&token.consumer_key)
            .await?
            .ok_or_else(|| OAuthError::UnknownConsumer(token.consumer_key.clone()))?;
        let ticket = self.tickets.issue(&token.key, user);
        Ok(self.ui.render_authorize(&consumer, &token, &ticket, &self.config.authorize_path))
    }

    /// Applies the user's decision posted from the approval page.
    pub async fn authorize_decision(&self, request: &OAuthRequest) -> Result<OAuthResponse, OAuthError> {
        let Some(user) = request.user.as_deref() else {
            return self.login_redirect(request);
        };
        let parameters = request.parameters()?;
        let ticket_id = parameters.get("ticket").ok_or(OAuthError::ActionNotAllowed)?;
        let ticket = self.tickets.redeem(ticket_id, user)?;
        let token = self.pending_request_token(&ticket.token_key).await?;
        let granted = parameters
            .get("authorize_access")
            .is_some_and(|v| matches!(v, "1" | "true" | "on"));
        let decided = self.tokens().approve(&token, user, granted).await?;
        match callback_location(&decided)? {
            Some(location) => Ok(OAuthResponse::redirect(location)),
            None => Ok(self.ui.render_out_of_band(&decided)),
        }
    }

    /// Token credentials: request-token-signed, answers with an access token.
    pub async fn access_token(&self, request: &OAuthRequest) -> Result<OAuthResponse, OAuthError> {
        let verdict = self.gate.authenticate(request, &TokenRequirement::Request).await?;
        let verifier = verdict.parameters.get("oauth_verifier").unwrap_or_default();
        let access = self.tokens().exchange(&verdict, verifier).await?;
        Ok(OAuthResponse::form(encode_form(&[
            ("oauth_token_secret", access.secret.as_str()),
            ("oauth_token", access.key.as_str()),
        ])))
    }

    async fn pending_request_token(&self, key: &str) -> Result<Token, OAuthError> {
        match self.store.get_token(key).await? {
            Some(token) if token.token_type == TokenType::Request => Ok(token),
            _ => Err(OAuthError::InvalidToken),
        }
    }

    fn login_redirect(&self, request: &OAuthRequest) -> Result<OAuthResponse, OAuthError> {
        let next = encode_path(&request.path_and_query()?);
        Ok(OAuthResponse::redirect(format!("{}?next={}", self.config.login_url, next)))
    }
}

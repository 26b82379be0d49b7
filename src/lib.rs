pub mod oauth_core;

pub use oauth_core::authorization::{ApprovalTicket, ApprovalTickets, AuthorizationUi, PlainAuthorizationUi};
pub use oauth_core::config::{ConsumerPolicy, ProviderConfig};
pub use oauth_core::gate::{AuthenticationGate, TokenRequirement, Verdict};
pub use oauth_core::http::{OAuthRequest, OAuthResponse, RequestParameters};
pub use oauth_core::memory::InMemoryCredentialStore;
pub use oauth_core::middleware::OAuthLayer;
pub use oauth_core::nonce::{InMemoryNonceLedger, NonceCheck, NonceLedger};
pub use oauth_core::oauth_provider::{ConsumerStore, CredentialStore, ResourceStore, TokenStore};
pub use oauth_core::signature::{SignatureEngine, SignatureMethod, SignedRequest};
pub use oauth_core::token_manager::TokenLifecycle;
pub use oauth_core::types::{
    Approval, Consumer, ConsumerStatus, OAuthError, Resource, StoreError, Token, TokenType,
};

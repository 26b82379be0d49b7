//! Credential Store traits.
//!
//! The protocol engine only needs lookup/create/update/delete semantics.
//! Lookups answer `Ok(None)` for absent records; `Err` is reserved for
//! infrastructure failure.

use async_trait::async_trait;

use super::types::{Consumer, Resource, StoreError, Token};

/// Trait for retrieving and maintaining registered consumers.
#[async_trait]
pub trait ConsumerStore: Send + Sync + 'static {
    async fn get_consumer(&self, key: &str) -> Result<Option<Consumer>, StoreError>;

    async fn insert_consumer(&self, consumer: Consumer) -> Result<(), StoreError>;

    /// Replaces an existing consumer (status change, secret rotation).
    /// Returns `false` when no consumer has that key.
    async fn update_consumer(&self, consumer: Consumer) -> Result<bool, StoreError>;
}

/// Trait for resolving protected resources by scope name.
#[async_trait]
pub trait ResourceStore: Send + Sync + 'static {
    async fn get_resource(&self, name: &str) -> Result<Option<Resource>, StoreError>;

    async fn insert_resource(&self, resource: Resource) -> Result<(), StoreError>;
}

/// Trait for token persistence with an atomic compare-and-replace.
#[async_trait]
pub trait TokenStore: Send + Sync + 'static {
    async fn get_token(&self, key: &str) -> Result<Option<Token>, StoreError>;

    async fn insert_token(&self, token: Token) -> Result<(), StoreError>;

    /// Removes a token, returning it if it existed.
    async fn delete_token(&self, key: &str) -> Result<Option<Token>, StoreError>;

    /// Atomically replaces `current` with `next`, but only if the stored
    /// record under `current.key` still equals `current`.
    ///
    /// When the keys differ, `current` is deleted and `next` inserted as one
    /// step, so two racing callers cannot both succeed. Returns `false` when
    /// the stored record changed or vanished in the meantime.
    async fn replace_token(&self, current: &Token, next: Token) -> Result<bool, StoreError>;
}

/// Everything the provider needs from persistence.
pub trait CredentialStore: ConsumerStore + ResourceStore + TokenStore {}

impl<T: ConsumerStore + ResourceStore + TokenStore> CredentialStore for T {}

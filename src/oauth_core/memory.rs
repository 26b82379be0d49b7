//! In-memory default implementations for the credential store traits.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use super::oauth_provider::{ConsumerStore, ResourceStore, TokenStore};
use super::types::{Consumer, Resource, StoreError, Token, TokenType};

/// Process-local credential store backed by concurrent maps.
#[derive(Clone, Default)]
pub struct InMemoryCredentialStore {
    consumers: Arc<DashMap<String, Consumer>>,
    resources: Arc<DashMap<String, Resource>>,
    tokens: Arc<DashMap<String, Token>>,
}

impl InMemoryCredentialStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store with an initial set of consumers and resources.
    pub fn with_records(consumers: Vec<Consumer>, resources: Vec<Resource>) -> Self {
        let store = Self::new();
        for consumer in consumers {
            store.consumers.insert(consumer.key.clone(), consumer);
        }
        for resource in resources {
            store.resources.insert(resource.name.clone(), resource);
        }
        store
    }

    /// Snapshot of all tokens of one type, oldest first.
    pub fn tokens_of_type(&self, token_type: TokenType) -> Vec<Token> {
        let mut tokens: Vec<Token> = self
            .tokens
            .iter()
            .filter(|entry| entry.value().token_type == token_type)
            .map(|entry| entry.value().clone())
            .collect();
        tokens.sort_by_key(|t| t.created_at);
        tokens
    }

    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }
}

#[async_trait]
impl ConsumerStore for InMemoryCredentialStore {
    async fn get_consumer(&self, key: &str) -> Result<Option<Consumer>, StoreError> {
        Ok(self.consumers.get(key).map(|entry| entry.value().clone()))
    }

    async fn insert_consumer(&self, consumer: Consumer) -> Result<(), StoreError> {
        self.consumers.insert(consumer.key.clone(), consumer);
        Ok(())
    }

    async fn update_consumer(&self, consumer: Consumer) -> Result<bool, StoreError> {
        match self.consumers.get_mut(&consumer.key) {
            Some(mut entry) => {
                *entry = consumer;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl ResourceStore for InMemoryCredentialStore {
    async fn get_resource(&self, name: &str) -> Result<Option<Resource>, StoreError> {
        Ok(self.resources.get(name).map(|entry| entry.value().clone()))
    }

    async fn insert_resource(&self, resource: Resource) -> Result<(), StoreError> {
        self.resources.insert(resource.name.clone(), resource);
        Ok(())
    }
}

#[async_trait]
impl TokenStore for InMemoryCredentialStore {
    async fn get_token(&self, key: &str) -> Result<Option<Token>, StoreError> {
        Ok(self.tokens.get(key).map(|entry| entry.value().clone()))
    }

    async fn insert_token(&self, token: Token) -> Result<(), StoreError> {
        self.tokens.insert(token.key.clone(), token);
        Ok(())
    }

    async fn delete_token(&self, key: &str) -> Result<Option<Token>, StoreError> {
        Ok(self.tokens.remove(key).map(|(_, token)| token))
    }

    async fn replace_token(&self, current: &Token, next: Token) -> Result<bool, StoreError> {
        if current.key == next.key {
            // The shard lock is held for the whole compare-and-assign.
            let Some(mut entry) = self.tokens.get_mut(&current.key) else {
                return Ok(false);
            };
            if *entry != *current {
                return Ok(false);
            }
            *entry = next;
            return Ok(true);
        }
        if self
            .tokens
            .remove_if(&current.key, |_, stored| stored == current)
            .is_none()
        {
            return Ok(false);
        }
        self.tokens.insert(next.key.clone(), next);
        Ok(true)
    }
}

//! Nonce Ledger: replay protection keyed on consumer, token and nonce.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use super::types::StoreError;

/// Outcome of a ledger test-and-set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NonceCheck {
    /// First time this combination was seen; it is now recorded.
    Fresh,
    /// Already recorded; the request is a replay.
    Duplicate,
}

/// Records every accepted `(consumer_key, token_key, nonce)`.
///
/// `check_and_record` must be a single atomic step: of two concurrent calls
/// with the same triple exactly one sees [`NonceCheck::Fresh`].
#[async_trait]
pub trait NonceLedger: Send + Sync + 'static {
    /// `token_key` is empty for requests made without a token.
    async fn check_and_record(
        &self,
        consumer_key: &str,
        token_key: &str,
        nonce: &str,
        timestamp: i64,
    ) -> Result<NonceCheck, StoreError>;

    /// Drops entries whose timestamp is strictly older than `cutoff`.
    /// Returns how many were removed.
    async fn purge_older_than(&self, cutoff: i64) -> Result<usize, StoreError>;
}

type NonceKey = (String, String, String);

/// Process-local ledger; entries are kept until purged.
#[derive(Clone, Default)]
pub struct InMemoryNonceLedger {
    entries: Arc<DashMap<NonceKey, i64>>,
}

impl InMemoryNonceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl NonceLedger for InMemoryNonceLedger {
    async fn check_and_record(
        &self,
        consumer_key: &str,
        token_key: &str,
        nonce: &str,
        timestamp: i64,
    ) -> Result<NonceCheck, StoreError> {
        let key = (consumer_key.to_string(), token_key.to_string(), nonce.to_string());
        match self.entries.entry(key) {
            Entry::Occupied(_) => Ok(NonceCheck::Duplicate),
            Entry::Vacant(slot) => {
                slot.insert(timestamp);
                Ok(NonceCheck::Fresh)
            }
        }
    }

    async fn purge_older_than(&self, cutoff: i64) -> Result<usize, StoreError> {
        let before = self.entries.len();
        self.entries.retain(|_, ts| *ts >= cutoff);
        Ok(before.saturating_sub(self.entries.len()))
    }
}

//! Port for the optional historical pattern lookup.
//!
//! Used by the priority engine and the conflict engine to bias
//! medium-risk decisions. Absence degrades gracefully: the bundled
//! `NullPatternStore` returns no matches and never errors.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A scored match returned by a similarity query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternMatch {
    /// Similarity in [0, 1]
    pub similarity: f64,
    /// Arbitrary metadata stored with the pattern
    pub metadata: serde_json::Value,
}

/// Read/write interface over a historical pattern store.
///
/// Any scored nearest-neighbor search satisfies this contract; no
/// specific similarity algorithm is assumed.
#[async_trait]
pub trait PatternStore: Send + Sync {
    /// Query the most similar stored patterns within a namespace.
    async fn query_similar(
        &self,
        query: &str,
        namespace: &str,
        limit: usize,
    ) -> Result<Vec<PatternMatch>>;

    /// Store a pattern for future lookups.
    async fn store(
        &self,
        content: &str,
        namespace: &str,
        metadata: serde_json::Value,
    ) -> Result<()>;
}

/// Default no-op store used when no historical lookup is wired in.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullPatternStore;

#[async_trait]
impl PatternStore for NullPatternStore {
    async fn query_similar(
        &self,
        _query: &str,
        _namespace: &str,
        _limit: usize,
    ) -> Result<Vec<PatternMatch>> {
        Ok(Vec::new())
    }

    async fn store(
        &self,
        _content: &str,
        _namespace: &str,
        _metadata: serde_json::Value,
    ) -> Result<()> {
        Ok(())
    }
}

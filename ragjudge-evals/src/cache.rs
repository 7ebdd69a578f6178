// Copyright 2025 AgentReplay (https://github.com/agentreplay)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Prompt → completion cache owned by a single gateway

use moka::future::Cache;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Completions keyed by the exact prompt text.
///
/// Only successful completions are ever inserted. There is no TTL: a cache
/// lives as long as the gateway scope that owns it.
pub struct PromptCache {
    cache: Cache<String, String>,
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
}

impl PromptCache {
    pub fn new(max_capacity: u64) -> Self {
        Self {
            cache: Cache::builder().max_capacity(max_capacity).build(),
            hits: Arc::new(AtomicU64::new(0)),
            misses: Arc::new(AtomicU64::new(0)),
        }
    }

    pub async fn get(&self, prompt: &str) -> Option<String> {
        match self.cache.get(prompt).await {
            Some(completion) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(completion)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub async fn insert(&self, prompt: String, completion: String) {
        self.cache.insert(prompt, completion).await;
    }

    /// Drop the completion for `prompt` so the next lookup misses
    pub async fn invalidate(&self, prompt: &str) {
        self.cache.invalidate(prompt).await;
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;

        CacheStats {
            hits,
            misses,
            hit_rate: if total > 0 {
                hits as f64 / total as f64
            } else {
                0.0
            },
            entry_count: self.cache.entry_count(),
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub entry_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_exact_prompt_key() {
        let cache = PromptCache::new(100);
        cache
            .insert("Is the sky blue?".to_string(), "true".to_string())
            .await;

        assert_eq!(cache.get("Is the sky blue?").await.as_deref(), Some("true"));
        assert!(cache.get("is the sky blue?").await.is_none());
    }

    #[tokio::test]
    async fn test_invalidate_single_prompt() {
        let cache = PromptCache::new(100);
        cache.insert("a".to_string(), "1".to_string()).await;
        cache.insert("b".to_string(), "2".to_string()).await;

        cache.invalidate("a").await;

        assert!(cache.get("a").await.is_none());
        assert_eq!(cache.get("b").await.as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn test_cache_stats() {
        let cache = PromptCache::new(100);

        // Miss
        cache.get("prompt").await;

        // Hit
        cache.insert("prompt".to_string(), "answer".to_string()).await;
        cache.get("prompt").await;

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hit_rate, 0.5);
    }
}

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::Tuning;
use crate::metrics::{record_cache_hit, record_cache_miss, record_cache_operation};
use crate::models::{LeaderboardEntry, LeaderboardKind, Question, UserState};
use crate::store::Cache;

const USER_STATE_PREFIX: &str = "user_state:";
const QUESTION_POOL_PREFIX: &str = "questions:difficulty:";
const LEADERBOARD_PREFIX: &str = "leaderboard:";

/// Cache-aside accelerator over the authoritative stores.
///
/// Every failure of the backend — unavailable, timed out, corrupt payload —
/// is absorbed here and reported as a miss, so callers only ever see slower
/// reads, never cache errors. Writes never go through the cache for user
/// state; mutations invalidate and the next read repopulates.
pub struct CacheLayer {
    backend: Arc<dyn Cache>,
    user_state_ttl: u64,
    question_pool_ttl: u64,
    leaderboard_ttl: u64,
}

impl CacheLayer {
    pub fn new(backend: Arc<dyn Cache>, tuning: &Tuning) -> Self {
        Self {
            backend,
            user_state_ttl: tuning.user_state_ttl,
            question_pool_ttl: tuning.question_pool_ttl,
            leaderboard_ttl: tuning.leaderboard_ttl,
        }
    }

    pub async fn user_state(&self, user_id: &str) -> Option<UserState> {
        self.get(&format!("{}{}", USER_STATE_PREFIX, user_id)).await
    }

    pub async fn put_user_state(&self, state: &UserState) {
        self.put(
            &format!("{}{}", USER_STATE_PREFIX, state.user_id),
            state,
            self.user_state_ttl,
        )
        .await;
    }

    pub async fn invalidate_user_state(&self, user_id: &str) {
        self.invalidate(&format!("{}{}", USER_STATE_PREFIX, user_id))
            .await;
    }

    pub async fn question_pool(&self, difficulty: u32) -> Option<Vec<Question>> {
        self.get(&format!("{}{}", QUESTION_POOL_PREFIX, difficulty))
            .await
    }

    pub async fn put_question_pool(&self, difficulty: u32, questions: &[Question]) {
        self.put(
            &format!("{}{}", QUESTION_POOL_PREFIX, difficulty),
            &questions,
            self.question_pool_ttl,
        )
        .await;
    }

    pub async fn leaderboard(&self, kind: LeaderboardKind) -> Option<Vec<LeaderboardEntry>> {
        self.get(&format!("{}{}", LEADERBOARD_PREFIX, kind.as_str()))
            .await
    }

    pub async fn put_leaderboard(&self, kind: LeaderboardKind, entries: &[LeaderboardEntry]) {
        self.put(
            &format!("{}{}", LEADERBOARD_PREFIX, kind.as_str()),
            &entries,
            self.leaderboard_ttl,
        )
        .await;
    }

    /// Any score or streak change makes both ranked views stale.
    pub async fn invalidate_leaderboards(&self) {
        self.invalidate(&format!("{}score", LEADERBOARD_PREFIX)).await;
        self.invalidate(&format!("{}streak", LEADERBOARD_PREFIX))
            .await;
    }

    async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.backend.get(key).await {
            Ok(raw) => {
                record_cache_operation("get", true);
                raw
            }
            Err(e) => {
                record_cache_operation("get", false);
                tracing::warn!("Cache read failed for {}: {:#}", key, e);
                None
            }
        };

        let raw = match raw {
            Some(raw) => raw,
            None => {
                record_cache_miss();
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => {
                record_cache_hit();
                Some(value)
            }
            Err(e) => {
                // Corrupt payload counts as a miss; the source of truth wins.
                record_cache_miss();
                tracing::warn!("Discarding corrupt cache entry {}: {}", key, e);
                None
            }
        }
    }

    async fn put<T: Serialize>(&self, key: &str, value: &T, ttl_seconds: u64) {
        let json = match serde_json::to_string(value) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!("Failed to serialize cache entry {}: {}", key, e);
                return;
            }
        };
        match self.backend.set_ex(key, &json, ttl_seconds).await {
            Ok(()) => record_cache_operation("set", true),
            Err(e) => {
                record_cache_operation("set", false);
                tracing::warn!("Cache write failed for {}: {:#}", key, e);
            }
        }
    }

    async fn invalidate(&self, key: &str) {
        match self.backend.del(key).await {
            Ok(()) => record_cache_operation("del", true),
            Err(e) => {
                record_cache_operation("del", false);
                tracing::warn!("Cache invalidation failed for {}: {:#}", key, e);
            }
        }
    }
}

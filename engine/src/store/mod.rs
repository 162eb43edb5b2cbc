use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::answer::AnswerRecord;
use crate::models::{LeaderboardEntry, LeaderboardKind, Question, UserState};

pub mod memory;
pub mod mongo;
pub mod redis_cache;

/// Durable store for [`UserState`] with per-document compare-and-swap.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn load(&self, user_id: &str) -> Result<Option<UserState>>;

    /// Inserts the given zero-state unless a state already exists for the
    /// user; returns whichever document ends up stored (first writer wins).
    async fn create(&self, state: &UserState) -> Result<UserState>;

    /// Writes `state` only if the stored version still equals
    /// `expected_version`. Returns false when the fence did not match; the
    /// store is left untouched in that case.
    async fn cas_update(&self, state: &UserState, expected_version: u64) -> Result<bool>;

    /// Zeroes streak and momentum after inactivity decay. Historical totals
    /// and the state version are left alone.
    async fn reset_progression(&self, user_id: &str) -> Result<()>;
}

/// Result of appending to the answer ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerInsert {
    Inserted,
    /// Another writer already holds this idempotency token.
    DuplicateToken,
}

/// Append-only log of answer facts, unique-constrained on the idempotency
/// token so two racing requests with the same token cannot both win.
#[async_trait]
pub trait AnswerLedger: Send + Sync {
    async fn insert(&self, record: &AnswerRecord) -> Result<LedgerInsert>;

    async fn find_by_token(&self, token: &str) -> Result<Option<AnswerRecord>>;

    /// Count of answered questions per difficulty for one user.
    async fn difficulty_histogram(&self, user_id: &str) -> Result<BTreeMap<u32, u64>>;
}

/// Read-only question bank owned by the out-of-scope content layer.
#[async_trait]
pub trait QuestionBank: Send + Sync {
    async fn by_id(&self, question_id: &str) -> Result<Option<Question>>;

    async fn by_difficulty(&self, difficulty: u32) -> Result<Vec<Question>>;
}

/// Identity lookup owned by the out-of-scope user CRUD layer.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn display_name(&self, user_id: &str) -> Result<Option<String>>;
}

/// Ranked-set storage behind the leaderboard service.
#[async_trait]
pub trait LeaderboardStore: Send + Sync {
    async fn upsert(&self, kind: LeaderboardKind, entry: &LeaderboardEntry) -> Result<()>;

    /// Top `n` entries, descending by value; ties break ascending by user id
    /// so the ordering is deterministic across backends.
    async fn top_n(&self, kind: LeaderboardKind, n: usize) -> Result<Vec<LeaderboardEntry>>;

    async fn entry(&self, kind: LeaderboardKind, user_id: &str)
        -> Result<Option<LeaderboardEntry>>;

    /// Number of entries with a strictly greater value; rank = count + 1.
    async fn count_greater(&self, kind: LeaderboardKind, value: i64) -> Result<u64>;
}

/// Volatile best-effort key/value cache with TTL. Implementations may fail at
/// any time; the cache layer above absorbs every error.
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set_ex(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<()>;

    async fn del(&self, key: &str) -> Result<()>;
}

/// Cache backend that stores nothing. Selected at construction when no Redis
/// is configured; every call site treats it exactly like the real backend.
#[derive(Debug, Default, Clone)]
pub struct NoopCache;

#[async_trait]
impl Cache for NoopCache {
    async fn get(&self, _key: &str) -> Result<Option<String>> {
        Ok(None)
    }

    async fn set_ex(&self, _key: &str, _value: &str, _ttl_seconds: u64) -> Result<()> {
        Ok(())
    }

    async fn del(&self, _key: &str) -> Result<()> {
        Ok(())
    }
}

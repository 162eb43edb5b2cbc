//! In-memory backends. Used by the test suites and by embedders that want the
//! engine without external infrastructure; semantics mirror the MongoDB/Redis
//! implementations, including the CAS fence and the unique token constraint.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;

use super::{AnswerLedger, Cache, LedgerInsert, LeaderboardStore, QuestionBank, StateStore,
    UserDirectory};
use crate::models::answer::AnswerRecord;
use crate::models::{LeaderboardEntry, LeaderboardKind, Question, UserState};

#[derive(Default)]
pub struct MemoryStateStore {
    states: Mutex<HashMap<String, UserState>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self, user_id: &str) -> Result<Option<UserState>> {
        Ok(self.states.lock().unwrap().get(user_id).cloned())
    }

    async fn create(&self, state: &UserState) -> Result<UserState> {
        let mut states = self.states.lock().unwrap();
        Ok(states
            .entry(state.user_id.clone())
            .or_insert_with(|| state.clone())
            .clone())
    }

    async fn cas_update(&self, state: &UserState, expected_version: u64) -> Result<bool> {
        let mut states = self.states.lock().unwrap();
        match states.get_mut(&state.user_id) {
            Some(stored) if stored.state_version == expected_version => {
                *stored = state.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn reset_progression(&self, user_id: &str) -> Result<()> {
        if let Some(stored) = self.states.lock().unwrap().get_mut(user_id) {
            stored.streak = 0;
            stored.momentum = 0.0;
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryAnswerLedger {
    by_token: Mutex<HashMap<String, AnswerRecord>>,
}

impl MemoryAnswerLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AnswerLedger for MemoryAnswerLedger {
    async fn insert(&self, record: &AnswerRecord) -> Result<LedgerInsert> {
        let mut by_token = self.by_token.lock().unwrap();
        if by_token.contains_key(&record.idempotency_key) {
            return Ok(LedgerInsert::DuplicateToken);
        }
        by_token.insert(record.idempotency_key.clone(), record.clone());
        Ok(LedgerInsert::Inserted)
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<AnswerRecord>> {
        Ok(self.by_token.lock().unwrap().get(token).cloned())
    }

    async fn difficulty_histogram(&self, user_id: &str) -> Result<BTreeMap<u32, u64>> {
        let by_token = self.by_token.lock().unwrap();
        let mut histogram = BTreeMap::new();
        for record in by_token.values().filter(|r| r.user_id == user_id) {
            *histogram.entry(record.difficulty).or_insert(0) += 1;
        }
        Ok(histogram)
    }
}

#[derive(Default)]
pub struct MemoryQuestionBank {
    questions: Mutex<Vec<Question>>,
}

impl MemoryQuestionBank {
    pub fn new(questions: Vec<Question>) -> Self {
        Self {
            questions: Mutex::new(questions),
        }
    }

    pub fn add(&self, question: Question) {
        self.questions.lock().unwrap().push(question);
    }
}

#[async_trait]
impl QuestionBank for MemoryQuestionBank {
    async fn by_id(&self, question_id: &str) -> Result<Option<Question>> {
        Ok(self
            .questions
            .lock()
            .unwrap()
            .iter()
            .find(|q| q.id == question_id)
            .cloned())
    }

    async fn by_difficulty(&self, difficulty: u32) -> Result<Vec<Question>> {
        Ok(self
            .questions
            .lock()
            .unwrap()
            .iter()
            .filter(|q| q.difficulty == difficulty)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct MemoryUserDirectory {
    names: Mutex<HashMap<String, String>>,
}

impl MemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, user_id: impl Into<String>, username: impl Into<String>) {
        self.names
            .lock()
            .unwrap()
            .insert(user_id.into(), username.into());
    }
}

#[async_trait]
impl UserDirectory for MemoryUserDirectory {
    async fn display_name(&self, user_id: &str) -> Result<Option<String>> {
        Ok(self.names.lock().unwrap().get(user_id).cloned())
    }
}

#[derive(Default)]
pub struct MemoryLeaderboardStore {
    boards: Mutex<HashMap<LeaderboardKind, HashMap<String, LeaderboardEntry>>>,
}

impl MemoryLeaderboardStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LeaderboardStore for MemoryLeaderboardStore {
    async fn upsert(&self, kind: LeaderboardKind, entry: &LeaderboardEntry) -> Result<()> {
        self.boards
            .lock()
            .unwrap()
            .entry(kind)
            .or_default()
            .insert(entry.user_id.clone(), entry.clone());
        Ok(())
    }

    async fn top_n(&self, kind: LeaderboardKind, n: usize) -> Result<Vec<LeaderboardEntry>> {
        let boards = self.boards.lock().unwrap();
        let mut entries: Vec<LeaderboardEntry> = boards
            .get(&kind)
            .map(|b| b.values().cloned().collect())
            .unwrap_or_default();
        // Same ordering contract as the Mongo store.
        entries.sort_by(|a, b| b.value.cmp(&a.value).then(a.user_id.cmp(&b.user_id)));
        entries.truncate(n);
        Ok(entries)
    }

    async fn entry(
        &self,
        kind: LeaderboardKind,
        user_id: &str,
    ) -> Result<Option<LeaderboardEntry>> {
        Ok(self
            .boards
            .lock()
            .unwrap()
            .get(&kind)
            .and_then(|b| b.get(user_id))
            .cloned())
    }

    async fn count_greater(&self, kind: LeaderboardKind, value: i64) -> Result<u64> {
        Ok(self
            .boards
            .lock()
            .unwrap()
            .get(&kind)
            .map(|b| b.values().filter(|e| e.value > value).count() as u64)
            .unwrap_or(0))
    }
}

/// TTL-honoring in-process cache.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some((value, expires_at)) if *expires_at > Instant::now() => Ok(Some(value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<()> {
        let expires_at = Instant::now() + Duration::from_secs(ttl_seconds);
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), (value.to_string(), expires_at));
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<()> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }
}

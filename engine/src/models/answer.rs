use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Immutable fact appended once per accepted submission. The unique constraint
/// on `idempotency_key` is what makes client retries safe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    pub question_id: String,
    /// Difficulty the question was answered at, before any adjustment.
    pub difficulty: u32,
    pub answer: String,
    pub correct: bool,
    pub score_delta: i64,
    pub streak_at_answer: u32,
    pub answered_at: DateTime<Utc>,
    pub idempotency_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerOutcome {
    pub correct: bool,
    pub correct_answer: String,
    pub new_difficulty: u32,
    pub new_streak: u32,
    pub max_streak: u32,
    pub score_delta: i64,
    pub total_score: i64,
    pub state_version: u64,
    pub rank_score: Option<u64>,
    pub rank_streak: Option<u64>,
    pub streak_multiplier: f64,
    pub difficulty_weight: f64,
    pub momentum: f64,
    /// True when this outcome was served from the idempotency ledger instead
    /// of a fresh state mutation.
    pub replayed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NextQuestion {
    pub question_id: String,
    pub difficulty: u32,
    pub prompt: String,
    pub choices: Vec<String>,
    pub state_version: u64,
    pub current_score: i64,
    pub current_streak: u32,
    pub max_streak: u32,
    pub current_difficulty: u32,
    pub momentum: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserMetrics {
    pub current_difficulty: u32,
    pub streak: u32,
    pub max_streak: u32,
    pub total_score: i64,
    pub accuracy: f64,
    pub total_answered: u64,
    pub total_correct: u64,
    /// Accuracy over the rolling window of recent answers.
    pub recent_performance: f64,
    pub momentum: f64,
    pub difficulty_histogram: BTreeMap<u32, u64>,
}

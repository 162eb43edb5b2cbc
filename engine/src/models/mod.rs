use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod answer;

/// Per-player adaptive state. This is the document guarded by the
/// optimistic-concurrency fence: `state_version` increments by exactly one on
/// every accepted mutation and every write compares against the version the
/// writer read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserState {
    #[serde(rename = "_id")]
    pub user_id: String,
    pub current_difficulty: u32,
    pub streak: u32,
    pub max_streak: u32,
    pub total_score: i64,
    pub total_answered: u64,
    pub total_correct: u64,
    #[serde(default)]
    pub last_question_id: Option<String>,
    #[serde(default)]
    pub last_answer_at: Option<DateTime<Utc>>,
    pub state_version: u64,
    pub momentum: f64,
    #[serde(default)]
    pub recent_answers: Vec<bool>,
}

impl UserState {
    /// Fresh zero-state created on first access.
    pub fn new(user_id: impl Into<String>, min_difficulty: u32) -> Self {
        Self {
            user_id: user_id.into(),
            current_difficulty: min_difficulty,
            streak: 0,
            max_streak: 0,
            total_score: 0,
            total_answered: 0,
            total_correct: 0,
            last_question_id: None,
            last_answer_at: None,
            state_version: 0,
            momentum: 0.0,
            recent_answers: Vec::new(),
        }
    }

    /// Lifetime accuracy, 0.0 before the first answer.
    pub fn accuracy(&self) -> f64 {
        if self.total_answered == 0 {
            return 0.0;
        }
        self.total_correct as f64 / self.total_answered as f64
    }
}

/// Question document as stored by the (out-of-scope) content layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    #[serde(rename = "_id")]
    pub id: String,
    pub difficulty: u32,
    pub prompt: String,
    pub choices: Vec<String>,
    pub correct_answer: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// The two independently ranked leaderboard views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaderboardKind {
    Score,
    Streak,
}

impl LeaderboardKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Score => "score",
            Self::Streak => "streak",
        }
    }
}

/// Upserted per (kind, user); at most one entry per pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    #[serde(rename = "_id")]
    pub user_id: String,
    pub username: String,
    pub value: i64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedEntry {
    pub rank: u64,
    pub user_id: String,
    pub username: String,
    pub value: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardView {
    pub leaderboard: Vec<RankedEntry>,
    /// The viewer's own ranked entry, resolved via the count-based fallback
    /// when they are outside the top-N.
    pub viewer: Option<RankedEntry>,
}

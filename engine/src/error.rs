use thiserror::Error;

/// Failure taxonomy surfaced by the engine.
///
/// Cache failures never appear here: the cache layer absorbs them and falls
/// back to the authoritative store. An idempotent replay is not a failure
/// either; it returns the recorded outcome with `replayed` set.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    /// Optimistic-concurrency fence mismatch. Terminal for this attempt;
    /// the caller re-fetches state and retries with a fresh version.
    #[error("state version conflict: expected {expected}, found {actual}")]
    Conflict { expected: u64, actual: u64 },

    #[error("no questions available near difficulty {difficulty}")]
    NoQuestionsAvailable { difficulty: u32 },

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl EngineError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Conflicts are the only retryable failure.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use rand::Rng;
use uuid::Uuid;

use super::cache_service::CacheLayer;
use super::leaderboard_service::LeaderboardService;
use super::{adaptive, scoring};
use crate::config::Tuning;
use crate::error::{EngineError, EngineResult};
use crate::metrics::{
    ANSWERS_SUBMITTED_TOTAL, DIFFICULTY_CHANGES_TOTAL, IDEMPOTENT_REPLAYS_TOTAL,
    STATE_CAS_CONFLICTS_TOTAL,
};
use crate::models::answer::{AnswerOutcome, AnswerRecord, NextQuestion, UserMetrics};
use crate::models::{LeaderboardKind, Question, UserState};
use crate::store::{AnswerLedger, LedgerInsert, QuestionBank, StateStore, UserDirectory};
use crate::utils::retry::{retry_async_with_config, RetryConfig};

/// How far from the player's difficulty the question picker will wander when
/// the exact pool is empty.
const POOL_FALLBACK_RANGE: u32 = 3;

/// The only component allowed to mutate [`UserState`]. Concurrent submissions
/// for one user are serialized by the compare-and-swap fence on
/// `state_version`; client retries are made safe by the unique idempotency
/// token in the answer ledger. No lock is held across a request.
pub struct QuizService {
    states: Arc<dyn StateStore>,
    ledger: Arc<dyn AnswerLedger>,
    questions: Arc<dyn QuestionBank>,
    users: Arc<dyn UserDirectory>,
    cache: Arc<CacheLayer>,
    leaderboards: Arc<LeaderboardService>,
    tuning: Tuning,
}

impl QuizService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        states: Arc<dyn StateStore>,
        ledger: Arc<dyn AnswerLedger>,
        questions: Arc<dyn QuestionBank>,
        users: Arc<dyn UserDirectory>,
        cache: Arc<CacheLayer>,
        leaderboards: Arc<LeaderboardService>,
        tuning: Tuning,
    ) -> Self {
        Self {
            states,
            ledger,
            questions,
            users,
            cache,
            leaderboards,
            tuning,
        }
    }

    /// Cached read of a user's state, creating the zero-state on first access.
    pub async fn read(&self, user_id: &str) -> EngineResult<UserState> {
        if let Some(state) = self.cache.user_state(user_id).await {
            return Ok(state);
        }
        let state = self.load_or_create(user_id).await?;
        self.cache.put_user_state(&state).await;
        Ok(state)
    }

    async fn load_or_create(&self, user_id: &str) -> EngineResult<UserState> {
        let retry_cfg = RetryConfig::default();
        let existing =
            retry_async_with_config(retry_cfg, || async { self.states.load(user_id).await })
                .await?;
        match existing {
            Some(state) => Ok(state),
            None => {
                let fresh = UserState::new(user_id, self.tuning.min_difficulty);
                Ok(self.states.create(&fresh).await?)
            }
        }
    }

    /// Serves the next question at the player's difficulty, falling back to
    /// neighboring difficulties when the exact pool is empty and avoiding an
    /// immediate repeat of the last question.
    pub async fn next_question(&self, user_id: &str) -> EngineResult<NextQuestion> {
        let mut state = self.read(user_id).await?;

        if adaptive::should_decay_streak(state.last_answer_at, Utc::now(), &self.tuning) {
            tracing::info!("Inactivity decay for user {}", user_id);
            self.states.reset_progression(user_id).await?;
            state.streak = 0;
            state.momentum = 0.0;
            self.cache.invalidate_user_state(user_id).await;
        }

        let pool = self.pool_with_fallback(state.current_difficulty).await?;

        let last = state.last_question_id.as_deref();
        let candidates: Vec<&Question> =
            pool.iter().filter(|q| Some(q.id.as_str()) != last).collect();
        let candidates = if candidates.is_empty() {
            pool.iter().collect()
        } else {
            candidates
        };

        let question = candidates[rand::rng().random_range(0..candidates.len())];

        Ok(NextQuestion {
            question_id: question.id.clone(),
            difficulty: question.difficulty,
            prompt: question.prompt.clone(),
            choices: question.choices.clone(),
            state_version: state.state_version,
            current_score: state.total_score,
            current_streak: state.streak,
            max_streak: state.max_streak,
            current_difficulty: state.current_difficulty,
            momentum: state.momentum,
        })
    }

    async fn pool_with_fallback(&self, difficulty: u32) -> EngineResult<Vec<Question>> {
        let pool = self.pool(difficulty).await?;
        if !pool.is_empty() {
            return Ok(pool);
        }

        for offset in 1..=POOL_FALLBACK_RANGE {
            let above = difficulty + offset;
            if above <= self.tuning.max_difficulty {
                let pool = self.pool(above).await?;
                if !pool.is_empty() {
                    return Ok(pool);
                }
            }
            if let Some(below) = difficulty.checked_sub(offset) {
                if below >= self.tuning.min_difficulty {
                    let pool = self.pool(below).await?;
                    if !pool.is_empty() {
                        return Ok(pool);
                    }
                }
            }
        }

        Err(EngineError::NoQuestionsAvailable { difficulty })
    }

    /// Question pool by difficulty, cache-aside. Empty pools are not cached
    /// so newly seeded questions show up immediately.
    async fn pool(&self, difficulty: u32) -> EngineResult<Vec<Question>> {
        if let Some(pool) = self.cache.question_pool(difficulty).await {
            return Ok(pool);
        }
        let pool = self.questions.by_difficulty(difficulty).await?;
        if !pool.is_empty() {
            self.cache.put_question_pool(difficulty, &pool).await;
        }
        Ok(pool)
    }

    /// The answer-submission protocol. Exactly one of three things happens:
    /// the stored outcome is replayed (duplicate token), the mutation commits
    /// with `state_version + 1`, or the request fails without any mutation.
    pub async fn submit_answer(
        &self,
        user_id: &str,
        question_id: &str,
        answer: &str,
        expected_version: u64,
        idempotency_token: &str,
    ) -> EngineResult<AnswerOutcome> {
        let retry_cfg = RetryConfig::default();

        // Idempotency check: a replayed token returns the recorded outcome
        // without touching state.
        let existing = retry_async_with_config(retry_cfg.clone(), || async {
            self.ledger.find_by_token(idempotency_token).await
        })
        .await?;
        if let Some(record) = existing {
            IDEMPOTENT_REPLAYS_TOTAL.with_label_values(&["lookup"]).inc();
            tracing::info!(
                "Replaying recorded outcome for idempotency token {}",
                idempotency_token
            );
            return self.replay_outcome(record).await;
        }

        // Authoritative loads; the cache is deliberately bypassed on the
        // write path.
        let mut state = retry_async_with_config(retry_cfg.clone(), || async {
            self.states.load(user_id).await
        })
        .await?
        .ok_or_else(|| EngineError::not_found("user state", user_id))?;

        let question = retry_async_with_config(retry_cfg, || async {
            self.questions.by_id(question_id).await
        })
        .await?
        .ok_or_else(|| EngineError::not_found("question", question_id))?;

        // Client-side fence: the caller claims the version it last saw. A
        // mismatch means another submission already landed.
        if state.state_version != expected_version {
            STATE_CAS_CONFLICTS_TOTAL
                .with_label_values(&["precheck"])
                .inc();
            return Err(EngineError::Conflict {
                expected: expected_version,
                actual: state.state_version,
            });
        }

        // Inactivity decay applies before grading: an idle player resumes at
        // zero streak and momentum but keeps all historical totals.
        if adaptive::should_decay_streak(state.last_answer_at, Utc::now(), &self.tuning) {
            state.streak = 0;
            state.momentum = 0.0;
        }

        let is_correct =
            answer.trim().to_lowercase() == question.correct_answer.trim().to_lowercase();

        let breakdown = scoring::score(is_correct, state.current_difficulty, state.streak, &self.tuning);
        let new_streak = if is_correct { state.streak + 1 } else { 0 };
        let adjusted = adaptive::next_difficulty(
            state.current_difficulty,
            is_correct,
            state.momentum,
            new_streak,
            &self.tuning,
        );
        let recent_answers = adaptive::push_outcome(&state.recent_answers, is_correct, &self.tuning);

        let answered_difficulty = state.current_difficulty;
        let answered_at = Utc::now();
        let updated = UserState {
            user_id: state.user_id.clone(),
            current_difficulty: adjusted.new_difficulty,
            streak: new_streak,
            max_streak: state.max_streak.max(new_streak),
            total_score: state.total_score + breakdown.delta,
            total_answered: state.total_answered + 1,
            total_correct: state.total_correct + is_correct as u64,
            last_question_id: Some(question.id.clone()),
            last_answer_at: Some(answered_at),
            state_version: state.state_version + 1,
            momentum: adjusted.new_momentum,
            recent_answers,
        };

        // Compare-and-swap commit. On failure the caller re-fetches and
        // retries; we never auto-retry a fence.
        let committed = self.states.cas_update(&updated, state.state_version).await?;
        if !committed {
            STATE_CAS_CONFLICTS_TOTAL.with_label_values(&["commit"]).inc();
            let actual = self
                .states
                .load(user_id)
                .await?
                .map(|s| s.state_version)
                .unwrap_or(0);
            tracing::warn!(
                "CAS rejected for user {}: wrote against version {}, store at {}",
                user_id,
                state.state_version,
                actual
            );
            return Err(EngineError::Conflict {
                expected: state.state_version,
                actual,
            });
        }

        let correct_label = if is_correct { "true" } else { "false" };
        ANSWERS_SUBMITTED_TOTAL
            .with_label_values(&[correct_label])
            .inc();
        if adjusted.new_difficulty > answered_difficulty {
            DIFFICULTY_CHANGES_TOTAL.with_label_values(&["up"]).inc();
        } else if adjusted.new_difficulty < answered_difficulty {
            DIFFICULTY_CHANGES_TOTAL.with_label_values(&["down"]).inc();
        }

        // Append the immutable answer fact. The unique token constraint is
        // the second half of the at-most-once guarantee.
        let record = AnswerRecord {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            question_id: question.id.clone(),
            difficulty: answered_difficulty,
            answer: answer.to_string(),
            correct: is_correct,
            score_delta: breakdown.delta,
            streak_at_answer: new_streak,
            answered_at,
            idempotency_key: idempotency_token.to_string(),
        };
        match self.ledger.insert(&record).await? {
            LedgerInsert::Inserted => {}
            LedgerInsert::DuplicateToken => {
                IDEMPOTENT_REPLAYS_TOTAL.with_label_values(&["append"]).inc();
                let stored = self
                    .ledger
                    .find_by_token(idempotency_token)
                    .await?
                    .context("Ledger entry vanished after duplicate-token insert")?;
                return self.replay_outcome(stored).await;
            }
        }

        // Cache-aside: invalidate, never write through. The next read
        // repopulates from the store that just committed.
        self.cache.invalidate_user_state(user_id).await;

        let username = self
            .users
            .display_name(user_id)
            .await?
            .unwrap_or_else(|| "Unknown".to_string());
        self.leaderboards
            .update(
                LeaderboardKind::Score,
                user_id,
                &username,
                updated.total_score,
            )
            .await?;
        self.leaderboards
            .update(
                LeaderboardKind::Streak,
                user_id,
                &username,
                updated.max_streak as i64,
            )
            .await?;

        let rank_score = self
            .leaderboards
            .rank_of(LeaderboardKind::Score, user_id)
            .await?;
        let rank_streak = self
            .leaderboards
            .rank_of(LeaderboardKind::Streak, user_id)
            .await?;

        tracing::info!(
            "Answer processed: user={}, correct={}, delta={}, difficulty {}->{}, version={}",
            user_id,
            is_correct,
            breakdown.delta,
            answered_difficulty,
            updated.current_difficulty,
            updated.state_version
        );

        Ok(AnswerOutcome {
            correct: is_correct,
            correct_answer: question.correct_answer,
            new_difficulty: updated.current_difficulty,
            new_streak,
            max_streak: updated.max_streak,
            score_delta: breakdown.delta,
            total_score: updated.total_score,
            state_version: updated.state_version,
            rank_score,
            rank_streak,
            streak_multiplier: breakdown.streak_multiplier,
            difficulty_weight: breakdown.difficulty_weight,
            momentum: updated.momentum,
            replayed: false,
        })
    }

    /// Rebuilds the outcome of a previously applied submission from its
    /// ledger record plus the current state. The recorded correctness and
    /// delta are authoritative; multiplier diagnostics are not recorded and
    /// come back neutral.
    async fn replay_outcome(&self, record: AnswerRecord) -> EngineResult<AnswerOutcome> {
        let state = self.read(&record.user_id).await?;
        let correct_answer = self
            .questions
            .by_id(&record.question_id)
            .await?
            .map(|q| q.correct_answer)
            .unwrap_or_default();
        let rank_score = self
            .leaderboards
            .rank_of(LeaderboardKind::Score, &record.user_id)
            .await?;
        let rank_streak = self
            .leaderboards
            .rank_of(LeaderboardKind::Streak, &record.user_id)
            .await?;

        Ok(AnswerOutcome {
            correct: record.correct,
            correct_answer,
            new_difficulty: state.current_difficulty,
            new_streak: state.streak,
            max_streak: state.max_streak,
            score_delta: record.score_delta,
            total_score: state.total_score,
            state_version: state.state_version,
            rank_score,
            rank_streak,
            streak_multiplier: 1.0,
            difficulty_weight: 1.0,
            momentum: state.momentum,
            replayed: true,
        })
    }

    pub async fn metrics(&self, user_id: &str) -> EngineResult<UserMetrics> {
        let state = self.read(user_id).await?;
        let histogram = self.ledger.difficulty_histogram(user_id).await?;

        Ok(UserMetrics {
            current_difficulty: state.current_difficulty,
            streak: state.streak,
            max_streak: state.max_streak,
            total_score: state.total_score,
            accuracy: round4(state.accuracy()),
            total_answered: state.total_answered,
            total_correct: state.total_correct,
            recent_performance: round4(adaptive::window_accuracy(&state.recent_answers)),
            momentum: state.momentum,
            difficulty_histogram: histogram,
        })
    }
}

fn round4(value: f64) -> f64 {
    (value * 10000.0).round() / 10000.0
}

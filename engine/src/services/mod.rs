use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;

use crate::config::Config;
use crate::error::EngineResult;
use crate::models::answer::{AnswerOutcome, NextQuestion, UserMetrics};
use crate::models::{LeaderboardKind, LeaderboardView, UserState};
use crate::store::mongo::{
    self, MongoAnswerLedger, MongoLeaderboardStore, MongoQuestionBank, MongoStateStore,
    MongoUserDirectory,
};
use crate::store::redis_cache::RedisCache;
use crate::store::{
    AnswerLedger, Cache, LeaderboardStore, NoopCache, QuestionBank, StateStore, UserDirectory,
};

pub mod adaptive;
pub mod cache_service;
pub mod leaderboard_service;
pub mod notify;
pub mod quiz_service;
pub mod scoring;

use cache_service::CacheLayer;
use leaderboard_service::LeaderboardService;
use notify::{LiveEvent, NotificationHub};
use quiz_service::QuizService;

/// The assembled adaptive state engine. Owns the subscriber registry and the
/// cache handle explicitly; there are no ambient singletons, so embedders and
/// tests construct as many engines as they like.
pub struct Engine {
    pub config: Config,
    quiz: QuizService,
    leaderboards: Arc<LeaderboardService>,
    hub: Arc<NotificationHub>,
}

impl Engine {
    /// Wires the engine from explicit collaborators. The cache backend may be
    /// [`NoopCache`]; every path treats it exactly like a live one.
    pub fn new(
        config: Config,
        states: Arc<dyn StateStore>,
        ledger: Arc<dyn AnswerLedger>,
        questions: Arc<dyn QuestionBank>,
        users: Arc<dyn UserDirectory>,
        leaderboard_store: Arc<dyn LeaderboardStore>,
        cache_backend: Arc<dyn Cache>,
    ) -> Self {
        let cache = Arc::new(CacheLayer::new(cache_backend, &config.tuning));
        let hub = Arc::new(NotificationHub::new());
        let leaderboards = Arc::new(LeaderboardService::new(
            leaderboard_store,
            cache.clone(),
            hub.clone(),
            config.tuning.leaderboard_size,
        ));
        let quiz = QuizService::new(
            states,
            ledger,
            questions,
            users,
            cache,
            leaderboards.clone(),
            config.tuning.clone(),
        );

        Self {
            config,
            quiz,
            leaderboards,
            hub,
        }
    }

    /// Connects to MongoDB and Redis and assembles the production engine.
    /// A dead Redis is not fatal: the engine falls back to the no-op cache
    /// and serves everything from the authoritative store.
    pub async fn connect(config: Config) -> Result<Self> {
        let mongo_client = mongodb::Client::with_uri_str(&config.mongo_uri).await?;
        let db = mongo_client.database(&config.mongo_database);
        mongo::ensure_indexes(&db).await?;
        tracing::info!("MongoDB connected: {}", config.mongo_database);

        let cache_backend: Arc<dyn Cache> = match redis::Client::open(config.redis_uri.clone()) {
            Ok(client) => match RedisCache::connect(client).await {
                Ok(cache) => Arc::new(cache),
                Err(e) => {
                    tracing::warn!("Redis unavailable, operating without cache: {:#}", e);
                    Arc::new(NoopCache)
                }
            },
            Err(e) => {
                tracing::warn!("Invalid Redis URI, operating without cache: {}", e);
                Arc::new(NoopCache)
            }
        };

        Ok(Self::new(
            config,
            Arc::new(MongoStateStore::new(db.clone())),
            Arc::new(MongoAnswerLedger::new(db.clone())),
            Arc::new(MongoQuestionBank::new(db.clone())),
            Arc::new(MongoUserDirectory::new(db.clone())),
            Arc::new(MongoLeaderboardStore::new(db)),
            cache_backend,
        ))
    }

    pub async fn next_question(&self, user_id: &str) -> EngineResult<NextQuestion> {
        self.quiz.next_question(user_id).await
    }

    pub async fn submit_answer(
        &self,
        user_id: &str,
        question_id: &str,
        answer: &str,
        expected_version: u64,
        idempotency_token: &str,
    ) -> EngineResult<AnswerOutcome> {
        self.quiz
            .submit_answer(
                user_id,
                question_id,
                answer,
                expected_version,
                idempotency_token,
            )
            .await
    }

    /// Cached snapshot of a user's state (created on first access).
    pub async fn user_state(&self, user_id: &str) -> EngineResult<UserState> {
        self.quiz.read(user_id).await
    }

    pub async fn metrics(&self, user_id: &str) -> EngineResult<UserMetrics> {
        self.quiz.metrics(user_id).await
    }

    pub async fn leaderboard(
        &self,
        kind: LeaderboardKind,
        viewer: Option<&str>,
    ) -> EngineResult<LeaderboardView> {
        Ok(self.leaderboards.view(kind, viewer).await?)
    }

    /// Registers a live observer; the stream starts with a connected event
    /// and then carries leaderboard deltas.
    pub fn subscribe_live(&self, observer_id: &str) -> mpsc::Receiver<LiveEvent> {
        self.hub.subscribe(observer_id)
    }

    pub fn unsubscribe_live(&self, observer_id: &str) {
        self.hub.unsubscribe(observer_id);
    }

    /// Graceful drain: closes every live observer channel.
    pub fn shutdown(&self) {
        tracing::info!("Draining live observers");
        self.hub.drain();
    }
}

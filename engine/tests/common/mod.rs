use std::sync::Arc;

use brainbolt_engine::models::Question;
use brainbolt_engine::store::memory::{
    MemoryAnswerLedger, MemoryCache, MemoryLeaderboardStore, MemoryQuestionBank, MemoryStateStore,
    MemoryUserDirectory,
};
use brainbolt_engine::{Config, Engine, Tuning};

pub struct TestEngine {
    pub engine: Engine,
    pub directory: Arc<MemoryUserDirectory>,
    pub bank: Arc<MemoryQuestionBank>,
}

pub fn question(id: &str, difficulty: u32, answer: &str) -> Question {
    Question {
        id: id.to_string(),
        difficulty,
        prompt: format!("What is the answer to {}?", id),
        choices: vec![answer.to_string(), "wrong-a".to_string(), "wrong-b".to_string()],
        correct_answer: answer.to_string(),
        tags: vec![],
    }
}

pub fn build_engine(questions: Vec<Question>) -> TestEngine {
    build_engine_with_tuning(questions, Tuning::default())
}

pub fn build_engine_with_tuning(questions: Vec<Question>, tuning: Tuning) -> TestEngine {
    // Initialize tracing for tests
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();

    let config = Config {
        mongo_uri: "mongodb://localhost:27017/brainbolt-test".to_string(),
        redis_uri: "redis://localhost:6379".to_string(),
        mongo_database: "brainbolt-test".to_string(),
        tuning,
    };

    let directory = Arc::new(MemoryUserDirectory::new());
    let bank = Arc::new(MemoryQuestionBank::new(questions));

    let engine = Engine::new(
        config,
        Arc::new(MemoryStateStore::new()),
        Arc::new(MemoryAnswerLedger::new()),
        bank.clone(),
        directory.clone(),
        Arc::new(MemoryLeaderboardStore::new()),
        Arc::new(MemoryCache::new()),
    );

    TestEngine {
        engine,
        directory,
        bank,
    }
}

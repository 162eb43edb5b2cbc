use std::collections::BTreeMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::stream::TryStreamExt;
use mongodb::bson::{doc, Document};
use mongodb::options::IndexOptions;
use mongodb::{Database, IndexModel};

use super::{AnswerLedger, LedgerInsert, LeaderboardStore, QuestionBank, StateStore, UserDirectory};
use crate::models::answer::AnswerRecord;
use crate::models::{LeaderboardEntry, LeaderboardKind, Question, UserState};

const USER_STATES: &str = "user_states";
const ANSWER_LOG: &str = "answer_log";
const QUESTIONS: &str = "questions";
const USERS: &str = "users";

fn leaderboard_collection(kind: LeaderboardKind) -> &'static str {
    match kind {
        LeaderboardKind::Score => "leaderboard_score",
        LeaderboardKind::Streak => "leaderboard_streak",
    }
}

/// Creates the indexes the engine relies on. Idempotent; called once at
/// service start.
pub async fn ensure_indexes(db: &Database) -> Result<()> {
    let answers: mongodb::Collection<AnswerRecord> = db.collection(ANSWER_LOG);
    answers
        .create_index(
            IndexModel::builder()
                .keys(doc! { "idempotency_key": 1 })
                .options(IndexOptions::builder().unique(true).build())
                .build(),
        )
        .await
        .context("Failed to create unique idempotency index")?;
    answers
        .create_index(
            IndexModel::builder()
                .keys(doc! { "user_id": 1, "answered_at": -1 })
                .build(),
        )
        .await?;

    let questions: mongodb::Collection<Question> = db.collection(QUESTIONS);
    questions
        .create_index(IndexModel::builder().keys(doc! { "difficulty": 1 }).build())
        .await?;

    Ok(())
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    if let mongodb::error::ErrorKind::Write(mongodb::error::WriteFailure::WriteError(ref we)) =
        *err.kind
    {
        return we.code == 11000;
    }
    false
}

pub struct MongoStateStore {
    db: Database,
}

impl MongoStateStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    fn collection(&self) -> mongodb::Collection<UserState> {
        self.db.collection(USER_STATES)
    }
}

#[async_trait]
impl StateStore for MongoStateStore {
    async fn load(&self, user_id: &str) -> Result<Option<UserState>> {
        self.collection()
            .find_one(doc! { "_id": user_id })
            .await
            .context("Failed to load user state")
    }

    async fn create(&self, state: &UserState) -> Result<UserState> {
        match self.collection().insert_one(state).await {
            Ok(_) => Ok(state.clone()),
            // A concurrent first access raced us; the stored document wins.
            Err(e) if is_duplicate_key(&e) => self
                .load(&state.user_id)
                .await?
                .context("State vanished after duplicate-key insert"),
            Err(e) => Err(e).context("Failed to create user state"),
        }
    }

    async fn cas_update(&self, state: &UserState, expected_version: u64) -> Result<bool> {
        let filter = doc! {
            "_id": &state.user_id,
            "state_version": expected_version as i64,
        };
        let result = self
            .collection()
            .replace_one(filter, state)
            .await
            .context("Failed to write user state")?;
        Ok(result.matched_count == 1)
    }

    async fn reset_progression(&self, user_id: &str) -> Result<()> {
        self.collection()
            .update_one(
                doc! { "_id": user_id },
                doc! { "$set": { "streak": 0, "momentum": 0.0 } },
            )
            .await
            .context("Failed to reset streak and momentum")?;
        Ok(())
    }
}

pub struct MongoAnswerLedger {
    db: Database,
}

impl MongoAnswerLedger {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    fn collection(&self) -> mongodb::Collection<AnswerRecord> {
        self.db.collection(ANSWER_LOG)
    }
}

#[async_trait]
impl AnswerLedger for MongoAnswerLedger {
    async fn insert(&self, record: &AnswerRecord) -> Result<LedgerInsert> {
        match self.collection().insert_one(record).await {
            Ok(_) => Ok(LedgerInsert::Inserted),
            Err(e) if is_duplicate_key(&e) => Ok(LedgerInsert::DuplicateToken),
            Err(e) => Err(e).context("Failed to append answer record"),
        }
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<AnswerRecord>> {
        self.collection()
            .find_one(doc! { "idempotency_key": token })
            .await
            .context("Failed to look up idempotency token")
    }

    async fn difficulty_histogram(&self, user_id: &str) -> Result<BTreeMap<u32, u64>> {
        let pipeline = vec![
            doc! { "$match": { "user_id": user_id } },
            doc! { "$group": { "_id": "$difficulty", "count": { "$sum": 1 } } },
            doc! { "$sort": { "_id": 1 } },
        ];
        let mut cursor = self
            .collection()
            .aggregate(pipeline)
            .await
            .context("Failed to aggregate difficulty histogram")?;

        let mut histogram = BTreeMap::new();
        while let Some(bucket) = cursor.try_next().await? {
            let difficulty = bson_int(&bucket, "_id");
            let count = bson_int(&bucket, "count");
            if let (Some(difficulty), Some(count)) = (difficulty, count) {
                histogram.insert(difficulty as u32, count as u64);
            }
        }
        Ok(histogram)
    }
}

fn bson_int(doc: &Document, key: &str) -> Option<i64> {
    let value = doc.get(key)?;
    value.as_i64().or_else(|| value.as_i32().map(i64::from))
}

pub struct MongoQuestionBank {
    db: Database,
}

impl MongoQuestionBank {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    fn collection(&self) -> mongodb::Collection<Question> {
        self.db.collection(QUESTIONS)
    }
}

#[async_trait]
impl QuestionBank for MongoQuestionBank {
    async fn by_id(&self, question_id: &str) -> Result<Option<Question>> {
        self.collection()
            .find_one(doc! { "_id": question_id })
            .await
            .context("Failed to query questions collection")
    }

    async fn by_difficulty(&self, difficulty: u32) -> Result<Vec<Question>> {
        self.collection()
            .find(doc! { "difficulty": difficulty as i32 })
            .await
            .context("Failed to query question pool")?
            .try_collect()
            .await
            .context("Failed to read question pool cursor")
    }
}

pub struct MongoUserDirectory {
    db: Database,
}

impl MongoUserDirectory {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserDirectory for MongoUserDirectory {
    async fn display_name(&self, user_id: &str) -> Result<Option<String>> {
        let users: mongodb::Collection<Document> = self.db.collection(USERS);
        let user = users
            .find_one(doc! { "_id": user_id })
            .await
            .context("Failed to look up user")?;
        Ok(user.and_then(|u| u.get_str("username").ok().map(str::to_string)))
    }
}

pub struct MongoLeaderboardStore {
    db: Database,
}

impl MongoLeaderboardStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    fn collection(&self, kind: LeaderboardKind) -> mongodb::Collection<LeaderboardEntry> {
        self.db.collection(leaderboard_collection(kind))
    }
}

#[async_trait]
impl LeaderboardStore for MongoLeaderboardStore {
    async fn upsert(&self, kind: LeaderboardKind, entry: &LeaderboardEntry) -> Result<()> {
        self.collection(kind)
            .replace_one(doc! { "_id": &entry.user_id }, entry)
            .upsert(true)
            .await
            .context("Failed to upsert leaderboard entry")?;
        Ok(())
    }

    async fn top_n(&self, kind: LeaderboardKind, n: usize) -> Result<Vec<LeaderboardEntry>> {
        // Descending by metric, ascending by user id on ties: deterministic.
        self.collection(kind)
            .find(doc! {})
            .sort(doc! { "value": -1, "_id": 1 })
            .limit(n as i64)
            .await
            .context("Failed to query leaderboard")?
            .try_collect()
            .await
            .context("Failed to read leaderboard cursor")
    }

    async fn entry(
        &self,
        kind: LeaderboardKind,
        user_id: &str,
    ) -> Result<Option<LeaderboardEntry>> {
        self.collection(kind)
            .find_one(doc! { "_id": user_id })
            .await
            .context("Failed to load leaderboard entry")
    }

    async fn count_greater(&self, kind: LeaderboardKind, value: i64) -> Result<u64> {
        self.collection(kind)
            .count_documents(doc! { "value": { "$gt": value } })
            .await
            .context("Failed to count leaderboard entries")
    }
}

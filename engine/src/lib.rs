//! Adaptive state engine for an infinite quiz.
//!
//! Each player carries a difficulty level steered by a decayed-momentum model
//! of recent correctness. Answer submissions mutate per-user state through an
//! optimistic-concurrency, idempotent protocol; accepted mutations feed two
//! ranked leaderboards and a live broadcast to connected observers. Reads go
//! through a cache-aside layer that degrades silently when the cache backend
//! is down.
//!
//! HTTP transport, auth and question content management are out of scope and
//! live behind the collaborator traits in [`store`].

pub mod config;
pub mod error;
pub mod metrics;
pub mod models;
pub mod services;
pub mod store;
pub mod utils;

pub use config::{Config, Tuning};
pub use error::{EngineError, EngineResult};
pub use services::notify::{LiveEvent, NotificationHub};
pub use services::Engine;

use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub mongo_uri: String,
    pub redis_uri: String,
    pub mongo_database: String,
    pub tuning: Tuning,
}

/// Tuning constants for the adaptive engine. Defaults match the values the
/// difficulty controller and scoring formula were calibrated against.
#[derive(Debug, Clone, Deserialize)]
pub struct Tuning {
    // Adaptive algorithm
    pub min_difficulty: u32,
    pub max_difficulty: u32,
    pub momentum_decay: f64,
    pub momentum_threshold: f64,
    pub momentum_cap: f64,
    pub min_streak_to_increase: u32,

    // Scoring
    pub base_points: i64,
    pub max_streak_multiplier: f64,
    pub streak_multiplier_step: f64,

    // Streak decay
    pub streak_decay_minutes: i64,

    // Leaderboard
    pub leaderboard_size: usize,

    // Cache TTL (seconds)
    pub user_state_ttl: u64,
    pub question_pool_ttl: u64,
    pub leaderboard_ttl: u64,

    // Rolling window size for recent performance
    pub rolling_window_size: usize,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            min_difficulty: 1,
            max_difficulty: 10,
            momentum_decay: 0.7,
            momentum_threshold: 0.6,
            momentum_cap: 2.0,
            min_streak_to_increase: 2,
            base_points: 10,
            max_streak_multiplier: 3.0,
            streak_multiplier_step: 0.1,
            streak_decay_minutes: 30,
            leaderboard_size: 10,
            user_state_ttl: 300,
            question_pool_ttl: 600,
            leaderboard_ttl: 10,
            rolling_window_size: 20,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();

        // Determine environment (defaults to dev)
        let env = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

        // Build configuration from config/*.toml + ENV overrides
        let config_builder = config::Config::builder()
            // Load base config from TOML file
            .add_source(
                config::File::with_name(&format!("config/{}", env)).required(false), // Allow missing config file, fallback to ENV
            )
            // Override with environment variables (prefix: APP_)
            .add_source(config::Environment::with_prefix("APP").separator("__"));

        let settings = config_builder.build()?;

        // Extract values with fallbacks to ENV or defaults
        let mongo_uri = settings
            .get_string("database.mongo_uri")
            .or_else(|_| env::var("MONGO_URI"))
            .unwrap_or_else(|_| "mongodb://localhost:27017/brainbolt".to_string());

        let redis_uri = settings
            .get_string("redis.uri")
            .or_else(|_| env::var("REDIS_URI"))
            .unwrap_or_else(|_| "redis://localhost:6379".to_string());

        let mongo_database = settings
            .get_string("database.mongo_database")
            .or_else(|_| env::var("MONGO_DATABASE"))
            .unwrap_or_else(|_| "brainbolt".to_string());

        let tuning = settings
            .get::<Tuning>("tuning")
            .unwrap_or_else(|_| Tuning::default());

        Ok(Config {
            mongo_uri,
            redis_uri,
            mongo_database,
            tuning,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_tuning_matches_calibration() {
        let tuning = Tuning::default();
        assert_eq!(tuning.min_difficulty, 1);
        assert_eq!(tuning.max_difficulty, 10);
        assert!((tuning.momentum_decay - 0.7).abs() < f64::EPSILON);
        assert!((tuning.momentum_threshold - 0.6).abs() < f64::EPSILON);
        assert_eq!(tuning.min_streak_to_increase, 2);
        assert_eq!(tuning.base_points, 10);
        assert_eq!(tuning.rolling_window_size, 20);
    }
}

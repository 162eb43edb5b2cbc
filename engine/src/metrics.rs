use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_int_counter_vec, register_int_gauge, CounterVec, Encoder,
    IntCounterVec, IntGauge, TextEncoder,
};

lazy_static! {
    // Answer pipeline
    pub static ref ANSWERS_SUBMITTED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "answers_submitted_total",
        "Total number of answers submitted",
        &["correct"]
    )
    .unwrap();

    pub static ref STATE_CAS_CONFLICTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "state_cas_conflicts_total",
        "Optimistic-concurrency write rejections on user state",
        &["stage"]
    )
    .unwrap();

    pub static ref IDEMPOTENT_REPLAYS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "idempotent_replays_total",
        "Answer submissions answered from the idempotency ledger",
        &["stage"]
    )
    .unwrap();

    pub static ref DIFFICULTY_CHANGES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "difficulty_changes_total",
        "Difficulty level changes produced by the adaptive controller",
        &["direction"]
    )
    .unwrap();

    // Cache
    pub static ref CACHE_OPERATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "cache_operations_total",
        "Total number of cache operations",
        &["operation", "status"]
    )
    .unwrap();

    pub static ref CACHE_HIT_RATIO: CounterVec = register_counter_vec!(
        "cache_hit_ratio",
        "Cache hit/miss ratio",
        &["result"]
    )
    .unwrap();

    // Live observers
    pub static ref LIVE_SUBSCRIBERS_ACTIVE: IntGauge = register_int_gauge!(
        "live_subscribers_active",
        "Number of currently registered live observers"
    )
    .unwrap();

    pub static ref LEADERBOARD_BROADCASTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "leaderboard_broadcasts_total",
        "Leaderboard snapshots broadcast to live observers",
        &["kind"]
    )
    .unwrap();
}

/// Renders all metrics in Prometheus text format
pub fn render_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer)
        .map_err(|e| prometheus::Error::Msg(format!("Failed to convert metrics to UTF-8: {}", e)))
}

/// Record cache hit
pub fn record_cache_hit() {
    CACHE_HIT_RATIO.with_label_values(&["hit"]).inc();
}

/// Record cache miss
pub fn record_cache_miss() {
    CACHE_HIT_RATIO.with_label_values(&["miss"]).inc();
}

pub fn record_cache_operation(operation: &str, ok: bool) {
    let status = if ok { "success" } else { "error" };
    CACHE_OPERATIONS_TOTAL
        .with_label_values(&[operation, status])
        .inc();
}

use chrono::{DateTime, Duration, Utc};

use crate::config::Tuning;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdaptiveResult {
    pub new_difficulty: u32,
    pub new_momentum: f64,
}

/// Momentum-based difficulty controller.
///
/// Momentum decays geometrically each step and takes a ±1.0 impulse, so a
/// single lucky or unlucky answer cannot flip the level. Raising difficulty
/// additionally requires a minimum streak; lowering it does not, so the engine
/// backs off quickly for a struggling player. Under pure correct/wrong
/// alternation momentum settles inside the threshold band and difficulty
/// holds still.
///
/// Total over its domain; output difficulty stays in
/// `[min_difficulty, max_difficulty]` and momentum in `[-cap, cap]`.
pub fn next_difficulty(
    current_difficulty: u32,
    is_correct: bool,
    current_momentum: f64,
    new_streak: u32,
    tuning: &Tuning,
) -> AdaptiveResult {
    let impulse = if is_correct { 1.0 } else { -1.0 };
    let new_momentum = (current_momentum * tuning.momentum_decay + impulse)
        .clamp(-tuning.momentum_cap, tuning.momentum_cap);

    let mut new_difficulty = current_difficulty;
    if new_momentum > tuning.momentum_threshold && new_streak >= tuning.min_streak_to_increase {
        new_difficulty = (current_difficulty + 1).min(tuning.max_difficulty);
    } else if new_momentum < -tuning.momentum_threshold {
        new_difficulty = current_difficulty
            .saturating_sub(1)
            .max(tuning.min_difficulty);
    }

    AdaptiveResult {
        new_difficulty,
        new_momentum,
    }
}

/// Whether streak and momentum should be zeroed for inactivity. Historical
/// totals never decay.
pub fn should_decay_streak(
    last_answer_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    tuning: &Tuning,
) -> bool {
    match last_answer_at {
        Some(last) => now - last > Duration::minutes(tuning.streak_decay_minutes),
        None => false,
    }
}

/// Appends to the rolling performance window, evicting the oldest outcome
/// once `rolling_window_size` is reached.
pub fn push_outcome(window: &[bool], outcome: bool, tuning: &Tuning) -> Vec<bool> {
    let mut updated = window.to_vec();
    updated.push(outcome);
    if updated.len() > tuning.rolling_window_size {
        let excess = updated.len() - tuning.rolling_window_size;
        updated.drain(..excess);
    }
    updated
}

/// Fraction of true outcomes in the window; 0.0 when empty.
pub fn window_accuracy(window: &[bool]) -> f64 {
    if window.is_empty() {
        return 0.0;
    }
    let correct = window.iter().filter(|&&c| c).count();
    correct as f64 / window.len() as f64
}

use crate::config::Tuning;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreBreakdown {
    pub delta: i64,
    pub streak_multiplier: f64,
    pub difficulty_weight: f64,
}

/// Scoring formula:
///
/// ```text
/// streak_multiplier = min(1.0 + streak * streak_multiplier_step, max_streak_multiplier)
/// difficulty_weight = 1.0 + (difficulty - 1) * 0.25
/// delta             = round(base_points * difficulty_weight * streak_multiplier)  (correct)
///                   = 0                                                           (wrong)
/// ```
///
/// Wrong answers never subtract points; the streak reset is the only penalty.
/// Rounding is round-half-away-from-zero (`f64::round`), fixed here so the
/// delta for a given input is identical everywhere.
pub fn score(
    is_correct: bool,
    difficulty: u32,
    streak_before: u32,
    tuning: &Tuning,
) -> ScoreBreakdown {
    let streak_multiplier = (1.0 + streak_before as f64 * tuning.streak_multiplier_step)
        .min(tuning.max_streak_multiplier);
    let difficulty_weight = 1.0 + (difficulty as f64 - 1.0) * 0.25;

    let delta = if is_correct {
        (tuning.base_points as f64 * difficulty_weight * streak_multiplier).round() as i64
    } else {
        0
    };

    ScoreBreakdown {
        delta,
        streak_multiplier,
        difficulty_weight,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_case_awards_base_points() {
        let result = score(true, 1, 0, &Tuning::default());
        assert_eq!(result.delta, 10);
        assert!((result.streak_multiplier - 1.0).abs() < f64::EPSILON);
        assert!((result.difficulty_weight - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn difficulty_and_streak_compound() {
        // difficulty 5 -> weight 2.0, streak 5 -> multiplier 1.5
        let result = score(true, 5, 5, &Tuning::default());
        assert!((result.streak_multiplier - 1.5).abs() < 1e-9);
        assert!((result.difficulty_weight - 2.0).abs() < 1e-9);
        assert_eq!(result.delta, 30);
    }

    #[test]
    fn wrong_answer_is_worth_nothing() {
        for difficulty in 1..=10 {
            for streak in [0, 3, 50] {
                let result = score(false, difficulty, streak, &Tuning::default());
                assert_eq!(result.delta, 0);
            }
        }
    }

    #[test]
    fn streak_multiplier_is_capped() {
        // Streak 40 would give 5.0 uncapped; the cap holds it at 3.0.
        let result = score(true, 1, 40, &Tuning::default());
        assert!((result.streak_multiplier - 3.0).abs() < f64::EPSILON);
        assert_eq!(result.delta, 30);
    }

    #[test]
    fn rounding_is_half_away_from_zero() {
        let tuning = Tuning {
            streak_multiplier_step: 0.05,
            ..Tuning::default()
        };
        // 10 * 1.0 * 1.05 = 10.5 rounds up, not to even.
        let result = score(true, 1, 1, &tuning);
        assert_eq!(result.delta, 11);
    }
}

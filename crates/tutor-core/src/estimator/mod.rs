//! Pure ELO-with-uncertainty skill estimator. No I/O, no config mutation —
//! every function takes what it needs and returns a new value.

use crate::config::TutorConfig;
use crate::domain::SkillState;

const P_EPSILON: f64 = 1e-6;

/// `p = 1 / (1 + 10^((D - S) / scale))`, clamped away from {0, 1}.
pub fn probability(skill: f64, difficulty: f64, scale: f64) -> f64 {
    let raw = 1.0 / (1.0 + 10f64.powf((difficulty - skill) / scale));
    raw.clamp(P_EPSILON, 1.0 - P_EPSILON)
}

/// `D = S + scale * log10(1 / target_p - 1)`.
pub fn target_difficulty(skill: f64, target_p: f64, scale: f64) -> f64 {
    let target_p = target_p.clamp(P_EPSILON, 1.0 - P_EPSILON);
    skill + scale * (1.0 / target_p - 1.0).log10()
}

/// `K = base * (u / initial_uncertainty) * (2.0 if streak >= 2 else 1.0)`.
pub fn k_factor(uncertainty: f64, initial_uncertainty: f64, base_k_factor: f64, active_streak: u32) -> f64 {
    let streak_bonus = if active_streak >= 2 { 2.0 } else { 1.0 };
    base_k_factor * (uncertainty / initial_uncertainty) * streak_bonus
}

/// Applies one ELO update to `state` given a binary `outcome` at difficulty
/// `difficulty`, returning the new state. `active_streak` is the learner's
/// current consecutive-correct streak *before* this outcome is folded in.
pub fn update(state: &SkillState, outcome: bool, difficulty: f64, active_streak: u32, config: &TutorConfig) -> SkillState {
    let expected = probability(state.rating, difficulty, config.elo_scale_factor);
    let k = k_factor(state.uncertainty, config.initial_uncertainty, config.base_k_factor, active_streak);
    let outcome_f = if outcome { 1.0 } else { 0.0 };

    let rating = state.rating + k * (outcome_f - expected);
    let uncertainty = (state.uncertainty * config.uncertainty_decay).max(config.uncertainty_floor);

    SkillState {
        learner_id: state.learner_id,
        concept_id: state.concept_id,
        rating,
        uncertainty,
        total_attempts: state.total_attempts + 1,
        correct_attempts: state.correct_attempts + if outcome { 1 } else { 0 },
        last_updated: chrono::Utc::now(),
    }
}

/// `m = 0.6 * clamp((rating - 400) / 1200, 0, 1) + 0.4 * recent_accuracy`.
pub fn mastery(rating: f64, recent_accuracy: f64) -> f64 {
    let rating_component = ((rating - 400.0) / 1200.0).clamp(0.0, 1.0);
    0.6 * rating_component + 0.4 * recent_accuracy
}

pub fn is_mastered(rating: f64, recent_accuracy: f64, mastery_threshold: f64) -> bool {
    mastery(rating, recent_accuracy) >= mastery_threshold
}

/// Calibrates a target difficulty towards the learner's observed recent
/// accuracy on this concept once enough attempts exist to trust the signal.
pub fn calibrate(target_d: f64, recent_accuracy: f64, attempts_on_concept: u32, config: &TutorConfig) -> f64 {
    if attempts_on_concept < 3 {
        return target_d;
    }
    target_d + config.calibration_gain * (recent_accuracy - config.target_success_rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> TutorConfig {
        TutorConfig::default()
    }

    #[test]
    fn probability_calibrates_to_half_at_equal_skill_and_difficulty() {
        let p = probability(1000.0, 1000.0, 400.0);
        assert!((p - 0.5).abs() < 1e-9);
    }

    #[test]
    fn probability_favors_learner_when_skill_exceeds_difficulty() {
        let p = probability(1200.0, 1000.0, 400.0);
        assert!(p > 0.5);
    }

    #[test]
    fn target_difficulty_round_trips_through_probability() {
        for target_p in [0.5, 0.6, 0.7, 0.8, 0.9] {
            let skill = 1000.0;
            let d = target_difficulty(skill, target_p, 400.0);
            let p = probability(skill, d, 400.0);
            assert!((p - target_p).abs() < 1e-6, "target_p={target_p} got p={p}");
        }
    }

    #[test]
    fn rating_monotonic_in_outcome() {
        let state = SkillState::default_for(1, 1, 800.0, 350.0);
        let cfg = config();
        let correct = update(&state, true, 800.0, 0, &cfg);
        let incorrect = update(&state, false, 800.0, 0, &cfg);
        assert!(correct.rating > state.rating);
        assert!(incorrect.rating < state.rating);
    }

    #[test]
    fn uncertainty_decays_towards_floor_and_never_increases() {
        let cfg = config();
        let mut state = SkillState::default_for(1, 1, 800.0, 350.0);
        let mut previous = state.uncertainty;
        for _ in 0..200 {
            state = update(&state, true, 800.0, 0, &cfg);
            assert!(state.uncertainty <= previous);
            previous = state.uncertainty;
        }
        assert!((state.uncertainty - cfg.uncertainty_floor).abs() < 1e-6);
    }

    #[test]
    fn uncertainty_never_drops_below_floor() {
        let cfg = config();
        let state = SkillState::default_for(1, 1, 800.0, 50.0);
        let updated = update(&state, true, 800.0, 0, &cfg);
        assert!(updated.uncertainty >= cfg.uncertainty_floor);
    }

    #[test]
    fn k_factor_doubles_on_streak() {
        let cfg = config();
        let base = k_factor(350.0, cfg.initial_uncertainty, cfg.base_k_factor, 0);
        let streaked = k_factor(350.0, cfg.initial_uncertainty, cfg.base_k_factor, 2);
        assert!((streaked - 2.0 * base).abs() < 1e-9);
    }

    #[test]
    fn mastery_blends_rating_and_recent_accuracy() {
        let low = mastery(400.0, 0.0);
        assert!((low - 0.0).abs() < 1e-9);

        let high = mastery(1600.0, 1.0);
        assert!((high - 1.0).abs() < 1e-9);

        let mid = mastery(1000.0, 0.5);
        assert!(mid > 0.0 && mid < 1.0);
    }

    #[test]
    fn is_mastered_uses_threshold() {
        assert!(is_mastered(1600.0, 1.0, 0.75));
        assert!(!is_mastered(800.0, 0.2, 0.75));
    }

    #[test]
    fn calibrate_is_identity_below_three_attempts() {
        let cfg = config();
        let d = calibrate(1000.0, 0.95, 2, &cfg);
        assert_eq!(d, 1000.0);
    }

    #[test]
    fn calibrate_adjusts_once_enough_attempts() {
        let cfg = config();
        let d = calibrate(1000.0, 0.90, 5, &cfg);
        let expected = 1000.0 + 500.0 * (0.90 - 0.80);
        assert!((d - expected).abs() < 1e-9);
    }
}

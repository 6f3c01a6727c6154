//! Immutable, process-injected configuration. Constructed once at startup
//! and shared via `Arc`; never mutated in place.

#[derive(Debug, Clone, PartialEq)]
pub struct TutorConfig {
    pub initial_skill_rating: f64,
    pub initial_uncertainty: f64,
    pub base_k_factor: f64,
    pub uncertainty_decay: f64,
    pub uncertainty_floor: f64,
    pub mastery_threshold: f64,
    pub target_success_rate: f64,
    pub recent_window: usize,
    pub elo_scale_factor: f64,
    pub max_generation_attempts: u32,
    pub calibration_gain: f64,
}

impl Default for TutorConfig {
    fn default() -> Self {
        Self {
            initial_skill_rating: 800.0,
            initial_uncertainty: 350.0,
            base_k_factor: 64.0,
            uncertainty_decay: 0.90,
            uncertainty_floor: 50.0,
            mastery_threshold: 0.75,
            target_success_rate: 0.80,
            recent_window: 30,
            elo_scale_factor: 400.0,
            max_generation_attempts: 3,
            calibration_gain: 500.0,
        }
    }
}

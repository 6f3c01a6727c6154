//! Reusable test fixtures for a small three-concept arithmetic topic.

use crate::domain::{Concept, SkillState};
use chrono::Utc;

/// Three concepts in a single topic: `c1 -> c2 -> c3` (`c1` is the only
/// prerequisite-free concept, `c3` depends on both `c1` and `c2`).
pub fn three_concept_topic(topic_id: i64) -> Vec<Concept> {
    vec![
        Concept {
            id: 1,
            topic_id,
            name: "Addition Facts".to_string(),
            description: "Single-digit addition".to_string(),
            order_index: 0,
            prerequisites: vec![],
            mastery_threshold: 0.75,
            visual_required: false,
        },
        Concept {
            id: 2,
            topic_id,
            name: "Subtraction Facts".to_string(),
            description: "Single-digit subtraction".to_string(),
            order_index: 1,
            prerequisites: vec![1],
            mastery_threshold: 0.75,
            visual_required: false,
        },
        Concept {
            id: 3,
            topic_id,
            name: "Mixed Word Problems".to_string(),
            description: "Addition and subtraction word problems".to_string(),
            order_index: 2,
            prerequisites: vec![1, 2],
            mastery_threshold: 0.75,
            visual_required: false,
        },
    ]
}

/// A fresh skill row at the configured defaults (800.0 / 350.0), matching
/// what an absent row resolves to.
pub fn untouched_skill(learner_id: i64, concept_id: i64) -> SkillState {
    SkillState::default_for(learner_id, concept_id, 800.0, 350.0)
}

/// A skill row with `total_attempts`/`correct_attempts` set so recent
/// accuracy and mastery formulas have something non-trivial to chew on.
pub fn skill_with_history(learner_id: i64, concept_id: i64, rating: f64, total_attempts: u32, correct_attempts: u32) -> SkillState {
    SkillState {
        learner_id,
        concept_id,
        rating,
        uncertainty: 350.0,
        total_attempts,
        correct_attempts,
        last_updated: Utc::now(),
    }
}

//! Dual pre-cache — while the learner is looking at the current
//! item, speculatively generate the next item for both possible outcomes so
//! whichever one actually happens is ready without a generation round-trip.

use crate::config::TutorConfig;
use crate::dedup::DedupRegistry;
use crate::domain::{Concept, Item, SkillState};
use crate::estimator;
use crate::generation;
use crate::policy::{self, RecentAnalysis};
use crate::ports::LlmClient;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutcomeBranch {
    Correct,
    Incorrect,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PrecacheKey {
    learner_id: i64,
    session_id: String,
    branch: OutcomeBranch,
}

/// Keyed store of speculatively generated items, one slot per
/// `(learner, session, outcome branch)`. A foreground read clears the slot
/// it consumes; stale entries for an ended session are dropped wholesale by
/// `clear_session`.
#[derive(Default)]
pub struct PrecacheStore {
    inner: Mutex<HashMap<PrecacheKey, Item>>,
}

impl PrecacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes and returns the pre-generated item for this branch, if the
    /// background task had finished by the time the learner answered.
    pub fn take(&self, learner_id: i64, session_id: &str, branch: OutcomeBranch) -> Option<Item> {
        let key = PrecacheKey {
            learner_id,
            session_id: session_id.to_string(),
            branch,
        };
        self.inner.lock().unwrap().remove(&key)
    }

    fn insert(&self, learner_id: i64, session_id: &str, branch: OutcomeBranch, item: Item) {
        let key = PrecacheKey {
            learner_id,
            session_id: session_id.to_string(),
            branch,
        };
        self.inner.lock().unwrap().insert(key, item);
    }

    pub fn clear_session(&self, learner_id: i64, session_id: &str) {
        let mut guard = self.inner.lock().unwrap();
        guard.retain(|k, _| !(k.learner_id == learner_id && k.session_id == session_id));
    }
}

/// Parameters needed to speculate what the next turn would look like under
/// a hypothetical outcome of the current item.
#[derive(Clone)]
pub struct PrecacheInputs {
    pub learner_id: i64,
    pub session_id: String,
    pub current_concept_id: i64,
    pub current_skill: SkillState,
    pub current_difficulty: f64,
    pub active_streak: u32,
    pub concepts: Vec<Concept>,
    pub skills: HashMap<i64, SkillState>,
    pub lifetime_attempt_counts: HashMap<i64, u32>,
    pub analysis: RecentAnalysis,
    pub dedup: DedupRegistry,
}

/// Adjusts `base`'s per-concept accuracy as if one more attempt on
/// `concept_id` had just landed with the given outcome, and marks that
/// concept as the one just practiced — the input the policy engine needs to
/// predict the *next* focus concept without a real attempt existing yet.
fn hypothetical_analysis(base: &RecentAnalysis, concept_id: i64, outcome: bool) -> RecentAnalysis {
    let mut analysis = base.clone();
    let prior = analysis.per_concept_accuracy.get(&concept_id).copied().unwrap_or(0.5);
    let attempts = analysis.per_concept_attempts.get(&concept_id).copied().unwrap_or(0) as f64;
    let blended = (prior * attempts + if outcome { 1.0 } else { 0.0 }) / (attempts + 1.0);
    analysis.per_concept_accuracy.insert(concept_id, blended);
    *analysis.per_concept_attempts.entry(concept_id).or_insert(0) += 1;
    analysis.last_practiced_concept_id = Some(concept_id);
    analysis
}

/// Spawns one background generation task per branch (correct / incorrect).
/// Each task predicts the skill update, re-runs focus selection, picks an
/// item type/difficulty, and generates an item into `store` — all without
/// touching the repository, since the outcome it's speculating about hasn't
/// happened yet. A speculative branch that turns out wrong is simply never
/// read; the foreground falls back to synchronous generation instead.
pub fn trigger(store: Arc<PrecacheStore>, inputs: PrecacheInputs, llm: Arc<dyn LlmClient>, config: Arc<TutorConfig>) {
    for branch in [OutcomeBranch::Correct, OutcomeBranch::Incorrect] {
        let store = store.clone();
        let llm = llm.clone();
        let config = config.clone();
        let inputs = inputs.clone();
        let outcome = branch == OutcomeBranch::Correct;

        tokio::spawn(async move {
            let updated_skill = estimator::update(
                &inputs.current_skill,
                outcome,
                inputs.current_difficulty,
                inputs.active_streak,
                &config,
            );
            let analysis = hypothetical_analysis(&inputs.analysis, inputs.current_concept_id, outcome);

            let mut skills = inputs.skills.clone();
            skills.insert(inputs.current_concept_id, updated_skill.clone());

            let Some(focus_id) = policy::select_focus_concept(
                &inputs.concepts,
                &skills,
                &inputs.lifetime_attempt_counts,
                &analysis,
                Some(inputs.current_concept_id),
            ) else {
                return;
            };
            let Some(focus_concept) = inputs.concepts.iter().find(|c| c.id == focus_id) else {
                return;
            };

            let recent_accuracy = analysis.per_concept_accuracy.get(&focus_id).copied().unwrap_or(0.0);
            let mastery = estimator::mastery(updated_skill.rating, recent_accuracy);
            let item_type = generation::item_type_for_mastery(mastery);
            let target_difficulty = generation::target_difficulty_for(updated_skill.rating, &config);

            if let Some(item) = generation::generate_item(
                focus_concept,
                target_difficulty,
                updated_skill.rating,
                item_type,
                &inputs.dedup,
                llm.as_ref(),
                &config,
            )
            .await
            {
                store.insert(inputs.learner_id, &inputs.session_id, branch, item);
            }
        });
    }
}

//! Session Turn API — the presentation collaborator's entire surface onto
//! the core: start/submit/next/precache_trigger/end. An `Arc<dyn
//! Repository>`-held service struct with `#[instrument]`-annotated async
//! orchestration.

use crate::config::TutorConfig;
use crate::dedup::DedupRegistry;
use crate::domain::{
    Attempt, Concept, DomainError, EnrichedAttempt, Item, ItemType, Session, SessionTotals,
    SkillHistorySnapshot, SkillState,
};
use crate::estimator;
use crate::generation;
use crate::grader::{self, GradeResult};
use crate::policy::{self, RecentAnalysis};
use crate::ports::{LlmClient, Repository};
use crate::precache::{self, OutcomeBranch, PrecacheInputs, PrecacheStore};
use anyhow::Result;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument};

/// What the presentation layer is shown for a turn: never the answer key.
#[derive(Debug, Clone)]
pub struct TurnView {
    pub item_id: i64,
    pub concept_id: i64,
    pub content: String,
    pub item_type: ItemType,
    pub options: Option<Vec<String>>,
}

impl From<&Item> for TurnView {
    fn from(item: &Item) -> Self {
        Self {
            item_id: item.id,
            concept_id: item.concept_id,
            content: item.content.clone(),
            item_type: item.item_type,
            options: item.options.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SubmitResult {
    pub is_correct: bool,
    pub is_close: Option<bool>,
    pub partial_score: Option<f64>,
    pub rating_before: f64,
    pub rating_after: f64,
    pub feedback: Option<String>,
}

/// Orchestrates the per-turn pipeline: policy → target difficulty →
/// generation → grading → skill update → persistence → dual pre-cache.
/// Holds no learner-specific state itself; everything
/// lives in the repository and the pre-cache store.
pub struct TurnService {
    repository: Arc<dyn Repository>,
    llm: Arc<dyn LlmClient>,
    config: Arc<TutorConfig>,
    precache: Arc<PrecacheStore>,
}

fn consecutive_streak(recent_newest_first: &[EnrichedAttempt]) -> u32 {
    recent_newest_first.iter().take_while(|a| a.attempt.is_correct).count() as u32
}

struct PolicyInputs {
    concepts: Vec<Concept>,
    skills: HashMap<i64, SkillState>,
    lifetime_attempt_counts: HashMap<i64, u32>,
    recent_newest_first: Vec<EnrichedAttempt>,
    analysis: RecentAnalysis,
}

impl TurnService {
    pub fn new(
        repository: Arc<dyn Repository>,
        llm: Arc<dyn LlmClient>,
        config: Arc<TutorConfig>,
        precache: Arc<PrecacheStore>,
    ) -> Self {
        Self {
            repository,
            llm,
            config,
            precache,
        }
    }

    async fn load_policy_inputs(&self, learner_id: i64, topic_id: i64) -> Result<PolicyInputs> {
        let concepts = self.repository.list_concepts_by_topic(topic_id).await?;

        let mut skills = HashMap::with_capacity(concepts.len());
        let mut lifetime_attempt_counts = HashMap::with_capacity(concepts.len());
        for concept in &concepts {
            let skill = self.repository.get_skill(learner_id, concept.id).await?;
            lifetime_attempt_counts.insert(concept.id, skill.total_attempts);
            skills.insert(concept.id, skill);
        }

        let recent_newest_first = self
            .repository
            .recent_enriched_attempts(learner_id, self.config.recent_window)
            .await?;
        let analysis = policy::analyze_recent(&recent_newest_first, &self.config);

        Ok(PolicyInputs {
            concepts,
            skills,
            lifetime_attempt_counts,
            recent_newest_first,
            analysis,
        })
    }

    async fn dedup_for_session(&self, learner_id: i64, session_id: &str) -> Result<DedupRegistry> {
        let session_texts = self.repository.session_texts(session_id).await?;
        let lifetime_texts = self.repository.correct_texts(learner_id).await?;
        Ok(DedupRegistry::new(session_texts, lifetime_texts))
    }

    /// Picks a focus concept, target difficulty, and item type, then runs
    /// the generation pipeline and persists the accepted item. Returns
    /// `None` if generation is exhausted.
    async fn generate_for_concept(
        &self,
        focus: &Concept,
        skill: &SkillState,
        recent_accuracy: f64,
        dedup: &DedupRegistry,
    ) -> Result<Option<Item>> {
        let mastery = estimator::mastery(skill.rating, recent_accuracy);
        let item_type = generation::item_type_for_mastery(mastery);
        let raw_target = generation::target_difficulty_for(skill.rating, &self.config);
        let target_difficulty =
            estimator::calibrate(raw_target, recent_accuracy, skill.total_attempts, &self.config);

        let Some(draft) = generation::generate_item(
            focus,
            target_difficulty,
            skill.rating,
            item_type,
            dedup,
            self.llm.as_ref(),
            &self.config,
        )
        .await
        else {
            return Ok(None);
        };

        let item_id = self.repository.insert_item(draft.clone()).await?;
        Ok(Some(Item {
            id: item_id,
            ..draft
        }))
    }

    /// Starts a new session: selects the opening focus concept (no prior
    /// turn to stay on), generates its first item, and persists both.
    #[instrument(skip(self), fields(learner_id, topic_id))]
    pub async fn start(&self, learner_id: i64, topic_id: i64) -> Result<(Session, TurnView)> {
        let session = self.repository.create_session(learner_id, Some(topic_id)).await?;
        let inputs = self.load_policy_inputs(learner_id, topic_id).await?;

        let focus_id = policy::select_focus_concept(
            &inputs.concepts,
            &inputs.skills,
            &inputs.lifetime_attempt_counts,
            &inputs.analysis,
            None,
        )
        .ok_or_else(|| DomainError::ConceptNotFound(0))?;
        let focus = inputs
            .concepts
            .iter()
            .find(|c| c.id == focus_id)
            .ok_or(DomainError::ConceptNotFound(focus_id))?;
        let skill = inputs.skills.get(&focus_id).cloned().unwrap_or_else(|| {
            SkillState::default_for(learner_id, focus_id, self.config.initial_skill_rating, self.config.initial_uncertainty)
        });
        let recent_accuracy = inputs.analysis.per_concept_accuracy.get(&focus_id).copied().unwrap_or(0.0);

        let dedup = self.dedup_for_session(learner_id, &session.id).await?;
        let item = self
            .generate_for_concept(focus, &skill, recent_accuracy, &dedup)
            .await?
            .ok_or_else(|| anyhow::anyhow!("no item could be generated for concept {focus_id}"))?;

        self.repository
            .set_session_current_item(&session.id, item.id, None)
            .await?;

        debug!(item_id = item.id, concept_id = focus_id, "session started");

        let view = TurnView::from(&item);
        self.trigger_precache(learner_id, &session.id, &item, &inputs).await;
        Ok((session, view))
    }

    /// Grades `answer_given`, updates skill state, and persists the
    /// attempt + skill state + history snapshot as a single transaction.
    /// Advances the session to its next item, preferring a matching
    /// pre-cache entry over synchronous generation.
    #[instrument(skip(self, answer_given), fields(session_id))]
    pub async fn submit(
        &self,
        session_id: &str,
        answer_given: &str,
        response_time_s: Option<f64>,
    ) -> Result<SubmitResult> {
        let session = self
            .repository
            .get_session(session_id)
            .await?
            .ok_or_else(|| DomainError::SessionNotFound(session_id.to_string()))?;
        if !session.is_active() {
            return Err(DomainError::SessionEnded(session_id.to_string()).into());
        }
        let item_id = session
            .current_item_id
            .ok_or_else(|| anyhow::anyhow!("session {session_id} has no current item"))?;
        let item = self
            .repository
            .get_item(item_id)
            .await?
            .ok_or(DomainError::ItemNotFound(item_id))?;

        let grade: GradeResult = grader::grade(&item, answer_given, self.llm.as_ref()).await;
        let feedback = grade
            .feedback
            .clone()
            .or_else(|| item.explanation.clone())
            .or_else(|| Some("Keep going!".to_string()));
        let partial_score = grade.partial_score.or_else(|| {
            (item.item_type == ItemType::Problem).then_some(if grade.is_correct { 1.0 } else { 0.0 })
        });

        let topic_id = session.topic_id.unwrap_or(item.concept_id);
        let inputs = self.load_policy_inputs(session.learner_id, topic_id).await?;
        let skill = inputs
            .skills
            .get(&item.concept_id)
            .cloned()
            .unwrap_or_else(|| {
                SkillState::default_for(session.learner_id, item.concept_id, self.config.initial_skill_rating, self.config.initial_uncertainty)
            });
        let streak = consecutive_streak(&inputs.recent_newest_first);
        let rating_before = skill.rating;
        let updated_skill = estimator::update(&skill, grade.is_correct, item.difficulty, streak, &self.config);

        let attempt = Attempt {
            id: 0,
            item_id: item.id,
            learner_id: session.learner_id,
            session_id: Some(session.id.clone()),
            concept_id: item.concept_id,
            answer_given: Some(answer_given.to_string()),
            is_correct: grade.is_correct,
            partial_score,
            response_time_s,
            rating_before,
            rating_after: updated_skill.rating,
            timestamp: Utc::now(),
        };
        let history = SkillHistorySnapshot {
            id: 0,
            attempt_id: 0,
            learner_id: session.learner_id,
            concept_id: item.concept_id,
            rating: updated_skill.rating,
            uncertainty: updated_skill.uncertainty,
            recorded_at: Utc::now(),
        };
        self.repository
            .insert_attempt_with_skill_update(attempt, updated_skill.clone(), history)
            .await?;

        self.advance_session(&session, &item, grade.is_correct, &updated_skill).await?;

        Ok(SubmitResult {
            is_correct: grade.is_correct,
            is_close: Some(grade.is_close),
            partial_score,
            rating_before,
            rating_after: updated_skill.rating,
            feedback,
        })
    }

    /// Tries the pre-cache branch matching the actual outcome; falls
    /// through to synchronous generation on a miss or concept mismatch.
    /// Persists and sets the new current item, then fires a fresh
    /// pre-cache for it.
    async fn advance_session(
        &self,
        session: &Session,
        answered_item: &Item,
        outcome: bool,
        updated_skill: &SkillState,
    ) -> Result<()> {
        let topic_id = session.topic_id.unwrap_or(answered_item.concept_id);
        let inputs = self.load_policy_inputs(session.learner_id, topic_id).await?;

        let Some(focus_id) = policy::select_focus_concept(
            &inputs.concepts,
            &inputs.skills,
            &inputs.lifetime_attempt_counts,
            &inputs.analysis,
            Some(answered_item.concept_id),
        ) else {
            self.precache.clear_session(session.learner_id, &session.id);
            return Ok(());
        };

        let branch = if outcome { OutcomeBranch::Correct } else { OutcomeBranch::Incorrect };
        let cached = self.precache.take(session.learner_id, &session.id, branch);
        self.precache.clear_session(session.learner_id, &session.id);

        let item = match cached {
            Some(candidate) if candidate.concept_id == focus_id => candidate,
            _ => {
                let focus = inputs
                    .concepts
                    .iter()
                    .find(|c| c.id == focus_id)
                    .ok_or(DomainError::ConceptNotFound(focus_id))?;
                let skill = inputs.skills.get(&focus_id).cloned().unwrap_or_else(|| updated_skill.clone());
                let recent_accuracy = inputs.analysis.per_concept_accuracy.get(&focus_id).copied().unwrap_or(0.0);
                let dedup = self.dedup_for_session(session.learner_id, &session.id).await?;
                match self.generate_for_concept(focus, &skill, recent_accuracy, &dedup).await? {
                    Some(item) => item,
                    None => {
                        // No item available: leave the session pointed at
                        // the item the learner just answered so the
                        // caller can fall back to showing it again.
                        return Ok(());
                    }
                }
            }
        };

        self.repository
            .set_session_current_item(&session.id, item.id, None)
            .await?;
        self.trigger_precache(session.learner_id, &session.id, &item, &inputs).await;
        Ok(())
    }

    async fn trigger_precache(&self, learner_id: i64, session_id: &str, current_item: &Item, inputs: &PolicyInputs) {
        let skill = inputs
            .skills
            .get(&current_item.concept_id)
            .cloned()
            .unwrap_or_else(|| {
                SkillState::default_for(learner_id, current_item.concept_id, self.config.initial_skill_rating, self.config.initial_uncertainty)
            });
        let streak = consecutive_streak(&inputs.recent_newest_first);
        let dedup = match self.dedup_for_session(learner_id, session_id).await {
            Ok(d) => d,
            Err(_) => return,
        };

        let precache_inputs = PrecacheInputs {
            learner_id,
            session_id: session_id.to_string(),
            current_concept_id: current_item.concept_id,
            current_skill: skill,
            current_difficulty: current_item.difficulty,
            active_streak: streak,
            concepts: inputs.concepts.clone(),
            skills: inputs.skills.clone(),
            lifetime_attempt_counts: inputs.lifetime_attempt_counts.clone(),
            analysis: inputs.analysis.clone(),
            dedup,
        };
        precache::trigger(self.precache.clone(), precache_inputs, self.llm.clone(), self.config.clone());
    }

    /// Idempotent, fire-and-forget: re-triggers pre-cache for a session's
    /// current item without altering any state. Safe to call repeatedly
    /// (e.g. on session resume).
    #[instrument(skip(self), fields(session_id))]
    pub async fn precache_trigger(&self, session_id: &str) -> Result<()> {
        let session = self
            .repository
            .get_session(session_id)
            .await?
            .ok_or_else(|| DomainError::SessionNotFound(session_id.to_string()))?;
        let Some(item_id) = session.current_item_id else {
            return Ok(());
        };
        let Some(item) = self.repository.get_item(item_id).await? else {
            return Ok(());
        };
        let topic_id = session.topic_id.unwrap_or(item.concept_id);
        let inputs = self.load_policy_inputs(session.learner_id, topic_id).await?;
        self.trigger_precache(session.learner_id, session_id, &item, &inputs).await;
        Ok(())
    }

    /// Returns the session's current item, or `None` if the session has no
    /// current item (e.g. it has ended, or generation was exhausted).
    #[instrument(skip(self), fields(session_id))]
    pub async fn next(&self, session_id: &str) -> Result<Option<TurnView>> {
        let session = self
            .repository
            .get_session(session_id)
            .await?
            .ok_or_else(|| DomainError::SessionNotFound(session_id.to_string()))?;
        let Some(item_id) = session.current_item_id else {
            return Ok(None);
        };
        let item = self.repository.get_item(item_id).await?;
        Ok(item.as_ref().map(TurnView::from))
    }

    /// Ends the session and clears any outstanding pre-cache entries for
    /// it.
    #[instrument(skip(self), fields(session_id))]
    pub async fn end(&self, session_id: &str) -> Result<SessionTotals> {
        let session = self
            .repository
            .get_session(session_id)
            .await?
            .ok_or_else(|| DomainError::SessionNotFound(session_id.to_string()))?;
        let totals = self.repository.end_session(session_id).await?;
        self.precache.clear_session(session.learner_id, session_id);
        Ok(totals)
    }
}

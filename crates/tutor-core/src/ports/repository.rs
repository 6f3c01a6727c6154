use crate::domain::{Attempt, Concept, EnrichedAttempt, Item, Learner, Session, SessionTotals, SkillHistorySnapshot, SkillState};
use anyhow::Result;
use async_trait::async_trait;

/// The storage collaborator. The core never speaks SQL — it sees only this
/// contract. Implementations must guarantee that `skill.upsert` excludes
/// concurrent writers to the same `(learner_id, concept_id)` row and that
/// `insert_attempt_with_skill_update` commits the attempt, skill state, and
/// skill-history rows as a single transaction.
#[async_trait]
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait Repository: Send + Sync {
    async fn create_or_get_learner(&self, name: &str) -> Result<Learner>;

    async fn list_concepts_by_topic(&self, topic_id: i64) -> Result<Vec<Concept>>;
    async fn get_concept(&self, concept_id: i64) -> Result<Option<Concept>>;

    /// Returns the default skill row (per `TutorConfig`'s initial values)
    /// when the learner has no attempts yet on this concept.
    async fn get_skill(&self, learner_id: i64, concept_id: i64) -> Result<SkillState>;

    async fn insert_item(&self, item: Item) -> Result<i64>;
    async fn get_item(&self, item_id: i64) -> Result<Option<Item>>;

    /// Atomically inserts the attempt, upserts the skill state, and inserts
    /// a skill-history snapshot linked to the attempt. All three or none.
    /// Returns `(attempt_id, skill_history_id)`.
    async fn insert_attempt_with_skill_update(
        &self,
        attempt: Attempt,
        updated_skill: SkillState,
        history: SkillHistorySnapshot,
    ) -> Result<(i64, i64)>;

    /// Up to `limit` most recent attempts for the learner, newest first,
    /// joined with the fields of the item each was attempted against.
    async fn recent_enriched_attempts(&self, learner_id: i64, limit: usize) -> Result<Vec<EnrichedAttempt>>;

    /// Normalized question text of every item the learner has ever answered
    /// correctly, across all sessions — the lifetime dedup source.
    async fn correct_texts(&self, learner_id: i64) -> Result<std::collections::HashSet<String>>;

    /// Normalized question text of every item shown in this session so far,
    /// including the current unanswered one.
    async fn session_texts(&self, session_id: &str) -> Result<std::collections::HashSet<String>>;

    async fn create_session(&self, learner_id: i64, topic_id: Option<i64>) -> Result<Session>;
    async fn get_session(&self, session_id: &str) -> Result<Option<Session>>;
    async fn set_session_current_item(&self, session_id: &str, item_id: i64, last_result_blob: Option<String>) -> Result<()>;
    async fn end_session(&self, session_id: &str) -> Result<SessionTotals>;
}

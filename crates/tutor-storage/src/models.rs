//! Database row types: a plain `FromRow` struct per table, with timestamps
//! stored as epoch milliseconds and decoded into `chrono::DateTime<Utc>` at
//! the repository boundary rather than in these rows.

use sqlx::FromRow;

#[derive(Debug, Clone, FromRow)]
pub struct LearnerRow {
    pub id: i64,
    pub name: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, FromRow)]
pub struct ConceptRow {
    pub id: i64,
    pub topic_id: i64,
    pub name: String,
    pub description: String,
    pub order_index: i64,
    pub prerequisites: String,
    pub mastery_threshold: f64,
    pub visual_required: i64,
}

#[derive(Debug, Clone, FromRow)]
pub struct SkillStateRow {
    pub learner_id: i64,
    pub concept_id: i64,
    pub rating: f64,
    pub uncertainty: f64,
    pub total_attempts: i64,
    pub correct_attempts: i64,
    pub last_updated: i64,
}

#[derive(Debug, Clone, FromRow)]
pub struct ItemRow {
    pub id: i64,
    pub concept_id: i64,
    pub content: String,
    pub item_type: String,
    pub options: Option<String>,
    pub correct_answer: String,
    pub explanation: Option<String>,
    pub difficulty: f64,
    pub estimated_p_correct: f64,
    pub prompt_used: Option<String>,
    pub model_used: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Clone, FromRow)]
pub struct SessionRow {
    pub id: String,
    pub learner_id: i64,
    pub topic_id: Option<i64>,
    pub started_at: i64,
    pub ended_at: Option<i64>,
    pub current_item_id: Option<i64>,
    pub last_result_blob: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct AttemptRow {
    pub id: i64,
    pub item_id: i64,
    pub learner_id: i64,
    pub session_id: Option<String>,
    pub concept_id: i64,
    pub answer_given: Option<String>,
    pub is_correct: i64,
    pub partial_score: Option<f64>,
    pub response_time_s: Option<f64>,
    pub rating_before: f64,
    pub rating_after: f64,
    pub timestamp: i64,
}

/// An attempt row joined with the item it targeted — the flat shape
/// `recent_enriched_attempts` selects, since sqlx's tuple `FromRow` impls
/// don't nest a struct inside a tuple alongside extra scalar columns.
#[derive(Debug, Clone, FromRow)]
pub struct EnrichedAttemptRow {
    pub id: i64,
    pub item_id: i64,
    pub learner_id: i64,
    pub session_id: Option<String>,
    pub concept_id: i64,
    pub answer_given: Option<String>,
    pub is_correct: i64,
    pub partial_score: Option<f64>,
    pub response_time_s: Option<f64>,
    pub rating_before: f64,
    pub rating_after: f64,
    pub timestamp: i64,
    pub item_content: String,
    pub item_type: String,
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ===== Learner =====

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Learner {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

// ===== Concept =====

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Concept {
    pub id: i64,
    pub topic_id: i64,
    pub name: String,
    pub description: String,
    pub order_index: i32,
    pub prerequisites: Vec<i64>,
    pub mastery_threshold: f64,
    pub visual_required: bool,
}

impl Concept {
    pub fn default_mastery_threshold() -> f64 {
        0.75
    }
}

// ===== SkillState =====

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillState {
    pub learner_id: i64,
    pub concept_id: i64,
    pub rating: f64,
    pub uncertainty: f64,
    pub total_attempts: u32,
    pub correct_attempts: u32,
    pub last_updated: DateTime<Utc>,
}

impl SkillState {
    /// A skill row that has never been attempted. Semantically equal to an
    /// absent row per the repository contract.
    pub fn default_for(learner_id: i64, concept_id: i64, initial_rating: f64, initial_uncertainty: f64) -> Self {
        Self {
            learner_id,
            concept_id,
            rating: initial_rating,
            uncertainty: initial_uncertainty,
            total_attempts: 0,
            correct_attempts: 0,
            last_updated: Utc::now(),
        }
    }
}

// ===== Item =====

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    Mcq,
    ShortAnswer,
    Problem,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: i64,
    pub concept_id: i64,
    pub content: String,
    #[serde(rename = "type")]
    pub item_type: ItemType,
    pub options: Option<Vec<String>>,
    pub correct_answer: String,
    pub explanation: Option<String>,
    pub difficulty: f64,
    pub estimated_p_correct: f64,
    pub prompt_used: Option<String>,
    pub model_used: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Item {
    /// Resolves `correct_answer` to an option index for mcq items, trying
    /// letter (A-D), then text match after letter-prefix strip. Per spec
    /// these are the only two resolution modes — a bare numeral answer is
    /// never treated as an array index, since it may itself be the correct
    /// option *text* (e.g. `correct_answer: "1"` meaning the choice whose
    /// text is "1", not "the option at index 1").
    pub fn resolve_mcq_index(&self) -> Option<usize> {
        let options = self.options.as_ref()?;
        let answer = self.correct_answer.trim();

        if answer.len() == 1 {
            if let Some(letter) = answer.chars().next() {
                if let Some(idx) = letter_to_index(letter) {
                    if idx < options.len() {
                        return Some(idx);
                    }
                }
            }
        }

        let normalized_answer = strip_letter_prefix(answer).to_lowercase();
        options
            .iter()
            .position(|opt| strip_letter_prefix(opt).to_lowercase() == normalized_answer)
    }
}

pub fn letter_to_index(letter: char) -> Option<usize> {
    let upper = letter.to_ascii_uppercase();
    if ('A'..='D').contains(&upper) {
        Some((upper as u8 - b'A') as usize)
    } else {
        None
    }
}

pub fn index_to_letter(index: usize) -> Option<char> {
    if index < 4 {
        Some((b'A' + index as u8) as char)
    } else {
        None
    }
}

/// Strips a leading `"A) "`/`"A. "`/`"A: "`-style letter prefix, if present.
pub fn strip_letter_prefix(text: &str) -> String {
    let trimmed = text.trim();
    let mut chars = trimmed.chars();
    if let Some(first) = chars.next() {
        if first.is_ascii_alphabetic() {
            let rest: String = chars.clone().collect();
            if let Some(rest2) = rest.strip_prefix(')').or_else(|| rest.strip_prefix('.')).or_else(|| rest.strip_prefix(':')) {
                return rest2.trim().to_string();
            }
        }
    }
    trimmed.to_string()
}

// ===== Attempt =====

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attempt {
    pub id: i64,
    pub item_id: i64,
    pub learner_id: i64,
    pub session_id: Option<String>,
    pub concept_id: i64,
    pub answer_given: Option<String>,
    pub is_correct: bool,
    pub partial_score: Option<f64>,
    pub response_time_s: Option<f64>,
    pub rating_before: f64,
    pub rating_after: f64,
    pub timestamp: DateTime<Utc>,
}

/// An attempt row joined with the fields of the item it was attempted
/// against — the shape `attempt.recent_enriched` returns.
#[derive(Debug, Clone)]
pub struct EnrichedAttempt {
    pub attempt: Attempt,
    pub item_content: String,
    pub item_type: ItemType,
}

// ===== Session =====

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub learner_id: i64,
    pub topic_id: Option<i64>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub current_item_id: Option<i64>,
    pub last_result_blob: Option<String>,
}

impl Session {
    pub fn is_active(&self) -> bool {
        self.ended_at.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SessionTotals {
    pub items_attempted: u32,
    pub items_correct: u32,
}

// ===== SkillHistory =====

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillHistorySnapshot {
    pub id: i64,
    pub attempt_id: i64,
    pub learner_id: i64,
    pub concept_id: i64,
    pub rating: f64,
    pub uncertainty: f64,
    pub recorded_at: DateTime<Utc>,
}

//! Generation pipeline — LLM-driven item generation with
//! defensive parsing, local-generator bypass, dedup + validator gating, and
//! retry, followed by a placeholder-distractor replacement pass for MCQ.

pub mod local_generators;

use crate::config::TutorConfig;
use crate::dedup::{DedupRegistry, DedupVerdict};
use crate::domain::{index_to_letter, Concept, Item, ItemType};
use crate::estimator;
use crate::ports::llm_client::{self, ChatResponse};
use crate::ports::LlmClient;
use crate::validator::{self, ValidationOutcome};
use chrono::Utc;
use std::time::Duration;

const GENERATION_TEMPERATURE: f32 = 0.8;
const GENERATION_TIMEOUT: Duration = Duration::from_secs(120);
const DISTRACTOR_TEMPERATURE: f32 = 0.7;
const MAX_ANSWER_LEN: usize = 200;

/// An item draft before it has been assigned an id or persisted.
#[derive(Debug, Clone)]
pub struct GeneratedDraft {
    pub content: String,
    pub item_type: ItemType,
    pub options: Option<Vec<String>>,
    pub correct_answer: String,
    pub explanation: Option<String>,
}

/// Item-type band by current mastery: low mastery gets scaffolded MCQ,
/// mid mastery gets short-answer recall, high mastery gets open-ended
/// problems.
pub fn item_type_for_mastery(mastery: f64) -> ItemType {
    if mastery < 0.3 {
        ItemType::Mcq
    } else if mastery < 0.6 {
        ItemType::ShortAnswer
    } else {
        ItemType::Problem
    }
}

pub fn target_difficulty_for(skill_rating: f64, config: &TutorConfig) -> f64 {
    estimator::target_difficulty(skill_rating, config.target_success_rate, config.elo_scale_factor)
}

/// Strips control characters, caps length, and removes any embedded HTML
/// tag or code fence — the mitigation the placeholder-distractor design
/// note calls for instead of a two-phase validator.
fn sanitize_correct_answer(raw: &str) -> String {
    let no_control: String = raw.chars().filter(|c| !c.is_control() || *c == ' ').collect();
    let no_html = no_control.replace("</", " ").replace("```", " ");
    no_html.chars().take(MAX_ANSWER_LEN).collect::<String>().trim().to_string()
}

fn build_placeholder_options(correct_answer: &str) -> Vec<String> {
    let sanitized_correct = sanitize_correct_answer(correct_answer);
    vec![
        sanitized_correct,
        "a different value".to_string(),
        "another possibility".to_string(),
        "a further option".to_string(),
    ]
}

fn build_generation_prompt(concept: &Concept, item_type: ItemType, target_difficulty: f64, dedup: &DedupRegistry) -> String {
    let type_label = match item_type {
        ItemType::Mcq => "a multiple-choice question with exactly one correct answer",
        ItemType::ShortAnswer => "a short-answer question with a single unambiguous correct answer",
        ItemType::Problem => "an open-ended problem requiring a worked solution",
    };
    let avoid = dedup.prompt_hints().join("; ");
    format!(
        "Write {type_label} for the concept \"{}\" ({}).\n\
         Target difficulty rating: {:.0}.\n\
         Do not repeat any of these previously used questions: {avoid}\n\
         Respond as a JSON object with fields: question, correct_answer, explanation\
         {}.",
        concept.name,
        concept.description,
        target_difficulty,
        if item_type == ItemType::Mcq { ", options (array, position of the correct answer unspecified)" } else { "" },
    )
}

fn parse_draft(response: &ChatResponse, item_type: ItemType) -> Option<GeneratedDraft> {
    let value = llm_client::parse_object(&response.text)?;
    let content = value.get("question")?.as_str()?.to_string();
    let correct_answer = value.get("correct_answer")?.as_str()?.to_string();
    let explanation = value.get("explanation").and_then(|v| v.as_str()).map(String::from);
    let options = value
        .get("options")
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(String::from)).collect());

    Some(GeneratedDraft {
        content,
        item_type,
        options,
        correct_answer,
        explanation,
    })
}

fn draft_to_item(
    draft: GeneratedDraft,
    concept: &Concept,
    target_difficulty: f64,
    skill_rating: f64,
    elo_scale_factor: f64,
    prompt: &str,
    model_name: &str,
) -> Item {
    let (options, correct_answer) = match (draft.item_type, draft.options) {
        (ItemType::Mcq, Some(opts)) if !opts.is_empty() => {
            // Reuse the draft's own ordering: first entry is the correct
            // answer by convention from `parse_draft`/local generators.
            let letter = index_to_letter(0).unwrap_or('A');
            (Some(opts), letter.to_string())
        }
        (ItemType::Mcq, _) => {
            let opts = build_placeholder_options(&draft.correct_answer);
            (Some(opts), "A".to_string())
        }
        _ => (None, sanitize_correct_answer(&draft.correct_answer)),
    };

    Item {
        id: 0,
        concept_id: concept.id,
        content: draft.content,
        item_type: draft.item_type,
        options,
        correct_answer,
        explanation: draft.explanation,
        difficulty: target_difficulty,
        estimated_p_correct: estimator::probability(skill_rating, target_difficulty, elo_scale_factor),
        prompt_used: Some(prompt.to_string()),
        model_used: Some(model_name.to_string()),
        created_at: Utc::now(),
    }
}

async fn request_llm_draft(
    concept: &Concept,
    item_type: ItemType,
    target_difficulty: f64,
    dedup: &DedupRegistry,
    llm: &dyn LlmClient,
) -> Option<(GeneratedDraft, String, String)> {
    let prompt = build_generation_prompt(concept, item_type, target_difficulty, dedup);
    let response = llm
        .chat(&prompt, GENERATION_TEMPERATURE, false, GENERATION_TIMEOUT)
        .await
        .ok()?;
    let draft = parse_draft(&response, item_type)?;
    Some((draft, prompt, response.model_name))
}

async fn generate_distractors(item: &Item, llm: &dyn LlmClient) -> Option<Vec<String>> {
    let prompt = format!(
        "Write exactly 3 plausible but incorrect answer choices (distractors) for this question.\n\
         Question: {}\n\
         Correct answer: {}\n\
         Respond as a JSON object: {{\"distractors\": [\"...\", \"...\", \"...\"]}}",
        item.content, item.correct_answer
    );
    let response = llm
        .chat(&prompt, DISTRACTOR_TEMPERATURE, false, GENERATION_TIMEOUT)
        .await
        .ok()?;
    let value = llm_client::parse_object(&response.text)?;
    let arr = value.get("distractors")?.as_array()?;
    let distractors: Vec<String> = arr.iter().filter_map(|v| v.as_str().map(String::from)).collect();
    if distractors.len() >= 3 {
        Some(distractors.into_iter().take(3).collect())
    } else {
        None
    }
}

/// Runs the full pipeline: local-generator bypass, else LLM draft, gated by
/// dedup and the 17-rule validator, retried up to
/// `config.max_generation_attempts` times. On acceptance of an MCQ item,
/// makes one best-effort pass to replace placeholder distractors with
/// LLM-generated ones; keeps the placeholder-bearing item if that pass
/// fails or would break validation.
pub async fn generate_item(
    concept: &Concept,
    target_difficulty: f64,
    skill_rating: f64,
    item_type: ItemType,
    dedup: &DedupRegistry,
    llm: &dyn LlmClient,
    config: &TutorConfig,
) -> Option<Item> {
    for _attempt in 1..=config.max_generation_attempts {
        let (draft, prompt, model_name) =
            if let Some(local) = local_generators::try_generate(&concept.name, item_type, target_difficulty) {
                (local, "local-generator".to_string(), "local-generator".to_string())
            } else if let Some(result) = request_llm_draft(concept, item_type, target_difficulty, dedup, llm).await {
                result
            } else {
                continue;
            };

        if dedup.check(&draft.content) != DedupVerdict::Accept {
            continue;
        }

        let mut item = draft_to_item(
            draft,
            concept,
            target_difficulty,
            skill_rating,
            config.elo_scale_factor,
            &prompt,
            &model_name,
        );

        if validator::validate(&item) != ValidationOutcome::Accepted {
            continue;
        }

        if item.item_type == ItemType::Mcq {
            if let Some(distractors) = generate_distractors(&item, llm).await {
                let mut options = vec![item.options.as_ref().unwrap()[0].clone()];
                options.extend(distractors);
                let candidate = Item {
                    options: Some(options),
                    ..item.clone()
                };
                if validator::validate(&candidate) == ValidationOutcome::Accepted {
                    item = candidate;
                }
            }
        }

        return Some(item);
    }
    None
}

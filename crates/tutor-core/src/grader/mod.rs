//! Answer grader — normalization/tolerance/containment for MCQ
//! and short-answer items; an LLM judge with local-exact-match fallback for
//! open-ended `problem` items.

use crate::domain::{strip_letter_prefix, Item, ItemType};
use crate::ports::llm_client::{self, ChatResponse};
use crate::ports::LlmClient;
use std::time::Duration;

const NUMERIC_TOLERANCE: f64 = 1e-6;
const CONTAINMENT_LEN_RATIO: f64 = 0.8;
const CLOSE_CHAR_OVERLAP: f64 = 0.70;
const GRADER_TEMPERATURE: f32 = 0.3;
const GRADER_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq)]
pub struct GradeResult {
    pub is_correct: bool,
    /// True when the answer missed but was close enough to be worth
    /// flagging distinctly from a wholesale wrong answer (near-miss
    /// numeric tolerance or high text overlap).
    pub is_close: bool,
    /// Partial credit in `[0, 1]`, only ever set by the LLM judge for
    /// `problem` items — local grading is all-or-nothing.
    pub partial_score: Option<f64>,
    /// Judge-authored feedback text, only ever set by the LLM judge.
    pub feedback: Option<String>,
}

impl GradeResult {
    fn correct() -> Self {
        Self { is_correct: true, is_close: true, partial_score: None, feedback: None }
    }
    fn close() -> Self {
        Self { is_correct: false, is_close: true, partial_score: None, feedback: None }
    }
    fn wrong() -> Self {
        Self { is_correct: false, is_close: false, partial_score: None, feedback: None }
    }
}

pub fn normalize_answer(text: &str) -> String {
    strip_letter_prefix(text)
        .trim()
        .trim_end_matches(|c: char| ".!?,;:".contains(c))
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn numeric_match(given: &str, correct: &str) -> Option<bool> {
    let g: f64 = given.trim().parse().ok()?;
    let c: f64 = correct.trim().parse().ok()?;
    Some((g - c).abs() <= NUMERIC_TOLERANCE)
}

fn char_overlap_ratio(a: &str, b: &str) -> f64 {
    use std::collections::HashSet;
    let set_a: HashSet<char> = a.chars().filter(|c| !c.is_whitespace()).collect();
    let set_b: HashSet<char> = b.chars().filter(|c| !c.is_whitespace()).collect();
    if set_a.is_empty() || set_b.is_empty() {
        return 0.0;
    }
    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    intersection as f64 / union as f64
}

fn grade_mcq_local(item: &Item, given: &str) -> GradeResult {
    let Some(correct_idx) = item.resolve_mcq_index() else {
        return GradeResult::wrong();
    };
    let Some(options) = &item.options else {
        return GradeResult::wrong();
    };
    let given_idx = crate::domain::letter_to_index(given.trim().chars().next().unwrap_or(' '))
        .filter(|_| given.trim().len() == 1)
        .or_else(|| {
            let given_norm = normalize_answer(given);
            options
                .iter()
                .position(|o| normalize_answer(o) == given_norm)
        });

    match given_idx {
        Some(idx) if idx == correct_idx => GradeResult::correct(),
        _ => GradeResult::wrong(),
    }
}

fn grade_short_answer_local(item: &Item, given: &str) -> GradeResult {
    let given_norm = normalize_answer(given);
    let correct_norm = normalize_answer(&item.correct_answer);

    if given_norm == correct_norm {
        return GradeResult::correct();
    }
    if let Some(equal) = numeric_match(&given_norm, &correct_norm) {
        return if equal { GradeResult::correct() } else { GradeResult::wrong() };
    }
    if !correct_norm.is_empty()
        && !given_norm.is_empty()
        && (given_norm.contains(&correct_norm) || correct_norm.contains(&given_norm))
    {
        let min_len = given_norm.len().min(correct_norm.len()) as f64;
        let max_len = given_norm.len().max(correct_norm.len()) as f64;
        if min_len / max_len > CONTAINMENT_LEN_RATIO {
            return GradeResult::correct();
        }
    }
    if char_overlap_ratio(&given_norm, &correct_norm) > CLOSE_CHAR_OVERLAP {
        return GradeResult::close();
    }
    GradeResult::wrong()
}

fn grade_local(item: &Item, given: &str) -> GradeResult {
    match item.item_type {
        ItemType::Mcq => grade_mcq_local(item, given),
        ItemType::ShortAnswer | ItemType::Problem => grade_short_answer_local(item, given),
    }
}

fn build_judge_prompt(item: &Item, given: &str) -> String {
    format!(
        "You are grading a student's answer to a tutoring problem.\n\
         Question: {}\n\
         Expected answer: {}\n\
         Student answer: {}\n\n\
         Reply with a JSON object: {{\"is_correct\": true|false, \"close\": true|false, \
         \"partial_score\": <number between 0 and 1>, \"feedback\": \"<short note for the student>\"}}",
        item.content, item.correct_answer, given
    )
}

fn parse_judge_verdict(response: &ChatResponse) -> Option<GradeResult> {
    let value = llm_client::parse_object(&response.text)?;
    let is_correct = value.get("is_correct")?.as_bool()?;
    let is_close = value.get("close").and_then(|v| v.as_bool()).unwrap_or(is_correct);
    let partial_score = value
        .get("partial_score")
        .and_then(|v| v.as_f64())
        .map(|s| s.clamp(0.0, 1.0));
    let feedback = value
        .get("feedback")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());
    Some(GradeResult { is_correct, is_close, partial_score, feedback })
}

/// Grades `given` against `item`. MCQ and short-answer items never touch
/// the LLM; `problem` items are judged by the LLM, falling back to local
/// exact-match grading on any client error or unparsable response.
pub async fn grade(item: &Item, given: &str, llm: &dyn LlmClient) -> GradeResult {
    if item.item_type != ItemType::Problem {
        return grade_local(item, given);
    }

    let prompt = build_judge_prompt(item, given);
    match llm.chat(&prompt, GRADER_TEMPERATURE, false, GRADER_TIMEOUT).await {
        Ok(response) => parse_judge_verdict(&response).unwrap_or_else(|| grade_local(item, given)),
        Err(_) => grade_local(item, given),
    }
}

//! Item validator — 17 rules applied to every candidate item
//! before acceptance. All must pass; the first failing rule is reported.

use crate::arithmetic::{self, VerifyOutcome};
use crate::domain::{strip_letter_prefix, Item, ItemType};

#[derive(Debug, Clone, PartialEq)]
pub enum RejectionReason {
    QuestionTooShort,
    EmptyOrBannedAnswer,
    DuplicateChoices,
    UnresolvedMcqAnswer,
    AnswerGivenAway,
    PlaceholderMarker,
    VisualContextPhrase,
    AnswerTooLong,
    HtmlOrCodeFence,
    TooFewOptions,
    LengthBiasedChoice,
    BannedChoice,
    BadQuestionForm,
    ArithmeticMismatch { computed: f64, claimed: f64 },
    ExplanationAnswerMismatch,
    ExplanationArithmeticError,
    VisualDiagramDescription,
    DrawImperative,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ValidationOutcome {
    Accepted,
    Rejected(RejectionReason),
}

const BANNED_ANSWERS: &[&str] = &["", "?", "...", "n/a", "none", "null"];
const PLACEHOLDER_MARKERS: &[&str] = &["[shows", "[image", "[picture", "[display", "[insert"];
const VISUAL_CONTEXT_PHRASES: &[&str] = &[
    "which is longer",
    "look at the picture",
    "use the graph",
    "the figure shows",
    "as shown in the diagram",
    "shown above",
];
const BANNED_CHOICES: &[&str] = &[
    "all of the above",
    "none of the above",
    "none of these",
    "both a and b",
];
const IMPERATIVE_VERBS: &[&str] = &[
    "solve", "calculate", "find", "compute", "simplify", "evaluate", "write",
];
const VISUAL_DIAGRAM_PHRASES: &[&str] = &[
    "open circle at",
    "shading to the right",
    "shading to the left",
    "closed circle at",
    "arrow pointing",
];
const DRAW_IMPERATIVES: &[&str] = &["draw", "graph the", "sketch"];
const EXCEPTION_PHRASES: &[&str] = &["what is", "what are", "which", "compare", "classify"];

fn normalize_choice(choice: &str) -> String {
    strip_letter_prefix(choice).to_lowercase()
}

fn has_html_or_code_fence(text: &str) -> bool {
    text.contains("</") || text.contains("```")
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    let lower = haystack.to_lowercase();
    needles.iter().any(|n| lower.contains(n))
}

fn is_math_or_classification_exception(question: &str) -> bool {
    let lower = question.to_lowercase();
    contains_any(&lower, EXCEPTION_PHRASES) || arithmetic::compute_answer(question).is_some()
}

pub fn validate(item: &Item) -> ValidationOutcome {
    use RejectionReason::*;

    // Rule 1
    if item.content.trim().chars().count() < 10 {
        return ValidationOutcome::Rejected(QuestionTooShort);
    }

    // Rule 2
    let answer_norm = item.correct_answer.trim().to_lowercase();
    if BANNED_ANSWERS.contains(&answer_norm.as_str()) {
        return ValidationOutcome::Rejected(EmptyOrBannedAnswer);
    }

    if item.item_type == ItemType::Mcq {
        let options = item.options.as_deref().unwrap_or(&[]);

        // Rule 9
        if options.len() < 3 {
            return ValidationOutcome::Rejected(TooFewOptions);
        }

        // Rule 3
        let mut normalized: Vec<String> = options.iter().map(|o| normalize_choice(o)).collect();
        normalized.sort();
        normalized.dedup();
        if normalized.len() != options.len() {
            return ValidationOutcome::Rejected(DuplicateChoices);
        }

        // Rule 4
        let Some(correct_idx) = item.resolve_mcq_index() else {
            return ValidationOutcome::Rejected(UnresolvedMcqAnswer);
        };

        // Rule 11
        for opt in options {
            let norm = normalize_choice(opt);
            if BANNED_CHOICES.iter().any(|b| norm == *b) {
                return ValidationOutcome::Rejected(BannedChoice);
            }
        }

        // Rule 10: length-bias
        let correct_text = normalize_choice(&options[correct_idx]);
        let distractor_lens: Vec<usize> = options
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != correct_idx)
            .map(|(_, o)| normalize_choice(o).chars().count())
            .collect();
        if !distractor_lens.is_empty() {
            let avg = distractor_lens.iter().sum::<usize>() as f64 / distractor_lens.len() as f64;
            let max_len = *distractor_lens.iter().max().unwrap();
            let correct_len = correct_text.chars().count();
            if correct_len as f64 >= 3.0 * avg && correct_len >= max_len + 15 {
                return ValidationOutcome::Rejected(LengthBiasedChoice);
            }
        }
    }

    // Rule 5
    let stripped_answer = strip_letter_prefix(&item.correct_answer);
    if !is_math_or_classification_exception(&item.content)
        && item.content.to_lowercase().contains(&stripped_answer.to_lowercase())
        && stripped_answer.len() > 1
    {
        return ValidationOutcome::Rejected(AnswerGivenAway);
    }

    // Rule 6
    if contains_any(&item.content, PLACEHOLDER_MARKERS) {
        return ValidationOutcome::Rejected(PlaceholderMarker);
    }

    // Rule 6b
    if contains_any(&item.content, VISUAL_CONTEXT_PHRASES) {
        return ValidationOutcome::Rejected(VisualContextPhrase);
    }

    // Rule 7
    if item.correct_answer.chars().count() > 200 {
        return ValidationOutcome::Rejected(AnswerTooLong);
    }

    // Rule 8
    if has_html_or_code_fence(&item.content) || has_html_or_code_fence(&item.correct_answer) {
        return ValidationOutcome::Rejected(HtmlOrCodeFence);
    }

    // Rule 12
    let trimmed = item.content.trim();
    let ends_properly = trimmed.ends_with('?') || trimmed.ends_with(':') || trimmed.ends_with('.');
    let has_blank = trimmed.contains("__");
    let lower = trimmed.to_lowercase();
    let starts_imperative = IMPERATIVE_VERBS.iter().any(|v| lower.starts_with(v));
    if !ends_properly && !has_blank && !starts_imperative {
        return ValidationOutcome::Rejected(BadQuestionForm);
    }

    // Rule 16
    if contains_any(&item.content, VISUAL_DIAGRAM_PHRASES) {
        return ValidationOutcome::Rejected(VisualDiagramDescription);
    }

    // Rule 17
    if DRAW_IMPERATIVES.iter().any(|v| lower.starts_with(v)) {
        return ValidationOutcome::Rejected(DrawImperative);
    }

    // Rule 13: arithmetic verification
    match arithmetic::verify(&item.content, &item.correct_answer, item.options.as_deref()) {
        VerifyOutcome::Mismatch { computed, claimed } => {
            return ValidationOutcome::Rejected(ArithmeticMismatch { computed, claimed })
        }
        VerifyOutcome::Match | VerifyOutcome::NotApplicable => {}
    }

    // Rule 14 + 15: explanation cross-checks
    if let Some(explanation) = &item.explanation {
        if let Some(reason) = check_explanation(explanation, &item.correct_answer, item.options.as_deref()) {
            return ValidationOutcome::Rejected(reason);
        }
    }

    ValidationOutcome::Accepted
}

fn final_numeric_result(explanation: &str) -> Option<f64> {
    let normalized = arithmetic::normalize_unicode_math(explanation);
    for marker in ["which is ", "to get ", "= "] {
        if let Some(pos) = normalized.rfind(marker) {
            let rest = &normalized[pos + marker.len()..];
            let digits: String = rest
                .chars()
                .take_while(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
                .collect();
            if let Ok(v) = digits.parse::<f64>() {
                return Some(v);
            }
        }
    }
    None
}

fn check_explanation(explanation: &str, claimed_answer: &str, options: Option<&[String]>) -> Option<RejectionReason> {
    // Rule 14
    if let Some(result) = final_numeric_result(explanation) {
        let claimed = resolve_numeric(claimed_answer, options)?;
        if (result - claimed).abs() >= 1e-9 {
            return Some(RejectionReason::ExplanationAnswerMismatch);
        }
    }

    // Rule 15: every `A op B = C` in the explanation must be correct.
    let normalized = arithmetic::normalize_unicode_math(explanation);
    for sub_expr in find_equations(&normalized) {
        if let Some((a, op, b, c)) = sub_expr {
            let computed = match op {
                '+' => a + b,
                '-' => a - b,
                '*' => a * b,
                '/' => a / b,
                _ => continue,
            };
            if (computed - c).abs() >= 1e-9 {
                return Some(RejectionReason::ExplanationArithmeticError);
            }
        }
    }

    None
}

fn resolve_numeric(declared: &str, options: Option<&[String]>) -> Option<f64> {
    let declared = declared.trim();
    if declared.len() == 1 {
        if let Some(opts) = options {
            if let Some(idx) = crate::domain::letter_to_index(declared.chars().next().unwrap()) {
                if let Some(opt) = opts.get(idx) {
                    return strip_letter_prefix(opt).trim().parse().ok();
                }
            }
        }
    }
    strip_letter_prefix(declared).trim().parse().ok()
}

type Equation = (f64, char, f64, f64);

fn find_equations(text: &str) -> Vec<Option<Equation>> {
    let mut out = Vec::new();
    let bytes: Vec<char> = text.chars().collect();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == '=' {
            let before: String = bytes[..i].iter().rev().take(40).collect::<String>().chars().rev().collect();
            let after: String = bytes[i + 1..].iter().take(20).collect();
            if let Some(eq) = parse_equation_around(&before, &after) {
                out.push(Some(eq));
            }
        }
        i += 1;
    }
    out
}

fn parse_equation_around(before: &str, after: &str) -> Option<Equation> {
    let expr_re = regex::Regex::new(r"(-?\d+(?:\.\d+)?)\s*([+\-*/])\s*(-?\d+(?:\.\d+)?)\s*$").ok()?;
    let caps = expr_re.captures(before)?;
    let a: f64 = caps[1].parse().ok()?;
    let op = caps[2].chars().next()?;
    let b: f64 = caps[3].parse().ok()?;

    let result_re = regex::Regex::new(r"^\s*(-?\d+(?:\.\d+)?)").ok()?;
    let rcaps = result_re.captures(after)?;
    let c: f64 = rcaps[1].parse().ok()?;

    Some((a, op, b, c))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn mcq_item(content: &str, options: Vec<&str>, correct: &str) -> Item {
        Item {
            id: 1,
            concept_id: 1,
            content: content.to_string(),
            item_type: ItemType::Mcq,
            options: Some(options.into_iter().map(String::from).collect()),
            correct_answer: correct.to_string(),
            explanation: None,
            difficulty: 800.0,
            estimated_p_correct: 0.8,
            prompt_used: None,
            model_used: None,
            created_at: Utc::now(),
        }
    }

    fn short_answer_item(content: &str, correct: &str) -> Item {
        Item {
            id: 1,
            concept_id: 1,
            content: content.to_string(),
            item_type: ItemType::ShortAnswer,
            options: None,
            correct_answer: correct.to_string(),
            explanation: None,
            difficulty: 800.0,
            estimated_p_correct: 0.8,
            prompt_used: None,
            model_used: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn accepts_well_formed_mcq() {
        let item = mcq_item(
            "What is 2 + 2?",
            vec!["A) 3", "B) 4", "C) 5", "D) 6"],
            "B",
        );
        assert_eq!(validate(&item), ValidationOutcome::Accepted);
    }

    #[test]
    fn rejects_short_question() {
        let item = short_answer_item("2+2?", "4");
        assert_eq!(validate(&item), ValidationOutcome::Rejected(RejectionReason::QuestionTooShort));
    }

    #[test]
    fn rejects_duplicate_choices() {
        let item = mcq_item("What is 2 + 2?", vec!["A) 4", "B) 4", "C) 5", "D) 6"], "A");
        assert_eq!(validate(&item), ValidationOutcome::Rejected(RejectionReason::DuplicateChoices));
    }

    #[test]
    fn rejects_too_few_options() {
        let item = mcq_item("What is 2 + 2?", vec!["A) 4", "B) 5"], "A");
        assert_eq!(validate(&item), ValidationOutcome::Rejected(RejectionReason::TooFewOptions));
    }

    #[test]
    fn rejects_banned_choice() {
        let item = mcq_item(
            "What is 2 + 2?",
            vec!["A) 4", "B) 5", "C) 6", "D) all of the above"],
            "A",
        );
        assert_eq!(validate(&item), ValidationOutcome::Rejected(RejectionReason::BannedChoice));
    }

    #[test]
    fn rejects_placeholder_marker() {
        let item = short_answer_item("What [shows] in the diagram?", "circle");
        assert_eq!(validate(&item), ValidationOutcome::Rejected(RejectionReason::PlaceholderMarker));
    }

    #[test]
    fn rejects_visual_context_phrase() {
        let item = short_answer_item("Look at the picture, what do you see?", "a dog");
        assert_eq!(validate(&item), ValidationOutcome::Rejected(RejectionReason::VisualContextPhrase));
    }

    #[test]
    fn allows_math_question_that_states_its_own_operands() {
        let item = short_answer_item("What is 86 - 43?", "43");
        assert_eq!(validate(&item), ValidationOutcome::Accepted);
    }

    #[test]
    fn rejects_arithmetic_mismatch_for_reversed_subtraction_phrasing() {
        let item = short_answer_item("What is 7 less than 15?", "9");
        assert_eq!(
            validate(&item),
            ValidationOutcome::Rejected(RejectionReason::ArithmeticMismatch {
                computed: 8.0,
                claimed: 9.0
            })
        );
    }

    #[test]
    fn rejects_explanation_answer_mismatch() {
        let mut item = short_answer_item("What is 4 + 5?", "9");
        item.explanation = Some("4 + 5 = 10, which is 10".to_string());
        assert_eq!(validate(&item), ValidationOutcome::Rejected(RejectionReason::ExplanationAnswerMismatch));
    }

    #[test]
    fn rejects_explanation_arithmetic_error() {
        let mut item = short_answer_item("What is 4 + 5?", "9");
        item.explanation = Some("First, 4 + 5 = 10, so the answer is 9.".to_string());
        assert_eq!(validate(&item), ValidationOutcome::Rejected(RejectionReason::ExplanationArithmeticError));
    }

    #[test]
    fn rejects_draw_imperative() {
        let item = short_answer_item("Draw a number line from 0 to 10.", "done");
        assert_eq!(validate(&item), ValidationOutcome::Rejected(RejectionReason::DrawImperative));
    }

    #[test]
    fn rejects_visual_diagram_description() {
        let item = short_answer_item("An open circle at 4, shading to the right.", "x > 4");
        assert_eq!(validate(&item), ValidationOutcome::Rejected(RejectionReason::VisualDiagramDescription));
    }

    #[test]
    fn rejects_length_biased_choice() {
        let item = mcq_item(
            "What is the capital of France?",
            vec![
                "A) Paris, the beautiful and historic capital city of the French Republic",
                "B) Rome",
                "C) Berlin",
                "D) Madrid",
            ],
            "A",
        );
        assert_eq!(validate(&item), ValidationOutcome::Rejected(RejectionReason::LengthBiasedChoice));
    }
}

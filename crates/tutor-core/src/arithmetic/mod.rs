//! Independent arithmetic verifier. Recomputes the answer to a
//! natural-language math question directly from its text, so the item
//! validator can reject items whose declared answer disagrees with what the
//! question actually says.

use once_cell::sync::Lazy;
use regex::Regex;

const TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VerifyOutcome {
    Match,
    Mismatch { computed: f64, claimed: f64 },
    /// No recognized pattern — rule 13 becomes a no-op.
    NotApplicable,
}

/// Maps `×`/`÷`/unicode dashes onto their ASCII equivalents so every
/// downstream regex can assume plain `+ - * /`.
pub fn normalize_unicode_math(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '×' => '*',
            '÷' => '/',
            '\u{2012}' | '\u{2013}' | '\u{2014}' | '\u{2212}' => '-',
            other => other,
        })
        .collect()
}

fn approx_eq(a: f64, b: f64) -> bool {
    if a.fract() == 0.0 && b.fract() == 0.0 {
        (a - b).abs() < 0.5
    } else {
        (a - b).abs() < TOLERANCE
    }
}

/// Independently computes the answer implied by `question`, if recognized.
pub fn compute_answer(question: &str) -> Option<f64> {
    let text = normalize_unicode_math(question);
    direct_expression(&text)
        .or_else(|| missing_number_equation(&text))
        .or_else(|| phrased_operation(&text))
        .or_else(|| reversed_phrasing(&text))
        .or_else(|| multi_step_chain(&text))
        .or_else(|| word_problem(&text))
}

/// Resolves `declared` to a numeric value, following an mcq letter through
/// `options` first if `declared` is a bare `A`-`D`.
fn resolve_declared(declared: &str, options: Option<&[String]>) -> Option<f64> {
    let declared = declared.trim();
    if declared.len() == 1 {
        if let Some(opts) = options {
            if let Some(idx) = crate::domain::letter_to_index(declared.chars().next().unwrap()) {
                if let Some(opt) = opts.get(idx) {
                    let stripped = crate::domain::strip_letter_prefix(opt);
                    return stripped.trim().parse::<f64>().ok();
                }
            }
        }
    }
    let stripped = crate::domain::strip_letter_prefix(declared);
    stripped.trim().parse::<f64>().ok()
}

/// Runs validator rule 13: independently verify `declared` against the
/// question text. `options` is passed only for mcq letter resolution.
pub fn verify(question: &str, declared: &str, options: Option<&[String]>) -> VerifyOutcome {
    let Some(computed) = compute_answer(question) else {
        return VerifyOutcome::NotApplicable;
    };
    let Some(claimed) = resolve_declared(declared, options) else {
        return VerifyOutcome::NotApplicable;
    };
    if approx_eq(computed, claimed) {
        VerifyOutcome::Match
    } else {
        VerifyOutcome::Mismatch { computed, claimed }
    }
}

fn num(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok()
}

static DIRECT_EXPR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(-?\d+(?:\.\d+)?)\s*([+\-*/])\s*(-?\d+(?:\.\d+)?)(?:\s*([+\-*/])\s*(-?\d+(?:\.\d+)?))?").unwrap()
});

fn apply_op(a: f64, op: char, b: f64) -> f64 {
    match op {
        '+' => a + b,
        '-' => a - b,
        '*' => a * b,
        '/' => a / b,
        _ => f64::NAN,
    }
}

/// `a op b [op2 c]`, left-to-right with `*`/`/` binding tighter than
/// `+`/`-` when both appear in a two-operator chain.
fn direct_expression(text: &str) -> Option<f64> {
    let caps = DIRECT_EXPR.captures(text)?;
    let a = num(&caps[1])?;
    let op1 = caps[2].chars().next()?;
    let b = num(&caps[3])?;

    match (caps.get(4), caps.get(5)) {
        (Some(op2), Some(c)) => {
            let op2 = op2.as_str().chars().next()?;
            let c = num(c.as_str())?;
            let is_high = |o: char| o == '*' || o == '/';
            if is_high(op1) && !is_high(op2) {
                Some(apply_op(apply_op(a, op1, b), op2, c))
            } else if !is_high(op1) && is_high(op2) {
                Some(apply_op(a, op1, apply_op(b, op2, c)))
            } else {
                Some(apply_op(apply_op(a, op1, b), op2, c))
            }
        }
        _ => Some(apply_op(a, op1, b)),
    }
}

static MISSING_NUMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(-?\d+(?:\.\d+)?|__)\s*([+\-*/])\s*(-?\d+(?:\.\d+)?|__)\s*=\s*(-?\d+(?:\.\d+)?|__)").unwrap()
});

fn missing_number_equation(text: &str) -> Option<f64> {
    let caps = MISSING_NUMBER.captures(text)?;
    let lhs1 = caps[1].trim();
    let op = caps[2].chars().next()?;
    let lhs2 = caps[3].trim();
    let rhs = caps[4].trim();

    let blanks = [lhs1 == "__", lhs2 == "__", rhs == "__"];
    if blanks.iter().filter(|b| **b).count() != 1 {
        return None;
    }

    if rhs == "__" {
        let a = num(lhs1)?;
        let b = num(lhs2)?;
        return Some(apply_op(a, op, b));
    }
    let c = num(rhs)?;
    if lhs1 == "__" {
        let b = num(lhs2)?;
        return Some(match op {
            '+' => c - b,
            '-' => c + b,
            '*' => c / b,
            '/' => c * b,
            _ => f64::NAN,
        });
    }
    if lhs2 == "__" {
        let a = num(lhs1)?;
        return Some(match op {
            '+' => c - a,
            '-' => a - c,
            '*' => c / a,
            '/' => a / c,
            _ => f64::NAN,
        });
    }
    None
}

static PHRASED_BINARY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(-?\d+(?:\.\d+)?)\s*(plus|minus|times|multiplied by|divided by)\s*(-?\d+(?:\.\d+)?)").unwrap()
});
static SUM_OF_TWO: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)sum of\s*(-?\d+(?:\.\d+)?)\s*and\s*(-?\d+(?:\.\d+)?)").unwrap());
static PRODUCT_OF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)product of\s*(-?\d+(?:\.\d+)?)\s*and\s*(-?\d+(?:\.\d+)?)").unwrap());
static SUM_OF_MANY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)sum of\s*((?:-?\d+(?:\.\d+)?\s*,\s*)+(?:and\s*)?-?\d+(?:\.\d+)?)").unwrap()
});

fn phrased_operation(text: &str) -> Option<f64> {
    if let Some(caps) = PHRASED_BINARY.captures(text) {
        let a = num(&caps[1])?;
        let b = num(&caps[3])?;
        return Some(match caps[2].to_lowercase().as_str() {
            "plus" => a + b,
            "minus" => a - b,
            "times" => a * b,
            "multiplied by" => a * b,
            "divided by" => a / b,
            _ => return None,
        });
    }
    if let Some(caps) = SUM_OF_MANY.captures(text) {
        let list = &caps[1];
        let total: f64 = list
            .split(',')
            .map(|part| part.trim().trim_start_matches("and").trim())
            .filter_map(num)
            .sum();
        return Some(total);
    }
    if let Some(caps) = SUM_OF_TWO.captures(text) {
        return Some(num(&caps[1])? + num(&caps[2])?);
    }
    if let Some(caps) = PRODUCT_OF.captures(text) {
        return Some(num(&caps[1])? * num(&caps[2])?);
    }
    None
}

static LESS_THAN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(-?\d+(?:\.\d+)?)\s*less than\s*(-?\d+(?:\.\d+)?)").unwrap());
static SUBTRACT_FROM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)subtract\s*(-?\d+(?:\.\d+)?)\s*from\s*(-?\d+(?:\.\d+)?)").unwrap());
static MORE_THAN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(-?\d+(?:\.\d+)?)\s*more than\s*(-?\d+(?:\.\d+)?)").unwrap());
static TIMES_REVERSED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(-?\d+(?:\.\d+)?)\s*times\s*(-?\d+(?:\.\d+)?)").unwrap());

/// `N less than M` -> M-N, `subtract N from M` -> M-N, `N more than M` ->
/// M+N, `N times M` -> N*M.
fn reversed_phrasing(text: &str) -> Option<f64> {
    if let Some(caps) = LESS_THAN.captures(text) {
        let n = num(&caps[1])?;
        let m = num(&caps[2])?;
        return Some(m - n);
    }
    if let Some(caps) = SUBTRACT_FROM.captures(text) {
        let n = num(&caps[1])?;
        let m = num(&caps[2])?;
        return Some(m - n);
    }
    if let Some(caps) = MORE_THAN.captures(text) {
        let n = num(&caps[1])?;
        let m = num(&caps[2])?;
        return Some(m + n);
    }
    if let Some(caps) = TIMES_REVERSED.captures(text) {
        let n = num(&caps[1])?;
        let m = num(&caps[2])?;
        return Some(n * m);
    }
    None
}

static MULTIPLY_THEN_DIVIDE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)multiplying\s*(-?\d+(?:\.\d+)?)\s*by\s*(-?\d+(?:\.\d+)?)\s*then\s*dividing by\s*(-?\d+(?:\.\d+)?)").unwrap()
});
static ADD_THEN_MULTIPLY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)adding\s*(-?\d+(?:\.\d+)?)\s*(?:and|to)\s*(-?\d+(?:\.\d+)?)\s*then\s*multiplying by\s*(-?\d+(?:\.\d+)?)").unwrap()
});

fn multi_step_chain(text: &str) -> Option<f64> {
    if let Some(caps) = MULTIPLY_THEN_DIVIDE.captures(text) {
        let a = num(&caps[1])?;
        let b = num(&caps[2])?;
        let c = num(&caps[3])?;
        return Some((a * b) / c);
    }
    if let Some(caps) = ADD_THEN_MULTIPLY.captures(text) {
        let a = num(&caps[1])?;
        let b = num(&caps[2])?;
        let c = num(&caps[3])?;
        return Some((a + b) * c);
    }
    None
}

const LOSES_VERBS: &[&str] = &[
    "eats", "gives", "loses", "spends", "uses", "breaks", "drops", "discards", "donates",
    "shares", "removes", "sells",
];
const GAINS_VERBS: &[&str] = &["gets", "finds", "bought", "received", "adds", "earns"];

static HAS_N: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)has\s*(-?\d+(?:\.\d+)?)").unwrap());
static THERE_ARE_N: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)there (?:are|were)\s*(-?\d+(?:\.\d+)?)").unwrap());
static TRAILING_M: Lazy<Regex> = Lazy::new(|| Regex::new(r"(-?\d+(?:\.\d+)?)").unwrap());

fn word_problem(text: &str) -> Option<f64> {
    let lower = text.to_lowercase();

    if let Some(caps) = HAS_N.captures(text) {
        let n = num(&caps[1])?;
        let rest = &text[caps.get(0)?.end()..];
        let rest_lower = rest.to_lowercase();

        if let Some(verb_pos) = LOSES_VERBS.iter().find_map(|v| rest_lower.find(v)) {
            if let Some(m) = TRAILING_M.find(&rest[verb_pos..]) {
                let m_val = num(m.as_str())?;
                return Some(n - m_val);
            }
        }
        if let Some(verb_pos) = GAINS_VERBS.iter().find_map(|v| rest_lower.find(v)) {
            if let Some(m) = TRAILING_M.find(&rest[verb_pos..]) {
                let m_val = num(m.as_str())?;
                return Some(n + m_val);
            }
        }
    }

    if let Some(caps) = THERE_ARE_N.captures(text) {
        let n = num(&caps[1])?;
        let rest = &lower[caps.get(0)?.end()..];
        if rest.contains("fly away") || rest.contains("left") || rest.contains("went home") {
            if let Some(m) = TRAILING_M.find(&text[caps.get(0)?.end()..]) {
                let m_val = num(m.as_str())?;
                return Some(n - m_val);
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_expression_with_unicode_operators() {
        assert_eq!(compute_answer("What is 86 × 2?"), Some(172.0));
        assert_eq!(compute_answer("What is 86 ÷ 2?"), Some(43.0));
    }

    #[test]
    fn direct_expression_with_precedence() {
        assert_eq!(compute_answer("Compute 2 + 3 * 4."), Some(14.0));
        assert_eq!(compute_answer("Compute 2 * 3 + 4."), Some(10.0));
    }

    #[test]
    fn missing_number_equation_solves_blank() {
        assert_eq!(compute_answer("5 + __ = 12"), Some(7.0));
        assert_eq!(compute_answer("__ + 5 = 12"), Some(7.0));
        assert_eq!(compute_answer("__ - 4 = 6"), Some(10.0));
    }

    #[test]
    fn phrased_operations() {
        assert_eq!(compute_answer("What is 6 plus 7?"), Some(13.0));
        assert_eq!(compute_answer("What is the sum of 3 and 4?"), Some(7.0));
        assert_eq!(compute_answer("What is the product of 3 and 4?"), Some(12.0));
        assert_eq!(compute_answer("Find the sum of 1, 2, and 3."), Some(6.0));
    }

    #[test]
    fn reversed_subtraction_phrasings_compute_matching_answers() {
        // "7 less than 15?" -> 8, not the claimed 9.
        assert_eq!(compute_answer("What is 7 less than 15?"), Some(8.0));
        assert_eq!(compute_answer("Subtract 7 from 15."), Some(8.0));
        assert_eq!(compute_answer("What is 3 more than 10?"), Some(13.0));
    }

    #[test]
    fn multi_step_chain() {
        assert_eq!(
            compute_answer("Start by multiplying 2 by 3 then dividing by 6."),
            Some(1.0)
        );
    }

    #[test]
    fn word_problem_losing_items() {
        assert_eq!(compute_answer("Sam has 10 apples and eats 3."), Some(7.0));
        assert_eq!(compute_answer("Maria has 8 marbles and loses 2."), Some(6.0));
    }

    #[test]
    fn word_problem_gaining_items() {
        assert_eq!(compute_answer("Sam has 10 apples and finds 3 more."), Some(13.0));
    }

    #[test]
    fn word_problem_fly_away() {
        assert_eq!(compute_answer("There are 9 birds and 4 fly away."), Some(5.0));
    }

    #[test]
    fn unrecognized_text_is_not_applicable() {
        assert_eq!(compute_answer("Describe the water cycle."), None);
    }

    #[test]
    fn verify_rejects_reversed_subtraction_mismatch() {
        let outcome = verify("What is 7 less than 15?", "9", None);
        assert_eq!(
            outcome,
            VerifyOutcome::Mismatch {
                computed: 8.0,
                claimed: 9.0
            }
        );
    }

    #[test]
    fn verify_resolves_mcq_letter_through_options() {
        let options = vec!["A) 6".to_string(), "B) 7".to_string(), "C) 8".to_string(), "D) 9".to_string()];
        let outcome = verify("What is 7 less than 15?", "C", Some(&options));
        assert_eq!(outcome, VerifyOutcome::Match);
    }

    #[test]
    fn verify_is_not_applicable_for_non_arithmetic_text() {
        assert_eq!(
            verify("Describe the water cycle.", "evaporation", None),
            VerifyOutcome::NotApplicable
        );
    }
}

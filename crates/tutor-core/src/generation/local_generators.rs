//! Local item generators that bypass the LLM entirely for concepts whose
//! items follow a rigid, enumerable template: clock reading and
//! number-line inequalities.

use super::GeneratedDraft;
use crate::domain::ItemType;
use rand::Rng;

/// Tries every known local generator against `concept_name`. Returns
/// `None` when no local generator matches, so the caller falls through to
/// LLM generation.
pub fn try_generate(concept_name: &str, item_type: ItemType, difficulty: f64) -> Option<GeneratedDraft> {
    let lower = concept_name.to_lowercase();
    if lower.contains("clock") || lower.contains("telling time") {
        return Some(generate_clock_reading(item_type, difficulty));
    }
    if lower.contains("number line") || lower.contains("inequality") {
        return Some(generate_number_line_inequality(item_type, difficulty));
    }
    None
}

fn generate_clock_reading(item_type: ItemType, difficulty: f64) -> GeneratedDraft {
    let mut rng = rand::thread_rng();
    let hour = rng.gen_range(1..=12);
    // Harder items use arbitrary 5-minute increments; easier ones stick to
    // quarter hours.
    let minute = if difficulty > 900.0 {
        rng.gen_range(0..12) * 5
    } else {
        *[0, 15, 30, 45].iter().nth(rng.gen_range(0..4)).unwrap()
    };

    let content = format!(
        "A clock's hour hand points just past {hour} and its minute hand points at the {minute}-minute mark. What time does it show?"
    );
    let correct_answer = format!("{hour}:{minute:02}");

    if item_type == ItemType::Mcq {
        let distractors = [
            format!("{}:{:02}", hour % 12 + 1, minute),
            format!("{hour}:{:02}", (minute + 15) % 60),
            format!("{}:{:02}", if hour == 1 { 12 } else { hour - 1 }, minute),
        ];
        let mut options: Vec<String> = vec![correct_answer.clone()];
        options.extend(distractors.iter().cloned());
        GeneratedDraft {
            content,
            item_type,
            options: Some(options),
            correct_answer: "A".to_string(),
            explanation: Some(format!("The hour hand near {hour} and minute hand at {minute} reads {correct_answer}.")),
        }
    } else {
        GeneratedDraft {
            content,
            item_type,
            options: None,
            correct_answer,
            explanation: None,
        }
    }
}

fn generate_number_line_inequality(item_type: ItemType, difficulty: f64) -> GeneratedDraft {
    let mut rng = rand::thread_rng();
    let threshold = rng.gen_range(-10..=10);
    let strict = difficulty > 900.0 || rng.gen_bool(0.5);
    let direction_is_greater = rng.gen_bool(0.5);

    let (symbol, word) = match (direction_is_greater, strict) {
        (true, true) => (">", "greater than"),
        (true, false) => ("\u{2265}", "at least"),
        (false, true) => ("<", "less than"),
        (false, false) => ("\u{2264}", "at most"),
    };

    let content = format!(
        "A number line shows all values {word} {threshold}. Which inequality describes the shaded region?"
    );
    let correct_answer = format!("x {symbol} {threshold}");

    if item_type == ItemType::Mcq {
        let opposite_symbol = match symbol {
            ">" => "<",
            "\u{2265}" => "\u{2264}",
            "<" => ">",
            _ => "\u{2265}",
        };
        let options = vec![
            correct_answer.clone(),
            format!("x {opposite_symbol} {threshold}"),
            format!("x {symbol} {}", threshold + 1),
            format!("x = {threshold}"),
        ];
        GeneratedDraft {
            content,
            item_type,
            options: Some(options),
            correct_answer: "A".to_string(),
            explanation: None,
        }
    } else {
        GeneratedDraft {
            content,
            item_type,
            options: None,
            correct_answer,
            explanation: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_concept_produces_clock_item() {
        let draft = try_generate("Telling Time: Clocks", ItemType::ShortAnswer, 800.0).unwrap();
        assert!(draft.content.contains("clock"));
        assert!(draft.correct_answer.contains(':'));
    }

    #[test]
    fn number_line_concept_produces_inequality_item() {
        let draft = try_generate("Number Line Inequalities", ItemType::Mcq, 800.0).unwrap();
        assert!(draft.content.contains("number line"));
        assert_eq!(draft.correct_answer, "A");
        assert_eq!(draft.options.unwrap().len(), 4);
    }

    #[test]
    fn unrecognized_concept_returns_none() {
        assert!(try_generate("Long Division", ItemType::ShortAnswer, 800.0).is_none());
    }
}

//! Policy engine — priority-ordered focus-concept selection
//! with prerequisite fallback and variety scoring.

use crate::config::TutorConfig;
use crate::domain::{Concept, EnrichedAttempt, SkillState};
use crate::estimator;
use std::collections::HashMap;

const VARIETY_RECENCY_PENALTY: f64 = 0.15;
const VARIETY_VIRGIN_BONUS: f64 = 0.10;
const SOFT_PREREQ_MIN_ATTEMPTS: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    Improving,
    Declining,
    Stable,
}

#[derive(Debug, Clone)]
pub struct RecentAnalysis {
    pub overall_accuracy: f64,
    pub per_concept_accuracy: HashMap<i64, f64>,
    pub per_concept_attempts: HashMap<i64, u32>,
    pub trend: Trend,
    pub last_practiced_concept_id: Option<i64>,
}

/// Analyzes up to `config.recent_window` most recent attempts (newest
/// first, as returned by `Repository::recent_enriched_attempts`).
pub fn analyze_recent(attempts: &[EnrichedAttempt], config: &TutorConfig) -> RecentAnalysis {
    let window = &attempts[..attempts.len().min(config.recent_window)];

    let last_practiced_concept_id = window.first().map(|a| a.attempt.concept_id);

    let mut per_concept_correct: HashMap<i64, u32> = HashMap::new();
    let mut per_concept_attempts: HashMap<i64, u32> = HashMap::new();
    let mut total_correct = 0u32;

    for enriched in window {
        let c = enriched.attempt.concept_id;
        *per_concept_attempts.entry(c).or_insert(0) += 1;
        if enriched.attempt.is_correct {
            *per_concept_correct.entry(c).or_insert(0) += 1;
            total_correct += 1;
        }
    }

    let overall_accuracy = if window.is_empty() {
        0.0
    } else {
        total_correct as f64 / window.len() as f64
    };

    let per_concept_accuracy: HashMap<i64, f64> = per_concept_attempts
        .iter()
        .map(|(c, total)| {
            let correct = per_concept_correct.get(c).copied().unwrap_or(0);
            (*c, correct as f64 / *total as f64)
        })
        .collect();

    let trend = compute_trend(window);

    RecentAnalysis {
        overall_accuracy,
        per_concept_accuracy,
        per_concept_attempts,
        trend,
        last_practiced_concept_id,
    }
}

/// Splits the window (oldest-to-newest) in half and compares accuracy.
/// Requires at least 6 attempts with 3 per half; >10pp difference flips the
/// trend, otherwise "stable".
fn compute_trend(window_newest_first: &[EnrichedAttempt]) -> Trend {
    if window_newest_first.len() < 6 {
        return Trend::Stable;
    }
    let chronological: Vec<&EnrichedAttempt> = window_newest_first.iter().rev().collect();
    let mid = chronological.len() / 2;
    let (first_half, second_half) = chronological.split_at(mid);
    if first_half.len() < 3 || second_half.len() < 3 {
        return Trend::Stable;
    }

    let acc = |half: &[&EnrichedAttempt]| {
        let correct = half.iter().filter(|a| a.attempt.is_correct).count();
        correct as f64 / half.len() as f64
    };

    let diff = acc(second_half) - acc(first_half);
    if diff > 0.10 {
        Trend::Improving
    } else if diff < -0.10 {
        Trend::Declining
    } else {
        Trend::Stable
    }
}

fn recent_accuracy_for(analysis: &RecentAnalysis, concept_id: i64) -> Option<f64> {
    analysis.per_concept_accuracy.get(&concept_id).copied()
}

fn is_mastered(concept: &Concept, skill: &SkillState, recent_accuracy: f64) -> bool {
    estimator::is_mastered(skill.rating, recent_accuracy, concept.mastery_threshold)
}

fn prereqs_satisfied(concept: &Concept, attempt_counts: &HashMap<i64, u32>) -> bool {
    concept
        .prerequisites
        .iter()
        .all(|p| attempt_counts.get(p).copied().unwrap_or(0) >= SOFT_PREREQ_MIN_ATTEMPTS)
}

fn mastery_value(skill: &SkillState, recent_accuracy: f64) -> f64 {
    estimator::mastery(skill.rating, recent_accuracy)
}

/// Selects the next focus concept among `concepts` (already filtered to one
/// topic). `skills` and `lifetime_attempt_counts` must cover every concept
/// id (use `SkillState::default_for` / 0 for untouched concepts).
pub fn select_focus_concept(
    concepts: &[Concept],
    skills: &HashMap<i64, SkillState>,
    lifetime_attempt_counts: &HashMap<i64, u32>,
    analysis: &RecentAnalysis,
    current_concept_id: Option<i64>,
) -> Option<i64> {
    let available: Vec<&Concept> = concepts
        .iter()
        .filter(|c| !c.visual_required && prereqs_satisfied(c, lifetime_attempt_counts))
        .collect();

    if available.is_empty() {
        return None;
    }

    let skill_of = |id: i64| -> SkillState {
        skills
            .get(&id)
            .cloned()
            .unwrap_or_else(|| SkillState::default_for(0, id, 800.0, 350.0))
    };
    let recent_acc_of = |id: i64| -> f64 { recent_accuracy_for(analysis, id).unwrap_or(0.0) };

    // Rule 1-3: current concept exists and is available.
    if let Some(cur_id) = current_concept_id {
        if let Some(cur) = available.iter().find(|c| c.id == cur_id) {
            let skill = skill_of(cur_id);
            let mastered = is_mastered(cur, &skill, recent_acc_of(cur_id));
            if let Some(acc) = recent_accuracy_for(analysis, cur_id) {
                if (0.60..=0.90).contains(&acc) && !mastered {
                    // Rule 1: stay.
                    return Some(cur_id);
                }
                if acc < 0.60 {
                    // Rule 2: first unmastered prerequisite, by id order.
                    let mut prereqs: Vec<i64> = cur.prerequisites.clone();
                    prereqs.sort();
                    for prereq_id in prereqs {
                        if let Some(prereq) = available.iter().find(|c| c.id == prereq_id) {
                            let pskill = skill_of(prereq_id);
                            if !is_mastered(prereq, &pskill, recent_acc_of(prereq_id)) {
                                return Some(prereq_id);
                            }
                        }
                    }
                }
                if mastered || acc > 0.90 {
                    // Rule 3: advance to next unmastered by order_index.
                    let mut ordered: Vec<&&Concept> = available.iter().filter(|c| c.id != cur_id).collect();
                    ordered.sort_by_key(|c| c.order_index);
                    for candidate in ordered {
                        let cskill = skill_of(candidate.id);
                        if !is_mastered(candidate, &cskill, recent_acc_of(candidate.id)) {
                            return Some(candidate.id);
                        }
                    }
                }
            }
        }
    }

    // Rule 4: among unmastered concepts with recent attempts, weakest first.
    let mut attempted_unmastered: Vec<(&&Concept, f64)> = available
        .iter()
        .filter_map(|c| {
            let acc = recent_accuracy_for(analysis, c.id)?;
            let skill = skill_of(c.id);
            if is_mastered(c, &skill, acc) {
                None
            } else {
                Some((c, acc))
            }
        })
        .collect();
    if !attempted_unmastered.is_empty() {
        attempted_unmastered.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap());
        let weakest_acc = attempted_unmastered[0].1;
        let tied: Vec<i64> = attempted_unmastered
            .iter()
            .filter(|(_, acc)| (*acc - weakest_acc).abs() < 1e-9)
            .map(|(c, _)| c.id)
            .collect();
        return Some(break_variety_tie(&tied, analysis.last_practiced_concept_id));
    }

    // Rule 5: next untouched concept (zero attempts) by order_index.
    let mut untouched: Vec<&&Concept> = available
        .iter()
        .filter(|c| lifetime_attempt_counts.get(&c.id).copied().unwrap_or(0) == 0)
        .collect();
    if !untouched.is_empty() {
        untouched.sort_by_key(|c| c.order_index);
        return Some(untouched[0].id);
    }

    // Rule 6: lowest mastery overall.
    let mut by_mastery: Vec<(i64, f64)> = available
        .iter()
        .map(|c| {
            let skill = skill_of(c.id);
            (c.id, mastery_value(&skill, recent_acc_of(c.id)))
        })
        .collect();
    by_mastery.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap());
    let lowest = by_mastery[0].1;
    let tied: Vec<i64> = by_mastery
        .iter()
        .filter(|(_, m)| (*m - lowest).abs() < 1e-9)
        .map(|(id, _)| *id)
        .collect();
    Some(break_variety_tie(&tied, analysis.last_practiced_concept_id))
}

/// Never returns the same concept as `last_practiced` when another
/// candidate is tied, unless it is the sole candidate.
fn break_variety_tie(candidates: &[i64], last_practiced: Option<i64>) -> i64 {
    if candidates.len() == 1 {
        return candidates[0];
    }
    candidates
        .iter()
        .find(|id| Some(**id) != last_practiced)
        .copied()
        .unwrap_or(candidates[0])
}

/// Additive scoring used to rank candidates when more than a bare tiebreak
/// is needed (e.g. surfacing a ranked list to the caller). Not required for
/// `select_focus_concept` itself but exposed for callers that want the full
/// ranking rather than only the winner.
pub fn score_candidate(mastery: f64, is_last_practiced: bool, is_virgin: bool) -> f64 {
    let need = 1.0 - mastery;
    let recency_penalty = if is_last_practiced { VARIETY_RECENCY_PENALTY } else { 0.0 };
    let virgin_bonus = if is_virgin { VARIETY_VIRGIN_BONUS } else { 0.0 };
    need - recency_penalty + virgin_bonus
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn concept(id: i64, order_index: i32, prereqs: Vec<i64>) -> Concept {
        Concept {
            id,
            topic_id: 1,
            name: format!("c{id}"),
            description: String::new(),
            order_index,
            prerequisites: prereqs,
            mastery_threshold: 0.75,
            visual_required: false,
        }
    }

    fn skill(id: i64, rating: f64) -> SkillState {
        SkillState {
            learner_id: 1,
            concept_id: id,
            rating,
            uncertainty: 350.0,
            total_attempts: 10,
            correct_attempts: 8,
            last_updated: Utc::now(),
        }
    }

    fn enriched(concept_id: i64, is_correct: bool) -> EnrichedAttempt {
        use crate::domain::{Attempt, ItemType};
        EnrichedAttempt {
            attempt: Attempt {
                id: 1,
                item_id: 1,
                learner_id: 1,
                session_id: None,
                concept_id,
                answer_given: None,
                is_correct,
                partial_score: None,
                response_time_s: None,
                rating_before: 800.0,
                rating_after: 800.0,
                timestamp: Utc::now(),
            },
            item_content: "x".to_string(),
            item_type: ItemType::ShortAnswer,
        }
    }

    #[test]
    fn stays_on_current_when_accuracy_in_band_and_not_mastered() {
        let concepts = vec![concept(1, 0, vec![]), concept(2, 1, vec![1])];
        let mut skills = HashMap::new();
        skills.insert(1, skill(1, 850.0));
        let attempts = vec![enriched(1, true), enriched(1, false), enriched(1, true)];
        let config = TutorConfig::default();
        let analysis = analyze_recent(&attempts, &config);
        let mut counts = HashMap::new();
        counts.insert(1, 3);

        let focus = select_focus_concept(&concepts, &skills, &counts, &analysis, Some(1));
        assert_eq!(focus, Some(1));
    }

    #[test]
    fn falls_back_to_unmastered_prerequisite_when_weak() {
        let concepts = vec![concept(1, 0, vec![]), concept(2, 1, vec![]), concept(3, 2, vec![1, 2])];
        let mut skills = HashMap::new();
        skills.insert(1, skill(1, 1300.0));
        skills.insert(2, skill(2, 700.0));
        skills.insert(3, skill(3, 800.0));

        let mut attempts = Vec::new();
        for _ in 0..6 {
            attempts.push(enriched(3, false));
        }
        attempts.push(enriched(3, true));
        let config = TutorConfig::default();
        let analysis = analyze_recent(&attempts, &config);

        let mut counts = HashMap::new();
        counts.insert(1, 10);
        counts.insert(2, 10);
        counts.insert(3, 7);

        let focus = select_focus_concept(&concepts, &skills, &counts, &analysis, Some(3));
        assert_eq!(focus, Some(2));
    }

    #[test]
    fn advances_to_next_unmastered_when_current_mastered() {
        let concepts = vec![concept(1, 0, vec![]), concept(2, 1, vec![1])];
        let mut skills = HashMap::new();
        skills.insert(1, skill(1, 1300.0));
        skills.insert(2, skill(2, 800.0));

        let mut attempts = Vec::new();
        for _ in 0..9 {
            attempts.push(enriched(1, true));
        }
        attempts.push(enriched(1, false));
        let config = TutorConfig::default();
        let analysis = analyze_recent(&attempts, &config);

        let mut counts = HashMap::new();
        counts.insert(1, 10);

        let focus = select_focus_concept(&concepts, &skills, &counts, &analysis, Some(1));
        assert_eq!(focus, Some(2));
    }

    #[test]
    fn picks_untouched_concept_when_nothing_attempted() {
        let concepts = vec![concept(2, 1, vec![]), concept(1, 0, vec![])];
        let skills = HashMap::new();
        let counts = HashMap::new();
        let config = TutorConfig::default();
        let analysis = analyze_recent(&[], &config);

        let focus = select_focus_concept(&concepts, &skills, &counts, &analysis, None);
        assert_eq!(focus, Some(1));
    }

    #[test]
    fn variety_tie_break_avoids_immediate_repeat() {
        let candidates = vec![1, 2];
        assert_eq!(break_variety_tie(&candidates, Some(1)), 2);
    }

    #[test]
    fn variety_tie_break_allows_repeat_when_sole_candidate() {
        let candidates = vec![1];
        assert_eq!(break_variety_tie(&candidates, Some(1)), 1);
    }

    #[test]
    fn skips_visual_required_concepts() {
        let mut visual = concept(2, 1, vec![]);
        visual.visual_required = true;
        let concepts = vec![concept(1, 0, vec![]), visual];
        let skills = HashMap::new();
        let counts = HashMap::new();
        let config = TutorConfig::default();
        let analysis = analyze_recent(&[], &config);

        let focus = select_focus_concept(&concepts, &skills, &counts, &analysis, None);
        assert_eq!(focus, Some(1));
    }

    #[test]
    fn trend_requires_minimum_attempts() {
        let attempts = vec![enriched(1, true), enriched(1, true)];
        assert_eq!(compute_trend(&attempts), Trend::Stable);
    }

    #[test]
    fn trend_detects_improvement() {
        // chronological: first half mostly wrong, second half mostly right
        let mut attempts = vec![
            enriched(1, true),
            enriched(1, true),
            enriched(1, true),
        ];
        attempts.extend(vec![enriched(1, false), enriched(1, false), enriched(1, false)]);
        attempts.reverse(); // newest first
        assert_eq!(compute_trend(&attempts), Trend::Improving);
    }
}

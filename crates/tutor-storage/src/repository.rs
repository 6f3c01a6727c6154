//! A single `SqliteRepository` struct wrapping a pool, inherent helpers
//! for transaction-scoped writes, and a trait impl that delegates to them.
//! `insert_attempt_with_skill_update` opens a transaction, runs each write
//! against it, commits once, and lets a dropped transaction roll
//! everything back on any earlier error.

use crate::error::{Result, StorageError};
use crate::models::{AttemptRow, ConceptRow, EnrichedAttemptRow, ItemRow, LearnerRow, SessionRow, SkillStateRow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{query, query_as, Sqlite, SqlitePool, Transaction};
use std::collections::HashSet;
use tutor_core::domain::{Attempt, Concept, EnrichedAttempt, Item, ItemType, Learner, Session, SessionTotals, SkillHistorySnapshot, SkillState};
use tutor_core::ports::Repository;

pub struct SqliteRepository {
    pool: SqlitePool,
    initial_skill_rating: f64,
    initial_uncertainty: f64,
}

impl SqliteRepository {
    pub fn new(pool: SqlitePool, initial_skill_rating: f64, initial_uncertainty: f64) -> Self {
        Self {
            pool,
            initial_skill_rating,
            initial_uncertainty,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn insert_attempt_in_tx(tx: &mut Transaction<'_, Sqlite>, attempt: &Attempt) -> Result<i64> {
        let result = query(
            "INSERT INTO attempts
                (item_id, learner_id, session_id, concept_id, answer_given, is_correct,
                 partial_score, response_time_s, rating_before, rating_after, timestamp)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(attempt.item_id)
        .bind(attempt.learner_id)
        .bind(&attempt.session_id)
        .bind(attempt.concept_id)
        .bind(&attempt.answer_given)
        .bind(attempt.is_correct)
        .bind(attempt.partial_score)
        .bind(attempt.response_time_s)
        .bind(attempt.rating_before)
        .bind(attempt.rating_after)
        .bind(attempt.timestamp.timestamp_millis())
        .execute(&mut **tx)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn upsert_skill_in_tx(tx: &mut Transaction<'_, Sqlite>, skill: &SkillState) -> Result<()> {
        query(
            "INSERT INTO skill_states
                (learner_id, concept_id, rating, uncertainty, total_attempts, correct_attempts, last_updated)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(learner_id, concept_id) DO UPDATE SET
                rating = excluded.rating,
                uncertainty = excluded.uncertainty,
                total_attempts = excluded.total_attempts,
                correct_attempts = excluded.correct_attempts,
                last_updated = excluded.last_updated",
        )
        .bind(skill.learner_id)
        .bind(skill.concept_id)
        .bind(skill.rating)
        .bind(skill.uncertainty)
        .bind(skill.total_attempts as i64)
        .bind(skill.correct_attempts as i64)
        .bind(skill.last_updated.timestamp_millis())
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    async fn insert_skill_history_in_tx(tx: &mut Transaction<'_, Sqlite>, attempt_id: i64, history: &SkillHistorySnapshot) -> Result<i64> {
        let result = query(
            "INSERT INTO skill_history (attempt_id, learner_id, concept_id, rating, uncertainty, recorded_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(attempt_id)
        .bind(history.learner_id)
        .bind(history.concept_id)
        .bind(history.rating)
        .bind(history.uncertainty)
        .bind(history.recorded_at.timestamp_millis())
        .execute(&mut **tx)
        .await?;

        Ok(result.last_insert_rowid())
    }
}

fn item_type_to_str(item_type: ItemType) -> &'static str {
    match item_type {
        ItemType::Mcq => "mcq",
        ItemType::ShortAnswer => "short_answer",
        ItemType::Problem => "problem",
    }
}

fn item_type_from_str(s: &str) -> Result<ItemType> {
    match s {
        "mcq" => Ok(ItemType::Mcq),
        "short_answer" => Ok(ItemType::ShortAnswer),
        "problem" => Ok(ItemType::Problem),
        other => Err(StorageError::MalformedRow(format!("unknown item_type '{other}'"))),
    }
}

fn millis_to_utc(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_else(Utc::now)
}

fn concept_from_row(row: ConceptRow) -> Result<Concept> {
    let prerequisites: Vec<i64> = serde_json::from_str(&row.prerequisites).map_err(|e| StorageError::MalformedRow(e.to_string()))?;
    Ok(Concept {
        id: row.id,
        topic_id: row.topic_id,
        name: row.name,
        description: row.description,
        order_index: row.order_index as i32,
        prerequisites,
        mastery_threshold: row.mastery_threshold,
        visual_required: row.visual_required != 0,
    })
}

fn item_from_row(row: ItemRow) -> Result<Item> {
    let options = row
        .options
        .as_deref()
        .map(|s| serde_json::from_str::<Vec<String>>(s))
        .transpose()
        .map_err(|e| StorageError::MalformedRow(e.to_string()))?;
    Ok(Item {
        id: row.id,
        concept_id: row.concept_id,
        content: row.content,
        item_type: item_type_from_str(&row.item_type)?,
        options,
        correct_answer: row.correct_answer,
        explanation: row.explanation,
        difficulty: row.difficulty,
        estimated_p_correct: row.estimated_p_correct,
        prompt_used: row.prompt_used,
        model_used: row.model_used,
        created_at: millis_to_utc(row.created_at),
    })
}

fn session_from_row(row: SessionRow) -> Session {
    Session {
        id: row.id,
        learner_id: row.learner_id,
        topic_id: row.topic_id,
        started_at: millis_to_utc(row.started_at),
        ended_at: row.ended_at.map(millis_to_utc),
        current_item_id: row.current_item_id,
        last_result_blob: row.last_result_blob,
    }
}

fn attempt_from_row(row: AttemptRow) -> Attempt {
    Attempt {
        id: row.id,
        item_id: row.item_id,
        learner_id: row.learner_id,
        session_id: row.session_id,
        concept_id: row.concept_id,
        answer_given: row.answer_given,
        is_correct: row.is_correct != 0,
        partial_score: row.partial_score,
        response_time_s: row.response_time_s,
        rating_before: row.rating_before,
        rating_after: row.rating_after,
        timestamp: millis_to_utc(row.timestamp),
    }
}

#[async_trait]
impl Repository for SqliteRepository {
    async fn create_or_get_learner(&self, name: &str) -> anyhow::Result<Learner> {
        if let Some(row) = query_as::<_, LearnerRow>("SELECT id, name, created_at FROM learners WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?
        {
            return Ok(Learner {
                id: row.id,
                name: row.name,
                created_at: millis_to_utc(row.created_at),
            });
        }

        let now = Utc::now();
        let result = query("INSERT INTO learners (name, created_at) VALUES (?, ?)")
            .bind(name)
            .bind(now.timestamp_millis())
            .execute(&self.pool)
            .await?;

        Ok(Learner {
            id: result.last_insert_rowid(),
            name: name.to_string(),
            created_at: now,
        })
    }

    async fn list_concepts_by_topic(&self, topic_id: i64) -> anyhow::Result<Vec<Concept>> {
        let rows = query_as::<_, ConceptRow>(
            "SELECT id, topic_id, name, description, order_index, prerequisites, mastery_threshold, visual_required
             FROM concepts WHERE topic_id = ? ORDER BY order_index ASC",
        )
        .bind(topic_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| Ok(concept_from_row(r)?)).collect()
    }

    async fn get_concept(&self, concept_id: i64) -> anyhow::Result<Option<Concept>> {
        let row = query_as::<_, ConceptRow>(
            "SELECT id, topic_id, name, description, order_index, prerequisites, mastery_threshold, visual_required
             FROM concepts WHERE id = ?",
        )
        .bind(concept_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(concept_from_row).transpose().map_err(Into::into)
    }

    async fn get_skill(&self, learner_id: i64, concept_id: i64) -> anyhow::Result<SkillState> {
        let row = query_as::<_, SkillStateRow>(
            "SELECT learner_id, concept_id, rating, uncertainty, total_attempts, correct_attempts, last_updated
             FROM skill_states WHERE learner_id = ? AND concept_id = ?",
        )
        .bind(learner_id)
        .bind(concept_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match row {
            Some(r) => SkillState {
                learner_id: r.learner_id,
                concept_id: r.concept_id,
                rating: r.rating,
                uncertainty: r.uncertainty,
                total_attempts: r.total_attempts as u32,
                correct_attempts: r.correct_attempts as u32,
                last_updated: millis_to_utc(r.last_updated),
            },
            None => SkillState::default_for(learner_id, concept_id, self.initial_skill_rating, self.initial_uncertainty),
        })
    }

    async fn insert_item(&self, item: Item) -> anyhow::Result<i64> {
        let options_json = item
            .options
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| StorageError::MalformedRow(e.to_string()))?;

        let result = query(
            "INSERT INTO items
                (concept_id, content, item_type, options, correct_answer, explanation,
                 difficulty, estimated_p_correct, prompt_used, model_used, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(item.concept_id)
        .bind(&item.content)
        .bind(item_type_to_str(item.item_type))
        .bind(options_json)
        .bind(&item.correct_answer)
        .bind(&item.explanation)
        .bind(item.difficulty)
        .bind(item.estimated_p_correct)
        .bind(&item.prompt_used)
        .bind(&item.model_used)
        .bind(item.created_at.timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn get_item(&self, item_id: i64) -> anyhow::Result<Option<Item>> {
        let row = query_as::<_, ItemRow>(
            "SELECT id, concept_id, content, item_type, options, correct_answer, explanation,
                    difficulty, estimated_p_correct, prompt_used, model_used, created_at
             FROM items WHERE id = ?",
        )
        .bind(item_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(item_from_row).transpose().map_err(Into::into)
    }

    async fn insert_attempt_with_skill_update(
        &self,
        attempt: Attempt,
        updated_skill: SkillState,
        history: SkillHistorySnapshot,
    ) -> anyhow::Result<(i64, i64)> {
        let mut tx = self.pool.begin().await.map_err(StorageError::from)?;

        let attempt_id = Self::insert_attempt_in_tx(&mut tx, &attempt).await?;
        Self::upsert_skill_in_tx(&mut tx, &updated_skill).await?;
        let history_id = Self::insert_skill_history_in_tx(&mut tx, attempt_id, &history).await?;

        tx.commit().await.map_err(StorageError::from)?;

        Ok((attempt_id, history_id))
    }

    async fn recent_enriched_attempts(&self, learner_id: i64, limit: usize) -> anyhow::Result<Vec<EnrichedAttempt>> {
        let rows = query_as::<_, EnrichedAttemptRow>(
            "SELECT a.id, a.item_id, a.learner_id, a.session_id, a.concept_id, a.answer_given,
                    a.is_correct, a.partial_score, a.response_time_s, a.rating_before, a.rating_after, a.timestamp,
                    i.content AS item_content, i.item_type
             FROM attempts a
             JOIN items i ON i.id = a.item_id
             WHERE a.learner_id = ?
             ORDER BY a.timestamp DESC
             LIMIT ?",
        )
        .bind(learner_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let item_type = item_type_from_str(&row.item_type)?;
                Ok(EnrichedAttempt {
                    attempt: attempt_from_row(AttemptRow {
                        id: row.id,
                        item_id: row.item_id,
                        learner_id: row.learner_id,
                        session_id: row.session_id,
                        concept_id: row.concept_id,
                        answer_given: row.answer_given,
                        is_correct: row.is_correct,
                        partial_score: row.partial_score,
                        response_time_s: row.response_time_s,
                        rating_before: row.rating_before,
                        rating_after: row.rating_after,
                        timestamp: row.timestamp,
                    }),
                    item_content: row.item_content,
                    item_type,
                })
            })
            .collect()
    }

    async fn correct_texts(&self, learner_id: i64) -> anyhow::Result<HashSet<String>> {
        let rows = query_as::<_, (String,)>(
            "SELECT DISTINCT i.content FROM attempts a JOIN items i ON i.id = a.item_id
             WHERE a.learner_id = ? AND a.is_correct = 1",
        )
        .bind(learner_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(content,)| tutor_core::dedup::normalize_text(&content)).collect())
    }

    async fn session_texts(&self, session_id: &str) -> anyhow::Result<HashSet<String>> {
        let rows = query_as::<_, (String,)>(
            "SELECT DISTINCT i.content FROM attempts a JOIN items i ON i.id = a.item_id
             WHERE a.session_id = ?
             UNION
             SELECT i.content FROM sessions s JOIN items i ON i.id = s.current_item_id
             WHERE s.id = ?",
        )
        .bind(session_id)
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(content,)| tutor_core::dedup::normalize_text(&content)).collect())
    }

    async fn create_session(&self, learner_id: i64, topic_id: Option<i64>) -> anyhow::Result<Session> {
        let id = uuid_v4_like();
        let now = Utc::now();

        query("INSERT INTO sessions (id, learner_id, topic_id, started_at, ended_at, current_item_id, last_result_blob) VALUES (?, ?, ?, ?, NULL, NULL, NULL)")
            .bind(&id)
            .bind(learner_id)
            .bind(topic_id)
            .bind(now.timestamp_millis())
            .execute(&self.pool)
            .await?;

        Ok(Session {
            id,
            learner_id,
            topic_id,
            started_at: now,
            ended_at: None,
            current_item_id: None,
            last_result_blob: None,
        })
    }

    async fn get_session(&self, session_id: &str) -> anyhow::Result<Option<Session>> {
        let row = query_as::<_, SessionRow>(
            "SELECT id, learner_id, topic_id, started_at, ended_at, current_item_id, last_result_blob
             FROM sessions WHERE id = ?",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(session_from_row))
    }

    async fn set_session_current_item(&self, session_id: &str, item_id: i64, last_result_blob: Option<String>) -> anyhow::Result<()> {
        query("UPDATE sessions SET current_item_id = ?, last_result_blob = ? WHERE id = ?")
            .bind(item_id)
            .bind(last_result_blob)
            .bind(session_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn end_session(&self, session_id: &str) -> anyhow::Result<SessionTotals> {
        let now = Utc::now().timestamp_millis();
        query("UPDATE sessions SET ended_at = ? WHERE id = ?")
            .bind(now)
            .bind(session_id)
            .execute(&self.pool)
            .await?;

        let row: (i64, i64) = query_as(
            "SELECT COUNT(*), COALESCE(SUM(is_correct), 0) FROM attempts WHERE session_id = ?",
        )
        .bind(session_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(SessionTotals {
            items_attempted: row.0 as u32,
            items_correct: row.1 as u32,
        })
    }
}

/// A process-local, time-seeded session id. Not a cryptographic UUID —
/// sessions never leave this single-learner, single-machine database, so
/// collision resistance only needs to hold within one process lifetime.
fn uuid_v4_like() -> String {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let millis = Utc::now().timestamp_millis();
    format!("sess-{millis:x}-{n:x}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tutor_core::domain::ItemType;

    async fn setup() -> SqliteRepository {
        let pool = crate::init_test_db().await.expect("migrate test db");
        SqliteRepository::new(pool, 800.0, 350.0)
    }

    fn sample_item(concept_id: i64) -> Item {
        Item {
            id: 0,
            concept_id,
            content: "What is 2 + 2?".to_string(),
            item_type: ItemType::ShortAnswer,
            options: None,
            correct_answer: "4".to_string(),
            explanation: None,
            difficulty: 800.0,
            estimated_p_correct: 0.8,
            prompt_used: None,
            model_used: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn create_or_get_learner_is_idempotent_by_name() {
        let repo = setup().await;
        let a = repo.create_or_get_learner("Ada").await.unwrap();
        let b = repo.create_or_get_learner("Ada").await.unwrap();
        assert_eq!(a.id, b.id);
    }

    #[tokio::test]
    async fn get_skill_defaults_when_absent() {
        let repo = setup().await;
        let skill = repo.get_skill(1, 1).await.unwrap();
        assert_eq!(skill.rating, 800.0);
        assert_eq!(skill.total_attempts, 0);
    }

    #[tokio::test]
    async fn insert_item_then_get_item_round_trips() {
        let repo = setup().await;
        query("INSERT INTO concepts (id, topic_id, name, description, order_index) VALUES (1, 1, 'c', 'd', 0)")
            .execute(&repo.pool)
            .await
            .unwrap();

        let id = repo.insert_item(sample_item(1)).await.unwrap();
        let fetched = repo.get_item(id).await.unwrap().unwrap();
        assert_eq!(fetched.content, "What is 2 + 2?");
        assert_eq!(fetched.item_type, ItemType::ShortAnswer);
    }

    #[tokio::test]
    async fn insert_attempt_with_skill_update_is_atomic() {
        let repo = setup().await;
        query("INSERT INTO concepts (id, topic_id, name, description, order_index) VALUES (1, 1, 'c', 'd', 0)")
            .execute(&repo.pool)
            .await
            .unwrap();
        let item_id = repo.insert_item(sample_item(1)).await.unwrap();

        let attempt = Attempt {
            id: 0,
            item_id,
            learner_id: 1,
            session_id: Some("s1".to_string()),
            concept_id: 1,
            answer_given: Some("4".to_string()),
            is_correct: true,
            partial_score: None,
            response_time_s: Some(3.0),
            rating_before: 800.0,
            rating_after: 815.0,
            timestamp: Utc::now(),
        };
        let updated_skill = SkillState {
            learner_id: 1,
            concept_id: 1,
            rating: 815.0,
            uncertainty: 340.0,
            total_attempts: 1,
            correct_attempts: 1,
            last_updated: Utc::now(),
        };
        let history = SkillHistorySnapshot {
            id: 0,
            attempt_id: 0,
            learner_id: 1,
            concept_id: 1,
            rating: 815.0,
            uncertainty: 340.0,
            recorded_at: Utc::now(),
        };

        let (attempt_id, history_id) = repo
            .insert_attempt_with_skill_update(attempt, updated_skill, history)
            .await
            .unwrap();
        assert!(attempt_id > 0);
        assert!(history_id > 0);

        let skill = repo.get_skill(1, 1).await.unwrap();
        assert_eq!(skill.rating, 815.0);
        assert_eq!(skill.total_attempts, 1);
    }

    #[tokio::test]
    async fn session_lifecycle_create_fetch_set_item_end() {
        let repo = setup().await;
        repo.create_or_get_learner("Ada").await.unwrap();

        let session = repo.create_session(1, Some(1)).await.unwrap();
        assert!(repo.get_session(&session.id).await.unwrap().is_some());

        query("INSERT INTO concepts (id, topic_id, name, description, order_index) VALUES (1, 1, 'c', 'd', 0)")
            .execute(&repo.pool)
            .await
            .unwrap();
        let item_id = repo.insert_item(sample_item(1)).await.unwrap();
        repo.set_session_current_item(&session.id, item_id, None).await.unwrap();

        let fetched = repo.get_session(&session.id).await.unwrap().unwrap();
        assert_eq!(fetched.current_item_id, Some(item_id));

        let totals = repo.end_session(&session.id).await.unwrap();
        assert_eq!(totals.items_attempted, 0);

        let ended = repo.get_session(&session.id).await.unwrap().unwrap();
        assert!(!ended.is_active());
    }

    #[tokio::test]
    async fn correct_texts_only_includes_correct_attempts() {
        let repo = setup().await;
        query("INSERT INTO concepts (id, topic_id, name, description, order_index) VALUES (1, 1, 'c', 'd', 0)")
            .execute(&repo.pool)
            .await
            .unwrap();
        let item_id = repo.insert_item(sample_item(1)).await.unwrap();

        let attempt = Attempt {
            id: 0,
            item_id,
            learner_id: 1,
            session_id: None,
            concept_id: 1,
            answer_given: Some("5".to_string()),
            is_correct: false,
            partial_score: None,
            response_time_s: None,
            rating_before: 800.0,
            rating_after: 790.0,
            timestamp: Utc::now(),
        };
        let skill = SkillState::default_for(1, 1, 800.0, 350.0);
        let history = SkillHistorySnapshot {
            id: 0,
            attempt_id: 0,
            learner_id: 1,
            concept_id: 1,
            rating: 790.0,
            uncertainty: 350.0,
            recorded_at: Utc::now(),
        };
        repo.insert_attempt_with_skill_update(attempt, skill, history).await.unwrap();

        let texts = repo.correct_texts(1).await.unwrap();
        assert!(texts.is_empty());
    }
}

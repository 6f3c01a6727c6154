//! End-to-end integration tests against a real `SqliteRepository` backing
//! `TurnService`, exercising the seed -> start -> submit -> end path the
//! `tutor demo` command drives. Each test gets its own temp-dir-backed
//! database.

use anyhow::Result;
use std::sync::Arc;
use tempfile::TempDir;
use tutor_core::precache::PrecacheStore;
use tutor_core::ports::{LlmClient, Repository};
use tutor_core::services::TurnService;
use tutor_core::TutorConfig;
use tutor_storage::SqliteRepository;

async fn setup() -> Result<(TempDir, Arc<SqliteRepository>)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("tutor.db");
    let pool = tutor_storage::init_db(db_path.to_str().unwrap()).await?;

    sqlx::query(
        "INSERT INTO concepts (id, topic_id, name, description, order_index, prerequisites, mastery_threshold, visual_required)
         VALUES (1, 1, 'Addition Facts', 'Single-digit addition', 0, '[]', 0.75, 0)",
    )
    .execute(&pool)
    .await?;

    let repository = Arc::new(SqliteRepository::new(pool, 800.0, 350.0));
    Ok((temp_dir, repository))
}

/// A minimal offline client good enough to drive the generation pipeline
/// without the local-generator bypass (the "Addition Facts" concept name
/// does not match any of `local_generators`'s name patterns).
struct ScriptedLlmClient;

#[async_trait::async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn chat(&self, prompt: &str, _temperature: f32, _thinking: bool, _timeout: std::time::Duration) -> anyhow::Result<tutor_core::ports::ChatResponse> {
        let text = if prompt.contains("distractors") {
            r#"{"distractors": ["1", "2", "3"]}"#.to_string()
        } else {
            r#"{"question": "What is 3 plus 4?", "correct_answer": "7", "explanation": "3 + 4 = 7"}"#.to_string()
        };
        Ok(tutor_core::ports::ChatResponse {
            text,
            model_name: "scripted".to_string(),
            full_prompt: prompt.to_string(),
        })
    }
}

#[tokio::test]
async fn full_turn_cycle_persists_attempt_and_advances_rating() -> Result<()> {
    let (_temp_dir, repository) = setup().await?;
    let config = Arc::new(TutorConfig::default());
    let llm: Arc<dyn LlmClient> = Arc::new(ScriptedLlmClient);
    let precache = Arc::new(PrecacheStore::new());
    let service = TurnService::new(repository.clone(), llm, config, precache);

    let learner = repository.create_or_get_learner("Grace").await?;
    let (session, view) = service.start(learner.id, 1).await?;
    assert_eq!(view.concept_id, 1);

    let result = service.submit(&session.id, "7", None).await?;
    assert!(result.is_correct);
    assert!(result.rating_after >= result.rating_before);

    let skill = repository.get_skill(learner.id, 1).await?;
    assert_eq!(skill.total_attempts, 1);
    assert_eq!(skill.correct_attempts, 1);

    let totals = service.end(&session.id).await?;
    assert_eq!(totals.items_attempted, 1);
    assert_eq!(totals.items_correct, 1);

    let ended_session = repository.get_session(&session.id).await?.unwrap();
    assert!(!ended_session.is_active());

    Ok(())
}

#[tokio::test]
async fn incorrect_submission_still_persists_and_lowers_rating() -> Result<()> {
    let (_temp_dir, repository) = setup().await?;
    let config = Arc::new(TutorConfig::default());
    let llm: Arc<dyn LlmClient> = Arc::new(ScriptedLlmClient);
    let precache = Arc::new(PrecacheStore::new());
    let service = TurnService::new(repository.clone(), llm, config, precache);

    let learner = repository.create_or_get_learner("Ada").await?;
    let (session, _view) = service.start(learner.id, 1).await?;

    let result = service.submit(&session.id, "not even close", None).await?;
    assert!(!result.is_correct);
    assert!(result.rating_after <= result.rating_before);

    let skill = repository.get_skill(learner.id, 1).await?;
    assert_eq!(skill.total_attempts, 1);
    assert_eq!(skill.correct_attempts, 0);

    Ok(())
}

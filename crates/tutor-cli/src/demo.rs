//! Drives `start`/`submit`/`next`/`end` against a real `SqliteRepository`
//! and the offline `FakeLlmClient`, printing each turn in colored,
//! emoji-prefixed output, with an optional stdin-driven interactive mode.

use crate::llm::FakeLlmClient;
use anyhow::Result;
use colored::*;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tutor_core::domain::ItemType;
use tutor_core::ports::Repository;
use tutor_core::precache::PrecacheStore;
use tutor_core::services::TurnService;
use tutor_core::TutorConfig;
use tutor_storage::SqliteRepository;

pub async fn run(db_path: &str, learner_name: &str, topic_id: i64, turns: u32, interactive: bool) -> Result<()> {
    println!("{}", format!("Starting tutor demo for '{learner_name}'").bright_cyan().bold());
    println!();

    let pool = tutor_storage::init_db(db_path).await?;
    let config = Arc::new(TutorConfig::default());
    let repository = Arc::new(SqliteRepository::new(pool, config.initial_skill_rating, config.initial_uncertainty));
    let llm = Arc::new(FakeLlmClient::new());
    let precache = Arc::new(PrecacheStore::new());
    let service = TurnService::new(repository.clone(), llm, config, precache);

    let learner = repository.create_or_get_learner(learner_name).await?;
    let (session, mut view) = service.start(learner.id, topic_id).await?;
    println!("   {}: {}", "session".dimmed(), session.id);
    println!();

    let stdin = tokio::io::stdin();
    let mut lines = BufReader::new(stdin).lines();

    for turn in 1..=turns {
        println!("{}", format!("Turn {turn}/{turns}").bright_white().bold());
        println!("   {}", view.content);
        if let Some(options) = &view.options {
            for (idx, option) in options.iter().enumerate() {
                let letter = tutor_core::domain::index_to_letter(idx).unwrap_or('?');
                println!("     {letter}) {option}");
            }
        }

        let answer = if interactive {
            print!("   {} ", "your answer:".yellow());
            use std::io::Write;
            std::io::stdout().flush().ok();
            match lines.next_line().await? {
                Some(line) => line,
                None => break,
            }
        } else {
            guess_answer(&view)
        };

        let result = service.submit(&session.id, &answer, None).await?;
        if result.is_correct {
            println!("   {} (rating {:.0} -> {:.0})", "correct!".green().bold(), result.rating_before, result.rating_after);
        } else {
            println!("   {} (rating {:.0} -> {:.0})", "not quite.".red().bold(), result.rating_before, result.rating_after);
        }
        if let Some(feedback) = &result.feedback {
            println!("   {}", feedback.dimmed());
        }
        println!();

        match service.next(&session.id).await? {
            Some(next_view) => view = next_view,
            None => {
                println!("{}", "no further item available; ending session.".yellow());
                break;
            }
        }
    }

    let totals = service.end(&session.id).await?;
    println!("{}", "Session complete.".bright_green().bold());
    println!(
        "   {}: {}/{}",
        "score".bright_white().bold(),
        totals.items_correct,
        totals.items_attempted
    );

    Ok(())
}

/// Non-interactive mode answers with a plausible guess so the demo runs
/// unattended: the first option for MCQ items, otherwise a fixed stand-in
/// the grader will usually mark wrong, just to exercise both branches.
fn guess_answer(view: &tutor_core::services::TurnView) -> String {
    match view.item_type {
        ItemType::Mcq => view.options.as_ref().and_then(|o| o.first()).cloned().unwrap_or_else(|| "A".to_string()),
        _ => "0".to_string(),
    }
}

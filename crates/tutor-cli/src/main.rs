use anyhow::Result;
use clap::{Parser, Subcommand};

mod demo;
mod llm;
mod seed;

/// Tutor CLI - development and demo tool for the adaptive tutoring core
#[derive(Parser)]
#[command(name = "tutor")]
#[command(about = "Tutor CLI tool for driving the adaptive decision core", long_about = None)]
struct Cli {
    /// Path to the SQLite database file (default: ./tutor.db)
    #[arg(long, default_value = "tutor.db")]
    db: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database and run pending migrations
    Init,
    /// Load the built-in demo arithmetic curriculum into a topic
    Seed {
        /// Topic id to seed concepts under
        #[arg(long, default_value_t = 1)]
        topic: i64,
    },
    /// Run a learner through a scripted or interactive session
    Demo {
        /// Learner display name
        #[arg(long, default_value = "demo-learner")]
        learner: String,
        /// Topic id to draw concepts from
        #[arg(long, default_value_t = 1)]
        topic: i64,
        /// Number of turns to run
        #[arg(long, default_value_t = 5)]
        turns: u32,
        /// Prompt for answers on stdin instead of auto-answering
        #[arg(long, default_value_t = false)]
        interactive: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_target(false).compact().init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init => {
            tutor_storage::init_db(&cli.db).await?;
            println!("database ready at {}", cli.db);
        }
        Commands::Seed { topic } => {
            let pool = tutor_storage::init_db(&cli.db).await?;
            seed::seed_arithmetic_topic(&pool, topic).await?;
        }
        Commands::Demo {
            learner,
            topic,
            turns,
            interactive,
        } => {
            demo::run(&cli.db, &learner, topic, turns, interactive).await?;
        }
    }

    Ok(())
}

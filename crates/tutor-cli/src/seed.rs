//! Seeds a small demo curriculum. The repository contract has no
//! concept-authoring operation (a real deployment's content pipeline owns
//! that out of band), so the CLI talks SQL directly here rather than
//! going through the repository trait.

use anyhow::Result;
use colored::*;
use sqlx::SqlitePool;

struct SeedConcept {
    id: i64,
    name: &'static str,
    description: &'static str,
    order_index: i64,
    prerequisites: &'static [i64],
}

const ARITHMETIC_TOPIC: &[SeedConcept] = &[
    SeedConcept {
        id: 1,
        name: "Addition Facts",
        description: "Single-digit addition",
        order_index: 0,
        prerequisites: &[],
    },
    SeedConcept {
        id: 2,
        name: "Subtraction Facts",
        description: "Single-digit subtraction",
        order_index: 1,
        prerequisites: &[1],
    },
    SeedConcept {
        id: 3,
        name: "Mixed Word Problems",
        description: "Addition and subtraction word problems",
        order_index: 2,
        prerequisites: &[1, 2],
    },
];

pub async fn seed_arithmetic_topic(pool: &SqlitePool, topic_id: i64) -> Result<()> {
    for concept in ARITHMETIC_TOPIC {
        let prerequisites_json = serde_json::to_string(concept.prerequisites)?;
        sqlx::query(
            "INSERT INTO concepts (id, topic_id, name, description, order_index, prerequisites, mastery_threshold, visual_required)
             VALUES (?, ?, ?, ?, ?, ?, 0.75, 0)
             ON CONFLICT(id) DO NOTHING",
        )
        .bind(concept.id)
        .bind(topic_id)
        .bind(concept.name)
        .bind(concept.description)
        .bind(concept.order_index)
        .bind(prerequisites_json)
        .execute(pool)
        .await?;
    }

    println!(
        "{} {} concepts into topic {topic_id}",
        "seeded".green().bold(),
        ARITHMETIC_TOPIC.len()
    );
    Ok(())
}

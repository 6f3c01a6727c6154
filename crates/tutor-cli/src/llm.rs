//! A deterministic, offline stand-in for a real LLM transport (only the
//! `LlmClient` trait lives in `tutor-core`; the network client is an
//! external collaborator). Good enough to drive `tutor demo` end to end
//! without a network call; a real deployment would swap this for an
//! HTTP-backed client speaking to whatever model server it has, behind the
//! same trait.

use anyhow::Result;
use async_trait::async_trait;
use rand::Rng;
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tutor_core::ports::{ChatResponse, LlmClient};

pub struct FakeLlmClient {
    calls: AtomicU64,
}

impl FakeLlmClient {
    pub fn new() -> Self {
        Self { calls: AtomicU64::new(0) }
    }
}

impl Default for FakeLlmClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmClient for FakeLlmClient {
    async fn chat(&self, prompt: &str, _temperature: f32, _thinking: bool, _timeout: Duration) -> Result<ChatResponse> {
        let call_number = self.calls.fetch_add(1, Ordering::Relaxed);
        let text = if prompt.contains("distractors") {
            fake_distractors()
        } else {
            fake_question(prompt, call_number)
        };

        Ok(ChatResponse {
            text,
            model_name: "fake-offline-tutor".to_string(),
            full_prompt: prompt.to_string(),
        })
    }
}

fn fake_distractors() -> String {
    let mut rng = rand::thread_rng();
    let offsets: Vec<i64> = (0..3).map(|_| rng.gen_range(1..=9)).collect();
    json!({ "distractors": offsets.iter().map(|o| o.to_string()).collect::<Vec<_>>() }).to_string()
}

/// Produces an arithmetic word problem whose operands vary with each call,
/// so the dedup registry never forces an endless retry loop.
fn fake_question(prompt: &str, call_number: u64) -> String {
    let mut rng = rand::thread_rng();
    let a = rng.gen_range(2..=12) + (call_number % 5) as i64;
    let b = rng.gen_range(1..=9);

    let subtraction = prompt.to_lowercase().contains("subtraction");
    let (question, answer, explanation) = if subtraction {
        let (big, small) = if a >= b { (a, b) } else { (b, a) };
        (
            format!("What is {big} minus {small}?"),
            (big - small).to_string(),
            format!("{big} - {small} = {}", big - small),
        )
    } else {
        (format!("What is {a} plus {b}?"), (a + b).to_string(), format!("{a} + {b} = {}", a + b))
    };

    if prompt.contains("multiple-choice") {
        json!({
            "question": question,
            "correct_answer": answer,
            "explanation": explanation,
            "options": [answer],
        })
        .to_string()
    } else {
        json!({
            "question": question,
            "correct_answer": answer,
            "explanation": explanation,
        })
        .to_string()
    }
}

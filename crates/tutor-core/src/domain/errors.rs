use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("concept not found: {0}")]
    ConceptNotFound(i64),

    #[error("item not found: {0}")]
    ItemNotFound(i64),

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("session already ended: {0}")]
    SessionEnded(String),

    #[error("invalid mcq options: {0}")]
    InvalidOptions(String),

    #[error("correct_answer does not resolve to an option: {0}")]
    UnresolvedAnswer(String),
}

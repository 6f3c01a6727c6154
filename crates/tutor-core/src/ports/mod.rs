pub mod llm_client;
pub mod repository;

pub use llm_client::{ChatResponse, LlmClient};
pub use repository::Repository;

#[cfg(any(test, feature = "testing"))]
pub use llm_client::MockLlmClient;
#[cfg(any(test, feature = "testing"))]
pub use repository::MockRepository;

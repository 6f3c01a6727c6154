pub mod turn;

pub use turn::{SubmitResult, TurnService, TurnView};

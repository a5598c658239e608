pub mod orchestrator;
pub mod state;

pub use orchestrator::{SafetyFramework, SafetyReport};
pub use state::RequestState;

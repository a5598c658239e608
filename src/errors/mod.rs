pub mod types;

pub use types::FrameworkError;

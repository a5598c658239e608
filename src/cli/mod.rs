pub mod commands;
pub mod history;
pub mod run;
pub mod validate;

pub use commands::{Cli, Commands};

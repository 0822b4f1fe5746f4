pub mod commands;
pub mod progress;
pub mod run;

pub use commands::{Cli, Commands};

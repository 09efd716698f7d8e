#[macro_use]
pub mod logger;

pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod llm;
pub mod orchestrator;
pub mod output;
pub mod protocol;
pub mod session;
pub mod stream;

#[cfg(test)]
mod testing;

// Re-exports for convenience
pub use config::Config;
pub use error::{PilotError, Result};
pub use orchestrator::{Pilot, TaskVerdict};
pub use session::{Session, ShellChannel};

//! Target environment context
//!
//! Facts about the machine behind a session (distribution, package manager,
//! init system) that every provider request carries.

pub mod env;

pub use env::{detect_environment, EnvironmentFacts, DETECT_COMMAND};

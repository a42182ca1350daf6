//! Utilities shared by the queue session library and the CLI binary.

pub mod logger;
pub mod time;

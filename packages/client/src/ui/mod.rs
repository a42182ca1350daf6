//! Interactive CLI on top of the queue session.

pub mod command;
pub mod error;
pub mod formatter;
pub mod runner;

pub use command::CliCommand;
pub use error::ClientError;
pub use formatter::SessionFormatter;
pub use runner::run_client;

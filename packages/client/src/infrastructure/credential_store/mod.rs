//! CredentialStore 実装
//!
//! - `inmemory`: process-local store, used by tests and `--access-token` runs
//! - `file`: JSON file on disk

pub mod file;
pub mod inmemory;

pub use file::FileCredentialStore;
pub use inmemory::InMemoryCredentialStore;

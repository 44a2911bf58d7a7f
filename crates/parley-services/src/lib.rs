//! parley-services — the external collaborators the core state machines
//! consult: the SQLite-backed user directory and the in-memory chat log.

pub mod chat;
pub mod user_directory;

pub use chat::ChatLog;
pub use user_directory::{UserDirectory, UserDirectoryError, UserRecord};

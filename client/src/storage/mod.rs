//! Local persistence. The only thing the client keeps on disk is the session.

pub mod session_store;

pub use session_store::{SessionStore, SESSION_FILE_NAME};

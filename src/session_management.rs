//! Session management core module.
//!
//! Tracks the relay sessions that are currently running so they can be listed
//! and cancelled at shutdown.

/// Submodule for session data structures.
pub mod session;
/// Submodule for the session registry.
pub mod session_manager;

pub use session::{ActiveSession, SessionInfo, SessionState};
pub use session_manager::SessionManager;

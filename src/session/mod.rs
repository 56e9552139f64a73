//! Session management
//!
//! Turns a task or follow-up message into one agent invocation, classifies
//! the result and records it on the session.

mod manager;
mod outcome;

pub use manager::{ContinueOptions, ExecOptions, SessionManager};
pub use outcome::{TurnOutcome, classify};

//! The conversation engine.
//!
//! For every user message the orchestrator follows the same cycle:
//!
//! 1. **Append** the user text to the session's context
//! 2. **Offer** the model only the tools its current stage permits
//! 3. **Execute** the requested calls in order, gated by the stage tracker
//! 4. **Feed back** each result and invoke the model again
//! 5. **Return** the first text answer
//!
//! The loop stops at the first text answer or at the iteration ceiling.
//! [`ChatService`] wraps it with session loading, saving, and per-session
//! serialization.

pub mod orchestrator;
pub mod prompt;
pub mod service;
pub mod stage_tracker;

pub use orchestrator::Orchestrator;
pub use service::{ChatReply, ChatService};
pub use stage_tracker::StageTracker;

//! # chatdesk Core
//!
//! Domain types, traits, and error definitions for the chatdesk
//! conversational orchestration engine. Every other crate depends inward
//! on this one.
//!
//! ## Layout
//!
//! - [`turn`] and [`context`]: the append-only turn log fed to the model
//! - [`tool`]: the `Tool` trait and the name-keyed `ToolRegistry`
//! - [`provider`]: the `Provider` trait over hosted language models
//! - [`session`]: sessions, stages, and accumulated business facts
//! - [`store`]: the `SessionStore` persistence gateway

pub mod context;
pub mod error;
pub mod event;
pub mod provider;
pub mod session;
pub mod store;
pub mod tool;
pub mod turn;

// Re-export key types at crate root for ergonomics
pub use context::{ContextError, ConversationContext};
pub use error::{Error, PreconditionFailed, ProviderError, Result, StoreError, ToolError};
pub use event::{DomainEvent, EventBus};
pub use provider::{MalformedArguments, ModelRequest, ModelResponse, Provider, RequestedCall};
pub use session::{
    BusinessFacts, ContactField, ContactFields, ConversationStatus, Session, SessionId,
    SessionStatus, Stage,
};
pub use store::SessionStore;
pub use tool::{Tool, ToolContext, ToolDeclaration, ToolRegistry};
pub use turn::{Arguments, ToolOutcome, Turn};

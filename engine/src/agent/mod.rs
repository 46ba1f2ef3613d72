//! Persona invocation
//!
//! The [`AgentInvoker`] trait is the seam between the conductor and the
//! chat-completion providers. [`AgentClient`] renders a persona's template
//! with the query and the recent conversation, then performs a single
//! timed provider call.

pub mod invoker;

pub use invoker::{AgentClient, AgentInvoker};

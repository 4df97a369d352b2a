//! Database agent
//!
//! Wires a model provider to the database through two tools and keeps the
//! conversation history of a session.

pub mod deps;
pub mod prompt;
pub mod runner;
pub mod tools;

// Re-exports
pub use deps::{AgentDeps, BufferSink, OutputSink, TerminalSink};
pub use runner::{AgentRunner, RunOutput};

//! DBdex Library
//!
//! Chat with a relational database from the terminal. The library holds the
//! schema reflection, the read-only query path, the model providers and the
//! agent; the binary in src/main.rs wires them into a REPL.

pub mod agent;
pub mod cli;
pub mod config;
pub mod database;
pub mod error;
pub mod llm;

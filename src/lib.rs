//! Breeze is a terminal chat client for a locally running Ollama server.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`api`] defines the wire payloads and the model directory client.
//! - [`core`] owns the streaming chat transport, NDJSON framing, conversation
//!   state, configuration, and error types.
//! - [`cli`] parses arguments and drives the interactive and one-shot modes.
//! - [`utils`] holds URL helpers and tracing setup.
//!
//! The binary (`src/main.rs`) routes straight into [`crate::cli::main`].

pub mod api;
pub mod cli;
pub mod core;
pub mod utils;

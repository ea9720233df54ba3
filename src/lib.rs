//! Causerie is a minimal terminal chat client for OpenAI-compatible APIs.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] owns the session state (the conversation, input buffer, and
//!   presentation flags), configuration, and streaming orchestration.
//! - [`ui`] renders the terminal interface, including restricted markdown
//!   with table support, and runs the interactive event loop.
//! - [`api`] defines the chat completion payloads used on the wire.
//!
//! The runtime entrypoint lives in the binary crate (`src/main.rs`), which
//! dispatches into [`ui::chat_loop::run_chat`].

pub mod api;
pub mod core;
pub mod ui;
pub mod utils;

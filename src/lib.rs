//! promptpad composes text prompts and streams completions into them from
//! llama.cpp, KoboldCpp, OpenAI-compatible servers or a hosted endpoint.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] owns the prompt document and its undo history, context
//!   assembly (memory, author's note, world info), the backend adapters and
//!   the completion controller that drives predictions.
//! - [`core::session`] persists sessions; [`core::config`] holds user
//!   defaults.
//! - [`cli`] is the command-line front end used by the binary.
//!
//! Runtime entrypoints live in the binary crate (`src/main.rs`) and route
//! through [`crate::cli::main`].

pub mod cli;
pub mod core;
pub mod utils;

//! Side-effecting operations: PTY relay, reviewer process calls, terminal
//! and log output. Isolated from [`crate::core`] to enable mocking in tests.

pub mod config;
pub mod console;
pub mod display;
pub mod pane;
pub mod prompts;
pub mod reviewer;
pub mod terminal;

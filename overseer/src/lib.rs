//! Real-time supervisor for interactive AI coding sessions.
//!
//! Runs a worker CLI under a PTY, relays its terminal untouched, and feeds a
//! copy of the output through a chunker to a reviewing model. Reviewer
//! directives drive a supervisor state machine that can inject guidance into
//! the worker or interrupt it outright. The architecture enforces a strict
//! separation:
//!
//! - **[`core`]**: Pure, deterministic logic (chunking, directive parsing,
//!   budget accounting, action policy). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (PTY relay, reviewer process
//!   calls, terminal output, log files). Isolated to enable mocking in tests.
//!
//! Orchestration modules ([`supervisor`], [`session`]) coordinate core logic
//! with I/O to implement the CLI.

pub mod core;
pub mod io;
pub mod logging;
pub mod report;
pub mod session;
pub mod supervisor;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

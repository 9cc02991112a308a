//! Pure, deterministic session-auditing logic.
//!
//! Nothing in this module performs I/O or spawns processes. Stream
//! segmentation, directive parsing, budget accounting, and action policy are
//! all plain functions over plain data so they can be tested in isolation.

pub mod budget;
pub mod chunk;
pub mod chunker;
pub mod directive;
pub mod patterns;
pub mod policy;

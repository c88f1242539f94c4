//! Worker runtime.
//!
//! - `config`: per-worker settings (tick interval, CPU pinning, stack size).
//! - `handler`: the processing seam run on the dispatch thread.
//! - `worker`: the worker handle, its dispatch thread and its timer thread.

pub mod config;
pub mod handler;
pub mod worker;

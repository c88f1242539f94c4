//! Per-instance background workers.
//!
//! A [`Worker`] owns a dedicated dispatch thread consuming typed messages from
//! a blocking FIFO queue, plus a timer thread that periodically injects ticks
//! into the same queue. Shutdown is a message too, so `exit()` is ordered with
//! everything posted before it.
//!
//! - [`sync::queue`]: the blocking queue.
//! - [`runtime`]: worker, handler seam, configuration.
//! - [`fault`]: fatal-assertion hook for broken invariants.

pub mod fault;
pub mod runtime;
pub mod sync;
mod trace;

pub use runtime::config::{ConfigError, WorkerConfig};
pub use runtime::handler::{Context, EchoHandler, Handler, UserData, handler_fn};
pub use runtime::worker::{Worker, WorkerError, WorkerState, WorkerStats};
pub use trace::init_tracing;

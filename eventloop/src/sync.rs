//! Synchronization primitives for in-process communication.
//!
//! This module provides the blocking queue that connects a worker's producers
//! (caller threads and the timer thread) to its single dispatch thread.

pub mod queue;

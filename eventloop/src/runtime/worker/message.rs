//! Messages carried by a worker's queue.

/// One unit of work for the dispatch loop.
///
/// The queue owns a message from push until the dispatch loop pops it; a
/// `User` payload then moves into the handler.
#[derive(Debug)]
pub(crate) enum Message<T> {
    /// Terminal transition: stop the timer, drain, exit.
    Exit,
    /// Payload posted by a caller.
    User(T),
    /// Timer interval elapsed.
    Tick,
}

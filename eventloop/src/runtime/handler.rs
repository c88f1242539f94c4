//! Processing seam for the dispatch thread.
//!
//! A [`Handler`] is moved onto the worker's dispatch thread by
//! [`Worker::create`](crate::runtime::worker::Worker::create) and handed back
//! when the worker exits. It receives each payload by value, so releasing the
//! payload is simply the end of `on_payload`.

use std::fmt::Arguments;
use std::io::{self, Write};
use std::marker::PhantomData;
use std::thread::{self, ThreadId};

use crate::trace::warn;

/// Dispatch-side view of the worker passed to every handler callback.
#[derive(Debug, Clone, Copy)]
pub struct Context<'a> {
    name: &'a str,
}

impl<'a> Context<'a> {
    pub(crate) const fn new(name: &'a str) -> Self {
        Self { name }
    }

    /// Display name of the worker.
    #[must_use]
    pub const fn name(&self) -> &'a str {
        self.name
    }

    /// Id of the dispatch thread running the callback.
    #[must_use]
    pub fn thread_id(&self) -> ThreadId {
        thread::current().id()
    }
}

/// Per-worker message processing.
pub trait Handler: Send + 'static {
    /// Owned payload type accepted by [`Worker::post`](crate::runtime::worker::Worker::post).
    type Payload: Send + 'static;

    /// Processes one posted payload. The payload is released when this returns.
    fn on_payload(&mut self, ctx: &Context<'_>, payload: Self::Payload);

    /// Called for every timer tick.
    fn on_tick(&mut self, _ctx: &Context<'_>) {}

    /// Called once after the queue has been drained, just before the dispatch
    /// thread terminates.
    fn on_exit(&mut self, _ctx: &Context<'_>) {}
}

/// Adapts a closure into a [`Handler`] that ignores ticks.
pub struct FnHandler<F, T> {
    f: F,
    _payload: PhantomData<fn(T)>,
}

/// Wraps `f` as a handler for payloads of type `T`.
pub fn handler_fn<T, F>(f: F) -> FnHandler<F, T>
where
    T: Send + 'static,
    F: FnMut(&Context<'_>, T) + Send + 'static,
{
    FnHandler {
        f,
        _payload: PhantomData,
    }
}

impl<T, F> Handler for FnHandler<F, T>
where
    T: Send + 'static,
    F: FnMut(&Context<'_>, T) + Send + 'static,
{
    type Payload = T;

    fn on_payload(&mut self, ctx: &Context<'_>, payload: T) {
        (self.f)(ctx, payload);
    }
}

/// Record understood by [`EchoHandler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserData {
    pub msg: String,
    pub year: i32,
}

impl UserData {
    pub fn new(msg: impl Into<String>, year: i32) -> Self {
        Self {
            msg: msg.into(),
            year,
        }
    }
}

/// Writes one human-readable line per event to `out`.
///
/// ```text
/// Hello World 2020 on WorkerThread1
/// Timer expired on WorkerThread1
/// Exit thread on WorkerThread1
/// ```
#[derive(Debug)]
pub struct EchoHandler<W> {
    out: W,
}

impl EchoHandler<io::Stdout> {
    #[must_use]
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send + 'static> EchoHandler<W> {
    pub const fn new(out: W) -> Self {
        Self { out }
    }

    pub const fn get_ref(&self) -> &W {
        &self.out
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn emit(&mut self, line: Arguments<'_>) {
        let written = writeln!(self.out, "{line}").and_then(|()| self.out.flush());
        if let Err(e) = written {
            warn!(error = %e, "failed to write handler output");
        }
    }
}

impl<W: Write + Send + 'static> Handler for EchoHandler<W> {
    type Payload = UserData;

    fn on_payload(&mut self, ctx: &Context<'_>, payload: UserData) {
        self.emit(format_args!("{} {} on {}", payload.msg, payload.year, ctx.name()));
    }

    fn on_tick(&mut self, ctx: &Context<'_>) {
        self.emit(format_args!("Timer expired on {}", ctx.name()));
    }

    fn on_exit(&mut self, ctx: &Context<'_>) {
        self.emit(format_args!("Exit thread on {}", ctx.name()));
    }
}

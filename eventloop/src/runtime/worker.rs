//! Worker runtime: one dispatch thread plus one timer thread per worker.
//!
//! # Architecture
//!
//! Each [`Worker`] owns a single [`MessageQueue`] and spawns two threads:
//! - **Dispatch thread**: the queue's only consumer. Pops messages in FIFO
//!   order and hands payloads and ticks to the worker's [`Handler`].
//! - **Timer thread**: started by the dispatch thread, pushes a tick into the
//!   same queue every `tick_interval`.
//!
//! Any number of caller threads [`post`](Worker::post) into the queue. Because
//! callers and the timer share one queue and one lock, the dispatch order is
//! exactly the insertion order.
//!
//! # Lifecycle
//!
//! ```text
//! Uninitialized ──create()──> Running ──exit()──> Exiting ──drain──> Stopped
//!                                ^                                      │
//!                                └──────────────create()────────────────┘
//! ```
//!
//! Shutdown is itself a message: [`exit`](Worker::exit) pushes `Exit` behind
//! everything already queued and joins the dispatch thread. On `Exit` the
//! dispatch loop stops and joins the timer, then releases (drops without
//! processing) whatever was queued after the exit request.
//!
//! # Example
//!
//! ```
//! use eventloop::runtime::config::WorkerConfig;
//! use eventloop::runtime::handler::{EchoHandler, UserData};
//! use eventloop::runtime::worker::{Worker, WorkerState};
//!
//! let worker = Worker::with_config(
//!     "WorkerThread1",
//!     EchoHandler::new(Vec::new()),
//!     WorkerConfig::default().without_timer(),
//! );
//! worker.create().expect("spawn dispatch thread");
//! worker.post(UserData::new("Hello World", 2020));
//! worker.exit();
//!
//! assert_eq!(worker.state(), WorkerState::Stopped);
//! let out = worker.into_handler().expect("handler returned").into_inner();
//! assert_eq!(
//!     String::from_utf8(out).unwrap(),
//!     "Hello World 2020 on WorkerThread1\nExit thread on WorkerThread1\n"
//! );
//! ```

mod dispatch_thread;
mod message;
mod timer_thread;

use std::io;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};

use crate::fault::fatal;
use crate::runtime::config::WorkerConfig;
use crate::runtime::handler::Handler;
use crate::sync::queue::MessageQueue;
use crate::trace::{debug, error, info};

use dispatch_thread::DispatchThread;
use message::Message;

/// Lifecycle state of a [`Worker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum WorkerState {
    /// Constructed, never created.
    Uninitialized = 0,
    /// Dispatch thread spawned and accepting messages.
    Running = 1,
    /// `exit()` requested; the dispatch loop has not finished draining.
    Exiting = 2,
    /// Dispatch thread finished; the queue is drained and closed.
    Stopped = 3,
}

impl WorkerState {
    const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Running,
            2 => Self::Exiting,
            3 => Self::Stopped,
            _ => Self::Uninitialized,
        }
    }
}

/// Error creating a worker's dispatch thread.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    /// The OS refused to spawn the dispatch thread. The handler is kept, so
    /// `create()` may be retried.
    #[error("failed to spawn dispatch thread: {0}")]
    Spawn(#[source] io::Error),
    /// A previous dispatch thread panicked and took the handler with it.
    #[error("handler was lost when a previous dispatch thread panicked")]
    HandlerLost,
}

/// Cumulative message counters of a [`Worker`], across restarts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    /// Payloads handed to [`Handler::on_payload`].
    pub processed: u64,
    /// Ticks handed to [`Handler::on_tick`].
    pub ticks: u64,
    /// Payloads released by the shutdown drain without being processed.
    pub drained_payloads: u64,
    /// Ticks released by the shutdown drain.
    pub drained_ticks: u64,
}

#[derive(Debug, Default)]
struct Counters {
    processed: AtomicU64,
    ticks: AtomicU64,
    drained_payloads: AtomicU64,
    drained_ticks: AtomicU64,
}

impl Counters {
    fn record_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    fn record_tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    fn record_drained<T>(&self, message: &Message<T>) {
        match message {
            Message::User(_) => {
                self.drained_payloads.fetch_add(1, Ordering::Relaxed);
            }
            Message::Tick => {
                self.drained_ticks.fetch_add(1, Ordering::Relaxed);
            }
            Message::Exit => {}
        }
    }

    fn snapshot(&self) -> WorkerStats {
        WorkerStats {
            processed: self.processed.load(Ordering::Relaxed),
            ticks: self.ticks.load(Ordering::Relaxed),
            drained_payloads: self.drained_payloads.load(Ordering::Relaxed),
            drained_ticks: self.drained_ticks.load(Ordering::Relaxed),
        }
    }
}

/// State shared by the worker handle, its dispatch thread and its timer thread.
pub(crate) struct Shared<T> {
    name: String,
    queue: MessageQueue<Message<T>>,
    state: AtomicU8,
    counters: Counters,
    dispatch_id: Mutex<Option<ThreadId>>,
}

impl<T> Shared<T> {
    fn new(name: String) -> Self {
        Self {
            name,
            queue: MessageQueue::new(),
            state: AtomicU8::new(WorkerState::Uninitialized as u8),
            counters: Counters::default(),
            dispatch_id: Mutex::new(None),
        }
    }

    fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: WorkerState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn dispatch_id(&self) -> Option<ThreadId> {
        *self.dispatch_id.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_dispatch_id(&self, id: Option<ThreadId>) {
        *self.dispatch_id.lock().unwrap_or_else(PoisonError::into_inner) = id;
    }

    /// OS thread name derived from the worker name. Thread names cannot hold NUL.
    fn thread_name(&self) -> String {
        self.name.replace('\0', "")
    }
}

/// Handler while parked, join handle while running. Only `create`/`exit` touch it.
struct Control<H> {
    handler: Option<H>,
    dispatch: Option<JoinHandle<H>>,
}

/// A named background worker.
///
/// All operations take `&self`, so a worker can be shared across producer
/// threads (for example behind an `Arc`). Dropping the worker runs
/// [`exit`](Self::exit).
pub struct Worker<H: Handler> {
    shared: Arc<Shared<H::Payload>>,
    config: WorkerConfig,
    control: Mutex<Control<H>>,
}

impl<H: Handler> Worker<H> {
    /// Creates a worker with the default configuration (250 ms ticks).
    pub fn new(name: impl Into<String>, handler: H) -> Self {
        Self::with_config(name, handler, WorkerConfig::default())
    }

    pub fn with_config(name: impl Into<String>, handler: H, config: WorkerConfig) -> Self {
        Self {
            shared: Arc::new(Shared::new(name.into())),
            config,
            control: Mutex::new(Control {
                handler: Some(handler),
                dispatch: None,
            }),
        }
    }

    /// Display name; also used as the dispatch thread's name (minus NUL bytes).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    #[must_use]
    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    #[must_use]
    pub fn state(&self) -> WorkerState {
        self.shared.state()
    }

    #[must_use]
    pub fn stats(&self) -> WorkerStats {
        self.shared.counters.snapshot()
    }

    fn lock_control(&self) -> MutexGuard<'_, Control<H>> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawns the dispatch thread. A no-op if it is already running.
    ///
    /// Returns once the thread is spawned, not necessarily running. A stopped
    /// worker may be created again; it resumes with the handler it exited with.
    ///
    /// # Errors
    /// - [`WorkerError::Spawn`] if the OS cannot create the thread.
    /// - [`WorkerError::HandlerLost`] if a previous run panicked.
    ///
    /// # Panics
    /// Raises a fault if called from the worker's own dispatch thread.
    pub fn create(&self) -> Result<(), WorkerError> {
        if self.is_worker_thread() {
            fatal!(ReentrantCreate, self.name());
        }

        let mut control = self.lock_control();
        // A dispatch thread that stopped without an `exit()` died unwinding.
        let dead = control.dispatch.take_if(|handle| {
            handle.is_finished() || self.shared.state() == WorkerState::Stopped
        });
        if let Some(handle) = dead {
            self.reap(&mut control, handle);
        }
        if control.dispatch.is_some() {
            debug!(worker = %self.name(), "worker already running");
            return Ok(());
        }
        let Some(handler) = control.handler.take() else {
            return Err(WorkerError::HandlerLost);
        };

        let previous = self.shared.state();
        self.shared.queue.reopen();
        self.shared.set_state(WorkerState::Running);

        // The thread takes the handler out of this slot once it starts, so a
        // failed spawn leaves the handler here.
        let slot = Arc::new(Mutex::new(Some(handler)));
        let dispatch = DispatchThread::new(Arc::clone(&self.shared), &self.config);

        let mut builder = thread::Builder::new().name(self.shared.thread_name());
        if let Some(size) = self.config.stack_size {
            builder = builder.stack_size(size);
        }

        let spawned = builder.spawn({
            let slot = Arc::clone(&slot);
            move || {
                let handler = slot.lock().unwrap_or_else(PoisonError::into_inner).take();
                let Some(handler) = handler else {
                    fatal!(MissingHandler, dispatch.worker_name());
                };
                info!("dispatch thread started");
                let handler = dispatch.run(handler);
                info!("dispatch thread exiting");
                handler
            }
        });

        match spawned {
            Ok(handle) => {
                self.shared.set_dispatch_id(Some(handle.thread().id()));
                control.dispatch = Some(handle);
                info!(
                    worker = %self.name(),
                    tick_interval = ?self.config.tick_interval,
                    "worker created"
                );
                Ok(())
            }
            Err(e) => {
                error!(worker = %self.name(), error = %e, "failed to spawn dispatch thread");
                control.handler = slot.lock().unwrap_or_else(PoisonError::into_inner).take();
                self.shared.queue.drain_and_release();
                self.shared.set_state(previous);
                Err(WorkerError::Spawn(e))
            }
        }
    }

    /// Queues `payload` for the dispatch thread, which becomes its sole owner.
    ///
    /// Never blocks. A payload that races with the shutdown drain is released
    /// as part of it and counted in [`WorkerStats::drained_payloads`].
    ///
    /// # Panics
    /// Raises a fault if the worker was never created or has stopped.
    pub fn post(&self, payload: H::Payload) {
        match self.shared.state() {
            WorkerState::Running | WorkerState::Exiting => {}
            WorkerState::Uninitialized => fatal!(PostBeforeCreate, self.name()),
            WorkerState::Stopped => fatal!(PostAfterExit, self.name()),
        }

        if let Err(rejected) = self.shared.queue.push(Message::User(payload)) {
            self.shared.counters.record_drained(&rejected);
            drop(rejected);
            debug!(worker = %self.name(), "payload posted during shutdown released");
        }
    }

    /// Stops the worker and waits for its dispatch thread to terminate.
    ///
    /// A no-op if the worker was never created or is already stopped. Messages
    /// queued before the call are processed; anything queued after it is
    /// released. Concurrent callers all return once the worker is stopped.
    ///
    /// # Panics
    /// Raises a fault if called from the worker's own dispatch thread.
    pub fn exit(&self) {
        if self.is_worker_thread() {
            fatal!(ReentrantExit, self.name());
        }

        let mut control = self.lock_control();
        let Some(handle) = control.dispatch.take() else {
            return;
        };

        info!(worker = %self.name(), "worker exiting");
        self.shared.set_state(WorkerState::Exiting);
        if self.shared.queue.push(Message::Exit).is_err() {
            debug!(worker = %self.name(), "dispatch loop already drained");
        }

        self.reap(&mut control, handle);
    }

    /// Joins a finished or finishing dispatch thread and parks its handler.
    fn reap(&self, control: &mut Control<H>, handle: JoinHandle<H>) {
        match handle.join() {
            Ok(handler) => control.handler = Some(handler),
            Err(_) => {
                error!(worker = %self.name(), "dispatch thread panicked; handler lost");
            }
        }

        // Normally empty: the dispatch loop drains on its way out, even when unwinding.
        let counters = &self.shared.counters;
        self.shared
            .queue
            .drain_and_release_with(|message| counters.record_drained(message));

        self.shared.set_dispatch_id(None);
        self.shared.set_state(WorkerState::Stopped);
        info!(worker = %self.name(), stats = ?self.stats(), "worker stopped");
    }

    /// Id of the dispatch thread, if one is running.
    #[must_use]
    pub fn thread_id(&self) -> Option<ThreadId> {
        self.shared.dispatch_id()
    }

    /// Id of the calling thread.
    #[must_use]
    pub fn current_thread_id() -> ThreadId {
        thread::current().id()
    }

    /// Whether the caller is this worker's dispatch thread.
    #[must_use]
    pub fn is_worker_thread(&self) -> bool {
        self.thread_id() == Some(Self::current_thread_id())
    }

    /// Runs `f` on the handler while it is parked (before `create` or after
    /// `exit`). Returns `None` while the dispatch thread owns it, which
    /// includes every call made from the dispatch thread.
    pub fn with_handler<R>(&self, f: impl FnOnce(&H) -> R) -> Option<R> {
        if self.is_worker_thread() {
            return None;
        }
        self.lock_control().handler.as_ref().map(f)
    }

    /// Stops the worker and returns its handler.
    ///
    /// Returns `None` if the handler was lost to a panic.
    pub fn into_handler(self) -> Option<H> {
        self.exit();
        self.lock_control().handler.take()
    }
}

impl<H: Handler> Drop for Worker<H> {
    fn drop(&mut self) {
        if self.is_worker_thread() {
            // Cannot join ourselves: ask the loop to finish and detach it.
            error!(worker = %self.name(), "worker dropped on its own dispatch thread");
            let _ = self.shared.queue.push(Message::Exit);
            return;
        }
        self.exit();
    }
}

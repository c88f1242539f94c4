//! Dispatch thread: the worker's single consumer.
//!
//! Responsibilities:
//! - Start the timer thread (and optionally pin itself to a core).
//! - Pop messages in FIFO order and route them to the handler.
//! - On `Exit`: stop and join the timer, release everything still queued,
//!   notify the handler, mark the worker stopped.
//!
//! The terminal steps live in a drop guard so they also run when the handler
//! panics and unwinds the dispatch thread.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use core_affinity::CoreId;

use crate::fault::fatal;
use crate::runtime::config::WorkerConfig;
use crate::runtime::handler::{Context, Handler};
use crate::trace::{debug, error, trace, warn};

use super::message::Message;
use super::timer_thread::{TimerHandle, TimerThread};
use super::{Shared, WorkerState};

pub(crate) struct DispatchThread<T> {
    shared: Arc<Shared<T>>,
    tick_interval: Option<Duration>,
    core: Option<usize>,
}

impl<T: Send + 'static> DispatchThread<T> {
    pub(crate) fn new(shared: Arc<Shared<T>>, config: &WorkerConfig) -> Self {
        Self {
            shared,
            tick_interval: config.tick_interval.filter(|interval| !interval.is_zero()),
            core: config.core,
        }
    }

    pub(crate) fn worker_name(&self) -> &str {
        &self.shared.name
    }

    /// Runs the dispatch loop until `Exit`, then hands the handler back.
    pub(crate) fn run<H>(self, mut handler: H) -> H
    where
        H: Handler<Payload = T>,
    {
        let shared = &*self.shared;
        shared.set_dispatch_id(Some(thread::current().id()));

        if let Some(core_id) = self.core
            && !core_affinity::set_for_current(CoreId { id: core_id })
        {
            warn!(core_id, "failed to pin dispatch thread");
        }

        let timer = self.tick_interval.map(|interval| {
            TimerThread::spawn(Arc::clone(&self.shared), interval).unwrap_or_else(|e| {
                error!(error = %e, "failed to spawn timer thread");
                fatal!(TimerSpawn, &shared.name)
            })
        });
        let mut teardown = Teardown {
            shared,
            timer,
            finished: false,
        };

        let ctx = Context::new(&shared.name);
        loop {
            let Some(message) = shared.queue.pop_blocking() else {
                fatal!(QueueClosedWhileRunning, &shared.name);
            };

            match message {
                Message::User(payload) => {
                    trace!("dispatching payload");
                    handler.on_payload(&ctx, payload);
                    shared.counters.record_processed();
                }
                Message::Tick => {
                    trace!("dispatching tick");
                    handler.on_tick(&ctx);
                    shared.counters.record_tick();
                }
                Message::Exit => break,
            }
        }

        teardown.finish();
        handler.on_exit(&ctx);
        shared.set_state(WorkerState::Stopped);
        handler
    }
}

/// Terminal transition of the dispatch loop.
struct Teardown<'a, T> {
    shared: &'a Shared<T>,
    timer: Option<TimerHandle>,
    finished: bool,
}

impl<T> Teardown<'_, T> {
    fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;

        if let Some(mut timer) = self.timer.take() {
            timer.stop_and_join();
        }

        let counters = &self.shared.counters;
        let released = self
            .shared
            .queue
            .drain_and_release_with(|message| counters.record_drained(message));
        debug!(released, "queue drained");
    }
}

impl<T> Drop for Teardown<'_, T> {
    fn drop(&mut self) {
        if !self.finished {
            error!("dispatch loop unwinding; releasing queue");
            self.finish();
            self.shared.set_state(WorkerState::Stopped);
        }
    }
}

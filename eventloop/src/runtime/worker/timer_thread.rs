//! Timer thread: periodic tick source bound to one worker.
//!
//! The timer sleeps until its next deadline, then pushes a `Tick` into the
//! worker's queue. Deadlines advance by whole intervals from the start time, so
//! a slow push does not shift every later tick. The stop flag is checked after
//! each sleep; an in-progress sleep is never interrupted, so after a stop
//! request at most one more cycle runs before the thread exits.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use minstant::Instant;

use crate::trace::{debug, error, trace};

use super::Shared;
use super::message::Message;

pub(crate) struct TimerThread<T> {
    shared: Arc<Shared<T>>,
    stop: Arc<AtomicBool>,
    interval: Duration,
}

impl<T: Send + 'static> TimerThread<T> {
    /// Spawns a timer thread feeding `shared`'s queue every `interval`.
    pub(crate) fn spawn(shared: Arc<Shared<T>>, interval: Duration) -> io::Result<TimerHandle> {
        let stop = Arc::new(AtomicBool::new(false));
        let name = format!("{}-timer", shared.thread_name());
        let timer = Self {
            shared,
            stop: Arc::clone(&stop),
            interval,
        };

        let handle = thread::Builder::new().name(name).spawn(move || {
            debug!(interval = ?timer.interval, "timer thread started");
            timer.run();
            debug!("timer thread exiting");
        })?;

        Ok(TimerHandle {
            stop,
            handle: Some(handle),
        })
    }

    fn run(&self) {
        let mut next = Instant::now() + self.interval;

        while !self.stop.load(Ordering::Acquire) {
            let now = Instant::now();
            if next > now {
                thread::sleep(next.duration_since(now));
            }

            next = next + self.interval;
            let now = Instant::now();
            if next <= now {
                // Fell a whole interval behind; skip the missed ticks.
                next = now + self.interval;
            }

            if self.stop.load(Ordering::Acquire) {
                break;
            }
            if self.shared.queue.push(Message::Tick).is_err() {
                // Queue already drained; nobody will read further ticks.
                break;
            }
            trace!("tick posted");
        }
    }
}

/// Owner's handle on a running timer thread. Dropping it stops and joins the timer.
pub(crate) struct TimerHandle {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl TimerHandle {
    /// Raises the stop flag and waits for the timer thread to finish.
    pub(crate) fn stop_and_join(&mut self) {
        self.stop.store(true, Ordering::Release);

        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            error!("timer thread panicked");
        }
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}

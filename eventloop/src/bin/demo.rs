//! Two workers, one greeting each.
//!
//! # Usage
//!
//! ```sh
//! eventloop-demo
//! EVENTLOOP_TICK_MS=100 RUST_LOG=eventloop=debug eventloop-demo
//! ```
//!
//! Each worker prints its payload and a "Timer expired" line per tick for one
//! second, then both exit in order.

use std::thread;
use std::time::Duration;

use eventloop::{EchoHandler, UserData, Worker, WorkerConfig};

/// How long the workers run before exiting.
const RUN_TIME: Duration = Duration::from_millis(1000);

fn main() {
    if let Err(e) = run() {
        eprintln!("eventloop-demo: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    eventloop::init_tracing();

    let config = WorkerConfig::from_env()?;
    let worker1 = Worker::with_config("WorkerThread1", EchoHandler::stdout(), config.clone());
    let worker2 = Worker::with_config("WorkerThread2", EchoHandler::stdout(), config);

    worker1.create()?;
    worker2.create()?;

    worker1.post(UserData::new("Hello World", 2020));
    worker2.post(UserData::new("Goodbye World", 2020));

    // Give the workers time to process and tick.
    thread::sleep(RUN_TIME);

    worker1.exit();
    worker2.exit();

    Ok(())
}

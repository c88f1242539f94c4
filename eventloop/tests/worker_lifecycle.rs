//! End-to-end tests for worker lifecycle, ordering and payload release.
//!
//! # Running with tracing
//!
//! ```bash
//! RUST_LOG=eventloop=trace cargo test --features tracing -- --nocapture
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, Once};
use std::thread;
use std::time::Duration;

use eventloop::{
    Context, EchoHandler, Handler, UserData, Worker, WorkerConfig, WorkerState, handler_fn,
};

static INIT_TRACING: Once = Once::new();

/// Initialize tracing for tests (only once).
fn init_test_tracing() {
    INIT_TRACING.call_once(|| {
        eventloop::init_tracing();
    });
}

fn no_timer() -> WorkerConfig {
    WorkerConfig::default().without_timer()
}

/// Payload that counts its own release.
struct Tracked {
    id: usize,
    drops: Arc<AtomicUsize>,
}

impl Tracked {
    fn new(id: usize, drops: &Arc<AtomicUsize>) -> Self {
        Self {
            id,
            drops: Arc::clone(drops),
        }
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Event {
    Payload(usize),
    Tick,
}

/// Records every dispatched event, in order.
struct EventLog {
    events: Arc<Mutex<Vec<Event>>>,
}

impl Handler for EventLog {
    type Payload = Tracked;

    fn on_payload(&mut self, _ctx: &Context<'_>, payload: Tracked) {
        self.events.lock().unwrap().push(Event::Payload(payload.id));
    }

    fn on_tick(&mut self, _ctx: &Context<'_>) {
        self.events.lock().unwrap().push(Event::Tick);
    }
}

#[test]
fn processes_posts_in_order_before_exit() {
    init_test_tracing();

    let worker = Worker::with_config("W", EchoHandler::new(Vec::new()), no_timer());
    assert!(worker.create().is_ok());

    worker.post(UserData::new("A", 1));
    worker.post(UserData::new("B", 2));
    worker.exit();

    assert_eq!(worker.state(), WorkerState::Stopped);
    let out = String::from_utf8(worker.into_handler().unwrap().into_inner()).unwrap();
    assert_eq!(out, "A 1 on W\nB 2 on W\nExit thread on W\n");
}

#[test]
#[should_panic(expected = "message posted after the worker exited")]
fn post_after_exit_is_a_fault() {
    let worker = Worker::with_config("W", EchoHandler::new(Vec::new()), no_timer());
    worker.create().unwrap();
    worker.post(UserData::new("A", 1));
    worker.exit();

    worker.post(UserData::new("B", 2));
}

#[test]
fn fifo_across_caller_and_timer() {
    init_test_tracing();

    let events = Arc::new(Mutex::new(Vec::new()));
    let drops = Arc::new(AtomicUsize::new(0));
    let worker = Worker::with_config(
        "fifo",
        EventLog {
            events: Arc::clone(&events),
        },
        WorkerConfig::default().with_tick_interval(Duration::from_millis(1)),
    );
    worker.create().unwrap();

    for id in 0..500 {
        worker.post(Tracked::new(id, &drops));
        if id % 50 == 0 {
            thread::sleep(Duration::from_millis(2));
        }
    }
    worker.exit();

    let events = events.lock().unwrap();
    let payloads: Vec<usize> = events
        .iter()
        .filter_map(|event| match event {
            Event::Payload(id) => Some(*id),
            Event::Tick => None,
        })
        .collect();
    assert_eq!(payloads, (0..500).collect::<Vec<_>>());
    assert!(events.contains(&Event::Tick), "ticks should interleave with payloads");
    assert_eq!(drops.load(Ordering::SeqCst), 500);
}

#[test]
fn exit_right_after_posting_releases_every_payload() {
    let drops = Arc::new(AtomicUsize::new(0));
    let worker = Worker::with_config(
        "flood",
        handler_fn(|_ctx: &Context<'_>, _payload: Tracked| {
            thread::sleep(Duration::from_micros(200));
        }),
        WorkerConfig::default().with_tick_interval(Duration::from_millis(1)),
    );
    worker.create().unwrap();

    for id in 0..200 {
        worker.post(Tracked::new(id, &drops));
    }
    worker.exit();

    let stats = worker.stats();
    assert_eq!(drops.load(Ordering::SeqCst), 200);
    assert_eq!(stats.processed + stats.drained_payloads, 200);
}

#[test]
fn payloads_queued_behind_exit_are_drained_not_processed() {
    init_test_tracing();

    let drops = Arc::new(AtomicUsize::new(0));
    let processed = Arc::new(Mutex::new(Vec::new()));
    let (started_tx, started_rx) = mpsc::channel::<()>();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let gate = Mutex::new((started_tx, release_rx));

    let worker = Arc::new(Worker::with_config(
        "gated",
        handler_fn({
            let processed = Arc::clone(&processed);
            move |_ctx: &Context<'_>, payload: Tracked| {
                if payload.id == 0 {
                    let gate = gate.lock().unwrap();
                    gate.0.send(()).unwrap();
                    gate.1.recv().unwrap();
                }
                processed.lock().unwrap().push(payload.id);
            }
        }),
        no_timer(),
    ));
    worker.create().unwrap();

    worker.post(Tracked::new(0, &drops));
    started_rx.recv().unwrap();

    let exiter = {
        let worker = Arc::clone(&worker);
        thread::spawn(move || worker.exit())
    };
    while worker.state() != WorkerState::Exiting {
        thread::yield_now();
    }
    thread::sleep(Duration::from_millis(20));

    for id in 1..=10 {
        worker.post(Tracked::new(id, &drops));
    }
    release_tx.send(()).unwrap();
    exiter.join().unwrap();

    assert_eq!(worker.state(), WorkerState::Stopped);
    assert_eq!(*processed.lock().unwrap(), vec![0]);
    assert_eq!(drops.load(Ordering::SeqCst), 11);

    let stats = worker.stats();
    assert_eq!(stats.processed, 1);
    assert_eq!(stats.drained_payloads, 10);
}

#[test]
fn repeated_exit_does_not_block_or_double_free() {
    let drops = Arc::new(AtomicUsize::new(0));
    let worker = Worker::with_config(
        "twice",
        handler_fn(|_ctx: &Context<'_>, _payload: Tracked| {}),
        no_timer(),
    );
    worker.exit();

    worker.create().unwrap();
    worker.create().unwrap();
    worker.post(Tracked::new(1, &drops));
    worker.exit();
    worker.exit();

    assert_eq!(worker.state(), WorkerState::Stopped);
    assert_eq!(drops.load(Ordering::SeqCst), 1);
    drop(worker);
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[test]
fn timer_ticks_at_configured_cadence_and_stops_on_exit() {
    init_test_tracing();

    let ticks = Arc::new(AtomicUsize::new(0));

    struct TickCounter(Arc<AtomicUsize>);

    impl Handler for TickCounter {
        type Payload = ();

        fn on_payload(&mut self, _ctx: &Context<'_>, (): ()) {}

        fn on_tick(&mut self, _ctx: &Context<'_>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    let worker = Worker::with_config(
        "ticker",
        TickCounter(Arc::clone(&ticks)),
        WorkerConfig::default().with_tick_interval(Duration::from_millis(10)),
    );
    worker.create().unwrap();
    thread::sleep(Duration::from_millis(105));
    worker.exit();

    let observed = ticks.load(Ordering::SeqCst);
    assert!(observed >= 5, "expected ~10 ticks in 100ms, got {observed}");
    assert_eq!(worker.stats().ticks, observed as u64);

    thread::sleep(Duration::from_millis(50));
    assert_eq!(ticks.load(Ordering::SeqCst), observed);
}

#[test]
fn concurrent_producers_deliver_each_payload_once() {
    const PRODUCERS: usize = 16;
    const PER_PRODUCER: usize = 50;

    let drops = Arc::new(AtomicUsize::new(0));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let worker = Worker::with_config(
        "fan-in",
        handler_fn({
            let seen = Arc::clone(&seen);
            move |_ctx: &Context<'_>, payload: Tracked| seen.lock().unwrap().push(payload.id)
        }),
        WorkerConfig::default().with_tick_interval(Duration::from_millis(1)),
    );
    worker.create().unwrap();

    thread::scope(|scope| {
        for p in 0..PRODUCERS {
            let worker = &worker;
            let drops = &drops;
            scope.spawn(move || {
                for i in 0..PER_PRODUCER {
                    worker.post(Tracked::new(p * PER_PRODUCER + i, drops));
                }
            });
        }
    });
    worker.exit();

    let total = PRODUCERS * PER_PRODUCER;
    let stats = worker.stats();
    assert_eq!(stats.processed + stats.drained_payloads, total as u64);
    assert_eq!(drops.load(Ordering::SeqCst), total);

    let mut seen = seen.lock().unwrap().clone();
    seen.sort_unstable();
    seen.dedup();
    assert_eq!(seen.len() as u64, stats.processed);
}

#[test]
fn handler_sees_worker_name_and_dispatch_thread() {
    let (tx, rx) = mpsc::channel();
    let worker = Worker::with_config(
        "named",
        handler_fn(move |ctx: &Context<'_>, (): ()| {
            let thread_name = thread::current().name().map(str::to_owned);
            tx.send((ctx.name().to_owned(), ctx.thread_id(), thread_name))
                .unwrap();
        }),
        no_timer(),
    );
    worker.create().unwrap();
    worker.post(());

    let (name, thread_id, thread_name) = rx.recv().unwrap();
    assert_eq!(name, "named");
    assert_eq!(Some(thread_id), worker.thread_id());
    assert_eq!(thread_name.as_deref(), Some("named"));
    worker.exit();
}

#[test]
fn dropping_a_running_worker_stops_it() {
    let drops = Arc::new(AtomicUsize::new(0));
    {
        let worker = Worker::new(
            "dropped",
            handler_fn(|_ctx: &Context<'_>, _payload: Tracked| {}),
        );
        worker.create().unwrap();
        for id in 0..10 {
            worker.post(Tracked::new(id, &drops));
        }
    }
    assert_eq!(drops.load(Ordering::SeqCst), 10);
}

#[test]
fn pinned_worker_with_custom_stack_processes_payloads() {
    init_test_tracing();

    let worker = Worker::with_config(
        "pinned",
        EchoHandler::new(Vec::new()),
        WorkerConfig::default()
            .with_tick_interval(Duration::from_millis(5))
            .with_core(0)
            .with_stack_size(256 * 1024),
    );
    worker.create().unwrap();
    worker.post(UserData::new("pinned", 2020));
    worker.exit();

    assert_eq!(worker.state(), WorkerState::Stopped);
    assert_eq!(worker.stats().processed, 1);
    let out = String::from_utf8(worker.into_handler().unwrap().into_inner()).unwrap();
    assert!(out.contains("pinned 2020 on pinned\n"), "unexpected output: {out:?}");
    assert!(out.ends_with("Exit thread on pinned\n"));
}

//! Fatal assertion reporting.
//!
//! Broken invariants such as posting to a worker that is not running, or
//! tearing a worker down from its own dispatch thread, are programming errors
//! rather than operational failures. They are reported through a process-wide
//! hook and then unwind with a panic carrying the fault description.
//!
//! Install [`abort_hook`] to halt the process on the first fault instead of
//! unwinding:
//!
//! ```no_run
//! eventloop::fault::set_hook(eventloop::fault::abort_hook);
//! ```

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::sync::{PoisonError, RwLock};

use crate::trace::error;

/// Callback invoked with every fault before the library panics.
pub type FaultHook = fn(&Fault);

static HOOK: RwLock<Option<FaultHook>> = RwLock::new(None);

/// Category of a broken invariant.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
#[non_exhaustive]
pub enum FaultKind {
    /// `post` was called on a worker that was never created.
    PostBeforeCreate,
    /// `post` was called on a worker that has already stopped.
    PostAfterExit,
    /// `exit` was called from the worker's own dispatch thread.
    ReentrantExit,
    /// `create` was called from the worker's own dispatch thread.
    ReentrantCreate,
    /// The queue was closed underneath a running dispatch loop.
    QueueClosedWhileRunning,
    /// The dispatch thread could not start its timer thread.
    TimerSpawn,
    /// The dispatch thread started without a handler to run.
    MissingHandler,
}

impl FaultKind {
    const fn label(self) -> &'static str {
        match self {
            Self::PostBeforeCreate => "message posted before the worker was created",
            Self::PostAfterExit => "message posted after the worker exited",
            Self::ReentrantExit => "exit requested from the worker's own dispatch thread",
            Self::ReentrantCreate => "create requested from the worker's own dispatch thread",
            Self::QueueClosedWhileRunning => "message queue closed while the dispatch loop was running",
            Self::TimerSpawn => "failed to spawn the timer thread",
            Self::MissingHandler => "dispatch thread started without a handler",
        }
    }
}

/// A detected invariant violation.
#[derive(Clone, Debug)]
pub struct Fault {
    kind: FaultKind,
    worker: String,
    file: &'static str,
    line: u32,
}

impl Fault {
    pub(crate) fn new(kind: FaultKind, worker: &str, file: &'static str, line: u32) -> Self {
        Self {
            kind,
            worker: worker.to_owned(),
            file,
            line,
        }
    }

    #[must_use]
    pub const fn kind(&self) -> FaultKind {
        self.kind
    }

    /// Name of the worker the fault was detected on.
    #[must_use]
    pub fn worker(&self) -> &str {
        &self.worker
    }

    /// Source location that raised the fault.
    #[must_use]
    pub const fn location(&self) -> (&'static str, u32) {
        (self.file, self.line)
    }
}

impl Display for Fault {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(
            f,
            "{}:{}: worker `{}`: {}",
            self.file,
            self.line,
            self.worker,
            self.kind.label()
        )
    }
}

/// Installs `hook` as the process-wide fault hook, replacing any previous one.
pub fn set_hook(hook: FaultHook) {
    *HOOK.write().unwrap_or_else(PoisonError::into_inner) = Some(hook);
}

/// Removes and returns the installed fault hook.
pub fn take_hook() -> Option<FaultHook> {
    HOOK.write().unwrap_or_else(PoisonError::into_inner).take()
}

/// Prints the fault to stderr and aborts the process without unwinding.
pub fn abort_hook(fault: &Fault) {
    eprintln!("(SysInv) a worker invariant has been broken: {fault}");
    std::process::abort();
}

#[cold]
pub(crate) fn raise(fault: Fault) -> ! {
    error!(
        kind = ?fault.kind,
        worker = %fault.worker,
        file = fault.file,
        line = fault.line,
        "fatal assertion"
    );

    let hook = *HOOK.read().unwrap_or_else(PoisonError::into_inner);
    if let Some(hook) = hook {
        hook(&fault);
    }

    panic!("{fault}");
}

/// Raises a [`Fault`] of the given kind for the named worker.
macro_rules! fatal {
    ($kind:ident, $worker:expr $(,)?) => {
        $crate::fault::raise($crate::fault::Fault::new(
            $crate::fault::FaultKind::$kind,
            $worker,
            ::std::file!(),
            ::std::line!(),
        ))
    };
}

pub(crate) use fatal;

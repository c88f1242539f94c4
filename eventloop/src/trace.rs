//! Logging for the worker runtime.
//!
//! With `--features tracing` the crate logs through `tracing`. Without it the
//! log macros expand to dead code: nothing is formatted or emitted, but the
//! field values are still type-checked and count as used.

/// Installs a fmt subscriber that prints thread names, thread ids and uptime.
///
/// The filter comes from `RUST_LOG`, falling back to `eventloop=debug`. Only
/// the first call installs anything. Does nothing without the `tracing`
/// feature.
#[cfg(feature = "tracing")]
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::fmt::time::uptime;

    let installed = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("eventloop=debug")),
        )
        .with_thread_names(true)
        .with_thread_ids(true)
        .with_timer(uptime())
        .try_init();
    if installed.is_err() {
        tracing::debug!("global subscriber already set");
    }
}

#[cfg(not(feature = "tracing"))]
pub const fn init_tracing() {}

#[cfg(feature = "tracing")]
pub(crate) use tracing::{debug, error, info, trace, warn};

/// Accepts the `tracing` call forms used in this crate and logs nothing.
#[cfg(not(feature = "tracing"))]
macro_rules! discard {
    () => {};
    ($message:literal $(, $arg:expr)* $(,)?) => {
        $(
            if false {
                let _ = &$arg;
            }
        )*
    };
    ($field:ident = % $value:expr $(, $($rest:tt)*)?) => {
        if false {
            let _ = &$value;
        }
        $( $crate::trace::discard!($($rest)*); )?
    };
    ($field:ident = ? $value:expr $(, $($rest:tt)*)?) => {
        if false {
            let _ = &$value;
        }
        $( $crate::trace::discard!($($rest)*); )?
    };
    ($field:ident = $value:expr $(, $($rest:tt)*)?) => {
        if false {
            let _ = &$value;
        }
        $( $crate::trace::discard!($($rest)*); )?
    };
    ($field:ident $(, $($rest:tt)*)?) => {
        if false {
            let _ = &$field;
        }
        $( $crate::trace::discard!($($rest)*); )?
    };
}

#[cfg(not(feature = "tracing"))]
pub(crate) use {
    discard, discard as debug, discard as error, discard as info, discard as trace,
    discard as warn,
};

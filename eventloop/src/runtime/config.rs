//! Worker configuration.
//!
//! Settings can be built in code or read from the environment:
//!
//! | Variable | Meaning | Default |
//! |----------|---------|---------|
//! | `EVENTLOOP_TICK_MS` | Timer interval in milliseconds, `0` disables the timer | `250` |
//! | `EVENTLOOP_CORE` | CPU core the dispatch thread is pinned to | unpinned |
//! | `EVENTLOOP_STACK_SIZE` | Dispatch thread stack size in bytes | platform default |

use std::num::ParseIntError;
use std::str::FromStr;
use std::time::Duration;

/// Default interval between timer ticks.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(250);

pub const TICK_MS_VAR: &str = "EVENTLOOP_TICK_MS";
pub const CORE_VAR: &str = "EVENTLOOP_CORE";
pub const STACK_SIZE_VAR: &str = "EVENTLOOP_STACK_SIZE";

/// Error reading a [`WorkerConfig`] from the environment.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A variable was set to something that is not a non-negative integer.
    #[error("invalid value {value:?} for {var}: {source}")]
    Invalid {
        var: &'static str,
        value: String,
        #[source]
        source: ParseIntError,
    },
}

/// Configuration for a single worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Interval between timer ticks. `None` runs the worker without a timer.
    pub tick_interval: Option<Duration>,
    /// CPU core to pin the dispatch thread to. `None` leaves placement to the OS.
    pub core: Option<usize>,
    /// Stack size for the dispatch thread. `None` uses the platform default.
    pub stack_size: Option<usize>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Some(DEFAULT_TICK_INTERVAL),
            core: None,
            stack_size: None,
        }
    }
}

impl WorkerConfig {
    /// Reads the configuration from `EVENTLOOP_*` environment variables.
    ///
    /// Unset variables keep their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Reads the configuration through `lookup`, which maps a variable name
    /// to its value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(ms) = parse_var::<u64, _>(&lookup, TICK_MS_VAR)? {
            config.tick_interval = (ms > 0).then(|| Duration::from_millis(ms));
        }
        if let Some(core) = parse_var(&lookup, CORE_VAR)? {
            config.core = Some(core);
        }
        if let Some(size) = parse_var(&lookup, STACK_SIZE_VAR)? {
            config.stack_size = Some(size);
        }

        Ok(config)
    }

    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = Some(interval);
        self
    }

    pub fn without_timer(mut self) -> Self {
        self.tick_interval = None;
        self
    }

    pub fn with_core(mut self, core: usize) -> Self {
        self.core = Some(core);
        self
    }

    pub fn with_stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }
}

fn parse_var<T, F>(lookup: &F, var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr<Err = ParseIntError>,
    F: Fn(&str) -> Option<String>,
{
    let Some(value) = lookup(var) else {
        return Ok(None);
    };

    value
        .trim()
        .parse()
        .map(Some)
        .map_err(|source| ConfigError::Invalid { var, value, source })
}

//! Thin logging wrappers so the rest of the crate logs through one place.
//!
//! Kept as macros (rather than calling `log::` directly everywhere) so the backend can be swapped
//! without touching call sites, matching the convention in the wider fieldbus-master ecosystem
//! this crate is modeled on.

macro_rules! trace {
    ($($arg:tt)*) => {
        log::trace!($($arg)*)
    };
}

macro_rules! debug {
    ($($arg:tt)*) => {
        log::debug!($($arg)*)
    };
}

macro_rules! warn {
    ($($arg:tt)*) => {
        log::warn!($($arg)*)
    };
}

macro_rules! error {
    ($($arg:tt)*) => {
        log::error!($($arg)*)
    };
}

/// Log at `$level`, gated by a per-master [`log::LevelFilter`] rather than the global one, so
/// `Master::set_debug_level` can turn call-site chatter up or down independently of the
/// process-wide log level the CLI/gateway binaries configure.
macro_rules! log_at {
    ($filter:expr, $level:expr, $($arg:tt)*) => {
        if $level <= $filter {
            log::log!($level, $($arg)*);
        }
    };
}

/// `.expect()` with a message, for conditions that are invariants rather than caller mistakes.
///
/// Using this instead of a bare `.unwrap()` marks the call site as "this really cannot fail
/// given the surrounding checks" rather than "I didn't think about the error case".
macro_rules! unwrap {
    ($expr:expr) => {
        match $expr {
            Ok(value) => value,
            Err(e) => panic!("unreachable: {e:?}"),
        }
    };
    ($expr:expr, $msg:literal $(, $arg:expr)*) => {
        match $expr {
            Ok(value) => value,
            Err(e) => panic!(concat!($msg, ": {e:?}") $(, $arg)*, e = e),
        }
    };
}

pub(crate) use debug;
pub(crate) use error;
pub(crate) use log_at;
pub(crate) use trace;
pub(crate) use unwrap;
pub(crate) use warn;

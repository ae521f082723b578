//! Logging front end. Each macro forwards to `defmt` or `log`, whichever feature is enabled, and
//! expands to nothing when neither is.

macro_rules! log_at {
    ($level:ident, $($arg:tt)*) => {
        #[cfg(feature = "defmt")]
        ::defmt::$level!($($arg)*);

        #[cfg(feature = "log")]
        ::log::$level!($($arg)*);
    };
}

macro_rules! trace {
    ($($arg:tt)*) => {
        $crate::log::log_at!(trace, $($arg)*)
    };
}

macro_rules! debug {
    ($($arg:tt)*) => {
        $crate::log::log_at!(debug, $($arg)*)
    };
}

// `warn` and `error` would shadow the built-in attributes of the same name.
macro_rules! warn_log {
    ($($arg:tt)*) => {
        $crate::log::log_at!(warn, $($arg)*)
    };
}

macro_rules! error_log {
    ($($arg:tt)*) => {
        $crate::log::log_at!(error, $($arg)*)
    };
}

pub(crate) use {debug, error_log, log_at, trace, warn_log};

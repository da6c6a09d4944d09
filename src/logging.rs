//! Logging setup and the protocol-direction macros.
//!
//! SMTP traffic is easiest to read when each line carries its direction, so
//! events are tagged with one of three targets: `postern::incoming` for
//! client commands, `postern::outgoing` for replies we send, and
//! `postern::internal` for everything the server does on its own (queueing,
//! scanning, relay outcomes). A capture of one busy connection can then be
//! split apart with a target filter alone.
//!
//! Every macro defaults to TRACE; pass `level = INFO` (or any other
//! `tracing::Level`) for events that should survive the release-build
//! filter.

use tracing::level_filters::LevelFilter;

#[macro_export]
macro_rules! incoming {
    (level = $level:ident, $($arg:tt)*) => {
        $crate::tracing::event!(
            target: "postern::incoming",
            $crate::tracing::Level::$level,
            $($arg)*
        )
    };

    ($($arg:tt)*) => {
        $crate::incoming!(level = TRACE, $($arg)*)
    };
}

#[macro_export]
macro_rules! outgoing {
    (level = $level:ident, $($arg:tt)*) => {
        $crate::tracing::event!(
            target: "postern::outgoing",
            $crate::tracing::Level::$level,
            $($arg)*
        )
    };

    ($($arg:tt)*) => {
        $crate::outgoing!(level = TRACE, $($arg)*)
    };
}

#[macro_export]
macro_rules! internal {
    (level = $level:ident, $($arg:tt)*) => {
        $crate::tracing::event!(
            target: "postern::internal",
            $crate::tracing::Level::$level,
            $($arg)*
        )
    };

    ($($arg:tt)*) => {
        $crate::internal!(level = TRACE, $($arg)*)
    };
}

/// Installs the global subscriber.
///
/// The level comes from `LOG_LEVEL` (any spelling `LevelFilter` parses:
/// `off`, `error`, `warn`, `info`, `debug`, `trace`). Without it, debug
/// builds log everything and release builds stop at INFO.
pub fn init() {
    let level = std::env::var("LOG_LEVEL")
        .ok()
        .and_then(|value| value.parse::<LevelFilter>().ok())
        .unwrap_or(if cfg!(debug_assertions) {
            LevelFilter::TRACE
        } else {
            LevelFilter::INFO
        });

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .init();
}

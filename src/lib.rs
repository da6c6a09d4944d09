#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

#[cfg(not(unix))]
compile_error!("Only unix-like targets are currently supported");

pub use tracing;

pub mod address;
pub mod config;
pub mod envelope;
pub mod logging;
pub mod relay;
pub mod smtp;
pub mod spool;

pub use config::Config;

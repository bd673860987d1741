use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::overlay::OverlayError;
use crate::watchdog::WatchdogExpired;

/// Failures surfaced to the emulator side of the bridge.
#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("failed to read script '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to compile script '{}': {message}", path.display())]
    Compile { path: PathBuf, message: String },
    #[error("script runtime error: {0}")]
    Runtime(String),
    #[error(transparent)]
    Watchdog(#[from] WatchdogExpired),
    #[error("address {0:#x} is outside the 32-bit address space")]
    AddressOutOfRange(i64),
    #[error("hook span of {len} bytes exceeds the configured limit of {max} bytes")]
    SpanTooLarge { len: u64, max: u32 },
    #[error(transparent)]
    Overlay(#[from] OverlayError),
}

impl From<mlua::Error> for ScriptError {
    fn from(err: mlua::Error) -> Self {
        ScriptError::Runtime(err.to_string())
    }
}

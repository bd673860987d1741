pub mod callbacks;
pub mod cli;
pub mod config;
pub mod console;
pub mod error;
pub mod hook_index;
pub mod hooks;
pub mod host;
pub mod joypad;
pub mod overlay;
pub mod runner;
pub mod script_harness;
pub mod scripts;
pub mod watchdog;

pub use error::ScriptError;
pub use host::{EmulatorHost, RamHost};
pub use runner::{run_with_overrides, RunSummary};
pub use scripts::{ScriptHost, ScriptState};

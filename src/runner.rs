use anyhow::{bail, Context, Result};
use tracing::{debug, info};

use crate::callbacks::EventKind;
use crate::cli::CliOverrides;
use crate::config::BridgeConfig;
use crate::host::RamHost;
use crate::joypad::PORT_COUNT;
use crate::scripts::{ScriptHost, ScriptState};

const BYTES_PER_PIXEL: usize = 4;

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub frames_run: u32,
    pub state: ScriptState,
    pub error: Option<String>,
    pub messages: Vec<String>,
}

/// Loads the script named on the command line and drives it against a [`RamHost`] until it
/// stops or the frame limit is reached.
pub fn run_with_overrides(cli: &CliOverrides) -> Result<RunSummary> {
    let Some(script_path) = cli.script() else {
        bail!("--script <path> is required");
    };
    let mut config = match cli.config_path() {
        Some(path) => BridgeConfig::load(path)?,
        None => BridgeConfig::default(),
    };
    let overrides = cli.config_overrides();
    if !overrides.is_empty() {
        info!(fields = ?overrides.applied_fields(), "applying command-line overrides");
        config.apply_overrides(&overrides);
    }

    let (width, height) = (config.overlay.width, config.overlay.height);
    let pitch = width as usize * BYTES_PER_PIXEL;
    let mut frame = vec![0u8; pitch * height as usize];
    let mut script = ScriptHost::new(config, RamHost::default());
    script.load(script_path).with_context(|| format!("Failed to start script {}", script_path.display()))?;

    let mut frames_run = 0;
    while frames_run < cli.frames() && script.is_script_running() {
        script.frame_boundary();
        script.call_registered(EventKind::BeforeFrame);
        for port in 0..PORT_COUNT as i64 {
            if script.is_joypad_overridden(port) {
                let buttons = script.read_overridden_joypad(port);
                debug!(port, buttons = ?buttons, "script input");
            }
        }
        script.call_registered(EventKind::AfterFrame);
        frame.fill(0);
        if script.composite_overlay(&mut frame, pitch, width, height) {
            debug!(frame = script.host().frame, "overlay drawn");
        }
        script.host_mut().advance_frame();
        frames_run += 1;
    }
    script.stop();

    let messages = script.host().messages.clone();
    Ok(RunSummary {
        frames_run,
        state: script.state(),
        error: script.last_error().map(str::to_string),
        messages,
    })
}

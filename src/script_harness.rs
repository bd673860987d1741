use std::fs::File;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::callbacks::EventKind;
use crate::config::{BridgeConfig, BridgeConfigOverrides};
use crate::console::ConsoleEntry;
use crate::error::ScriptError;
use crate::hooks::HookKind;
use crate::host::{EmulatorHost, RamHost};
use crate::joypad::{Buttons, PORT_COUNT};
use crate::overlay::ColorDepth;
use crate::scripts::{ScriptHost, ScriptState, MAX_ACCESS_SIZE};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HarnessFixture {
    #[serde(default = "default_script")]
    pub script: String,
    #[serde(default = "default_frames")]
    pub frames: u32,
    #[serde(default = "default_seed")]
    pub seed: Option<u64>,
    #[serde(default = "default_memory_size")]
    pub memory_size: usize,
    #[serde(default = "default_color_depth")]
    pub color_depth: u32,
    #[serde(default)]
    pub watchdog_budget: Option<u32>,
    #[serde(default)]
    pub instruction_interval: Option<u32>,
    /// Buttons physically held, per frame and zero-based port.
    #[serde(default)]
    pub inputs: Vec<FixtureInput>,
    /// Memory traffic the emulated machine performs during a frame.
    #[serde(default)]
    pub accesses: Vec<FixtureAccess>,
    /// Lifecycle events the host raises during a frame, by label.
    #[serde(default)]
    pub events: Vec<FixtureEvent>,
    #[serde(default)]
    pub watch: Vec<WatchRange>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FixtureInput {
    pub frame: u32,
    #[serde(default)]
    pub port: usize,
    pub buttons: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FixtureAccess {
    pub frame: u32,
    #[serde(default = "default_access_kind")]
    pub kind: String,
    pub address: u32,
    #[serde(default = "default_access_size")]
    pub size: u32,
    #[serde(default)]
    pub value: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FixtureEvent {
    pub frame: u32,
    pub event: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WatchRange {
    pub address: u32,
    pub length: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HarnessOutput {
    pub script: String,
    pub frames: u32,
    /// Console output produced while the script ran up to its first frame advance.
    pub startup: Vec<ConsoleEntry>,
    pub results: Vec<FrameResult>,
    pub final_state: ScriptState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<String>,
    pub paused: bool,
    pub throttle: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FrameResult {
    pub frame: u32,
    pub state: ScriptState,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub console: Vec<ConsoleEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub joypads: Vec<JoypadSummary>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub memory: Vec<MemorySummary>,
    /// Frame pixels the overlay touched after compositing onto a black frame.
    pub overlay_pixels: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JoypadSummary {
    pub port: usize,
    pub overridden: bool,
    pub buttons: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemorySummary {
    pub address: u32,
    pub bytes: Vec<u8>,
}

/// Drives `fixture.script` against a [`RamHost`] for `fixture.frames` frames and records what
/// the script did each frame.
pub fn run_fixture(fixture: &HarnessFixture) -> Result<HarnessOutput> {
    let mut config = BridgeConfig::default();
    config.apply_overrides(&BridgeConfigOverrides {
        watchdog_budget: fixture.watchdog_budget,
        instruction_interval: fixture.instruction_interval,
        seed: fixture.seed,
    });
    let (width, height) = (config.overlay.width as usize, config.overlay.height as usize);
    let bpp = ColorDepth::from_bits(fixture.color_depth)
        .with_context(|| format!("fixture color depth {}", fixture.color_depth))?
        .bytes_per_pixel();

    let accesses = fixture
        .accesses
        .iter()
        .map(|access| {
            HookKind::from_label(&access.kind)
                .map(|kind| (access, kind))
                .ok_or_else(|| anyhow!("unknown access kind '{}' in frame {}", access.kind, access.frame))
        })
        .collect::<Result<Vec<_>>>()?;
    let events = fixture
        .events
        .iter()
        .map(|event| {
            EventKind::from_label(&event.event)
                .map(|kind| (event.frame, kind))
                .ok_or_else(|| anyhow!("unknown event '{}' in frame {}", event.event, event.frame))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut host = RamHost::new(fixture.memory_size);
    host.color_depth = fixture.color_depth;
    let mut script = ScriptHost::new(config, host);

    // Compile failures are part of the transcript; an unreadable script is a broken fixture.
    let error = match script.load(&fixture.script) {
        Ok(()) => None,
        Err(err @ ScriptError::Read { .. }) => {
            return Err(err).with_context(|| format!("loading fixture script '{}'", fixture.script));
        }
        Err(err) => Some(err.to_string()),
    };
    let startup = take_console(&script);

    let mut results = Vec::with_capacity(fixture.frames as usize);
    let mut frame_buffer = vec![0u8; width * height * bpp];
    for frame in 0..fixture.frames {
        let mut held = [Buttons::empty(); PORT_COUNT];
        for input in fixture.inputs.iter().filter(|input| input.frame == frame) {
            let port = input.port.min(PORT_COUNT - 1);
            for name in &input.buttons {
                let button = Buttons::from_guest_name(name)
                    .ok_or_else(|| anyhow!("unknown button '{name}' in frame {frame}"))?;
                held[port] |= button;
            }
        }
        script.host_mut().joypads = held;

        script.frame_boundary();
        script.call_registered(EventKind::BeforeFrame);

        for (access, kind) in accesses.iter().filter(|(access, _)| access.frame == frame) {
            match kind {
                HookKind::Write => script.write_memory(access.address, access.size, access.value),
                kind => {
                    let size = if kind.is_write() {
                        let size = access.size.min(MAX_ACCESS_SIZE);
                        store_le(&mut script.host_mut(), access.address, size, access.value);
                        size
                    } else {
                        access.size
                    };
                    script.notify_access(access.address, size, access.value, *kind);
                }
            }
        }
        for (_, event) in events.iter().filter(|(at, _)| *at == frame) {
            script.call_registered(*event);
        }
        let joypads = summarize_joypads(&script);

        script.call_registered(EventKind::AfterFrame);

        frame_buffer.fill(0);
        script.composite_overlay(&mut frame_buffer, width * bpp, width as u32, height as u32);
        let overlay_pixels = frame_buffer.chunks_exact(bpp).filter(|pixel| pixel.iter().any(|b| *b != 0)).count();

        script.host_mut().advance_frame();
        let memory = fixture
            .watch
            .iter()
            .map(|range| MemorySummary { address: range.address, bytes: read_range(&script.host(), range) })
            .collect();

        results.push(FrameResult {
            frame,
            state: script.state(),
            console: take_console(&script),
            joypads,
            memory,
            overlay_pixels,
        });
    }

    let host = script.host();
    Ok(HarnessOutput {
        script: fixture.script.clone(),
        frames: fixture.frames,
        startup,
        results,
        final_state: script.state(),
        error: error.or_else(|| script.last_error().map(str::to_string)),
        messages: host.messages.clone(),
        paused: host.paused,
        throttle: host.throttle,
    })
}

pub fn load_fixture<P: AsRef<Path>>(path: P) -> Result<HarnessFixture> {
    let file = File::open(path.as_ref()).with_context(|| format!("opening fixture '{}'", path.as_ref().display()))?;
    serde_json::from_reader(file).with_context(|| "parsing fixture JSON")
}

fn take_console(script: &ScriptHost<RamHost>) -> Vec<ConsoleEntry> {
    let entries = script.console().to_vec();
    script.clear_console();
    entries
}

fn store_le(host: &mut RamHost, address: u32, size: u32, value: u32) {
    for (offset, byte) in value.to_le_bytes().into_iter().take(size as usize).enumerate() {
        host.write_byte(address.wrapping_add(offset as u32), byte);
    }
}

fn read_range(host: &RamHost, range: &WatchRange) -> Vec<u8> {
    (0..range.length).map(|offset| host.read_byte(range.address.wrapping_add(offset))).collect()
}

fn summarize_joypads(script: &ScriptHost<RamHost>) -> Vec<JoypadSummary> {
    (0..PORT_COUNT)
        .filter_map(|port| {
            let overridden = script.is_joypad_overridden(port as i64);
            let buttons =
                if overridden { script.read_overridden_joypad(port as i64) } else { script.host().joypads[port] };
            (overridden || !buttons.is_empty()).then(|| JoypadSummary {
                port,
                overridden,
                buttons: buttons.names().map(str::to_string).collect(),
            })
        })
        .collect()
}

fn default_script() -> String {
    "tests/fixtures/script_harness/main.lua".to_string()
}

fn default_frames() -> u32 {
    3
}

fn default_seed() -> Option<u64> {
    Some(1)
}

fn default_memory_size() -> usize {
    RamHost::DEFAULT_MEMORY_SIZE
}

fn default_color_depth() -> u32 {
    32
}

fn default_access_kind() -> String {
    HookKind::Write.label().to_string()
}

fn default_access_size() -> u32 {
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixture_defaults_fill_missing_fields() {
        let fixture: HarnessFixture = serde_json::from_str(r#"{ "accesses": [{ "frame": 1, "address": 16 }] }"#)
            .expect("parse fixture");
        assert_eq!(fixture.frames, 3);
        assert_eq!(fixture.seed, Some(1));
        assert_eq!(fixture.color_depth, 32);
        assert_eq!(fixture.accesses[0].kind, "write");
        assert_eq!(fixture.accesses[0].size, 1);
    }

    #[test]
    fn unknown_access_kind_is_rejected() {
        let fixture: HarnessFixture = serde_json::from_str(
            r#"{ "script": "missing.lua", "accesses": [{ "frame": 0, "kind": "poke", "address": 0 }] }"#,
        )
        .expect("parse fixture");
        let err = run_fixture(&fixture).unwrap_err();
        assert!(err.to_string().contains("unknown access kind 'poke'"), "got: {err}");
    }

    #[test]
    fn unreadable_script_fails_the_fixture() {
        let fixture: HarnessFixture =
            serde_json::from_str(r#"{ "script": "definitely/not/here.lua" }"#).expect("parse fixture");
        assert!(run_fixture(&fixture).is_err());
    }
}

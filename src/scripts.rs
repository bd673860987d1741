use std::cell::{Ref, RefCell, RefMut};
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;

use mlua::{Function, Lua, MultiValue, RegistryKey, Thread, ThreadStatus};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::callbacks::EventKind;
use crate::config::BridgeConfig;
use crate::console::{ConsoleEntry, ConsoleKind};
use crate::error::ScriptError;
use crate::hooks::HookKind;
use crate::host::EmulatorHost;
use crate::joypad::{resolve_port, Buttons, JoypadSource};
use crate::overlay::PixelLayout;

mod api;
mod context;

pub use api::{MAX_THROTTLE, MIN_THROTTLE};
pub use context::ScriptContext;
use context::{CallbackScope, SharedHost};

/// Widest access the host write path stores in one call.
pub const MAX_ACCESS_SIZE: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptState {
    NotLoaded,
    Loaded,
    Running,
    Suspended,
    Stopped,
    Crashed,
}

impl ScriptState {
    /// Loaded, running or waiting for the next frame.
    pub fn is_active(self) -> bool {
        matches!(self, ScriptState::Loaded | ScriptState::Running | ScriptState::Suspended)
    }
}

struct LuaRuntime {
    lua: Lua,
    thread: RegistryKey,
}

enum ResumeOutcome {
    FrameAdvance,
    Yielded,
    Finished,
    Failed(ScriptError),
}

/// Host-facing side of the bridge: owns the emulator handle and the guest interpreter, and drives
/// the script once per frame.
///
/// Guest API calls reach the emulator through the same shared handle, so borrows taken with
/// [`ScriptHost::host`] or [`ScriptHost::host_mut`] must be released before calling back in.
pub struct ScriptHost<H: EmulatorHost + 'static> {
    host: Rc<RefCell<H>>,
    ctx: Rc<ScriptContext>,
    runtime: Option<LuaRuntime>,
    state: ScriptState,
    script_path: Option<PathBuf>,
    error: Option<String>,
}

impl<H: EmulatorHost + 'static> ScriptHost<H> {
    pub fn new(config: BridgeConfig, host: H) -> Self {
        let host = Rc::new(RefCell::new(host));
        let shared: SharedHost = host.clone();
        Self {
            host,
            ctx: Rc::new(ScriptContext::new(config, shared)),
            runtime: None,
            state: ScriptState::NotLoaded,
            script_path: None,
            error: None,
        }
    }

    pub fn host(&self) -> Ref<'_, H> {
        self.host.borrow()
    }

    pub fn host_mut(&self) -> RefMut<'_, H> {
        self.host.borrow_mut()
    }

    pub fn state(&self) -> ScriptState {
        self.state
    }

    /// True from a successful load until the script stops, crashes or finishes.
    pub fn is_script_running(&self) -> bool {
        self.runtime.is_some() && self.ctx.flags.running.get()
    }

    pub fn config(&self) -> &BridgeConfig {
        self.ctx.config()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn script_path(&self) -> Option<&Path> {
        self.script_path.as_deref()
    }

    pub fn console(&self) -> Arc<[ConsoleEntry]> {
        self.ctx.console.borrow_mut().entries()
    }

    pub fn clear_console(&self) {
        self.ctx.console.borrow_mut().clear();
    }

    pub fn active_hook_count(&self, kind: HookKind) -> u32 {
        self.ctx.session.borrow().hooks.active_count(kind)
    }

    /// Lifecycle and GUI callbacks currently registered.
    pub fn registered_callbacks(&self) -> usize {
        self.ctx.session.borrow().callbacks.registered()
    }

    /// Stops any running script, compiles `path` and runs it up to its first frame advance.
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<(), ScriptError> {
        self.stop();
        let path = path.as_ref().to_path_buf();
        self.script_path = Some(path.clone());
        self.error = None;
        self.ctx.reset_session();

        let runtime = fs::read_to_string(&path)
            .map_err(|source| ScriptError::Read { path: path.clone(), source })
            .and_then(|source| Self::build_runtime(&self.ctx, &path, &source));
        let runtime = match runtime {
            Ok(runtime) => runtime,
            Err(err) => {
                self.report_error(&err);
                self.state = ScriptState::NotLoaded;
                return Err(err);
            }
        };

        self.runtime = Some(runtime);
        self.state = ScriptState::Loaded;
        self.ctx.flags.running.set(true);
        self.host.borrow_mut().on_script_start();
        info!(path = %path.display(), "script loaded");
        self.run_until_suspended();
        Ok(())
    }

    fn build_runtime(ctx: &Rc<ScriptContext>, path: &Path, source: &str) -> Result<LuaRuntime, ScriptError> {
        let lua = Lua::new();
        api::register_api(&lua, ctx)?;
        let thread = {
            let chunk = lua
                .load(source)
                .set_name(format!("@{}", path.display()))
                .into_function()
                .map_err(|err| ScriptError::Compile { path: path.to_path_buf(), message: err.to_string() })?;
            let thread = lua.create_thread(chunk)?;
            lua.create_registry_value(thread)?
        };
        Ok(LuaRuntime { lua, thread })
    }

    /// Loads the last script again. Shows a message on the host when nothing was loaded before.
    pub fn reload(&mut self) -> bool {
        match self.script_path.clone() {
            Some(path) => self.load(path).is_ok(),
            None => {
                self.host.borrow_mut().show_message("There's no script to reload.");
                false
            }
        }
    }

    pub fn stop(&mut self) {
        if self.runtime.is_some() {
            self.teardown(ScriptState::Stopped);
        }
    }

    /// Called by the host once per emulated frame, before input is read.
    pub fn frame_boundary(&mut self) {
        {
            let mut session = self.ctx.session.borrow_mut();
            session.joypads.clear_frame();
            session.remaps.advance_frame();
        }
        if matches!(self.state, ScriptState::Loaded | ScriptState::Suspended) {
            self.run_until_suspended();
        }
    }

    fn run_until_suspended(&mut self) {
        let outcome = match &self.runtime {
            Some(runtime) => {
                self.state = ScriptState::Running;
                resume(&self.ctx, runtime)
            }
            None => return,
        };
        match outcome {
            ResumeOutcome::FrameAdvance => self.state = ScriptState::Suspended,
            ResumeOutcome::Yielded => {
                self.ctx.report(ConsoleKind::Log, "Script yielded without advancing the frame and was stopped.");
                self.teardown(ScriptState::Stopped);
            }
            ResumeOutcome::Finished => {
                self.ctx.report(ConsoleKind::Log, "Script died of natural causes.");
                self.teardown(ScriptState::Stopped);
            }
            ResumeOutcome::Failed(err) => self.fail(err),
        }
    }

    /// Fires the callback registered for `event`, if any.
    pub fn call_registered(&mut self, event: EventKind) {
        if !self.state.is_active() {
            return;
        }
        let Some(key) = self.ctx.session.borrow().callbacks.get(event).cloned() else {
            return;
        };
        let result = match &self.runtime {
            Some(runtime) => run_callback(&self.ctx, &runtime.lua, &key),
            None => return,
        };
        if let Err(err) = result {
            self.fail(err);
        }
    }

    /// Reports a memory access made by the emulated machine. Returns at once when nothing of
    /// `kind` is hooked.
    #[inline]
    pub fn notify_access(&mut self, address: u32, size: u32, value: u32, kind: HookKind) {
        if self.ctx.session.borrow().hooks.active_count(kind) == 0 {
            return;
        }
        self.dispatch_access(address, size, value, kind);
    }

    #[cold]
    fn dispatch_access(&mut self, address: u32, size: u32, value: u32, kind: HookKind) {
        let result = match &self.runtime {
            Some(runtime) => {
                self.ctx.watchdog.arm();
                self.ctx.watch_thread(&runtime.lua.current_thread());
                debug!(kind = kind.label(), address, size, value, "host memory access");
                classify(&self.ctx, self.ctx.dispatch(&runtime.lua, kind, address, size))
            }
            None => return,
        };
        if let Err(err) = result {
            self.fail(err);
        }
    }

    /// Host-side write of up to [`MAX_ACCESS_SIZE`] little-endian bytes followed by hook dispatch.
    /// Wider sizes are clamped so the hooks only hear about bytes that were stored.
    pub fn write_memory(&mut self, address: u32, size: u32, value: u32) {
        let size = size.min(MAX_ACCESS_SIZE);
        {
            let mut host = self.host.borrow_mut();
            match size {
                1 => host.write_byte(address, value as u8),
                2 => host.write_word(address, value as u16),
                4 => host.write_dword(address, value),
                _ => {
                    for (offset, byte) in value.to_le_bytes().into_iter().take(size as usize).enumerate() {
                        host.write_byte(address.wrapping_add(offset as u32), byte);
                    }
                }
            }
        }
        self.notify_access(address, size, value, HookKind::Write);
    }

    /// Runs the GUI callback, then blends the script overlay onto `frame`. Returns whether any pixel
    /// was drawn.
    pub fn composite_overlay(&mut self, frame: &mut [u8], pitch: usize, width: u32, height: u32) -> bool {
        if !self.state.is_active() {
            return false;
        }
        let gui = self.ctx.session.borrow().callbacks.gui().cloned();
        if let Some(key) = gui {
            let result = match &self.runtime {
                Some(runtime) => run_callback(&self.ctx, &runtime.lua, &key),
                None => Ok(()),
            };
            if let Err(err) = result {
                self.ctx.session.borrow_mut().callbacks.replace_gui(None);
                self.report_error(&err);
            }
        }

        let layout = {
            let host = self.host.borrow();
            PixelLayout::new(host.color_depth(), host.channel_shifts())
        };
        let result = layout.and_then(|layout| {
            let mut session = self.ctx.session.borrow_mut();
            let drawn = session.overlay.composite(frame, pitch, width, height, layout);
            if drawn.is_err() {
                session.overlay.clear();
            }
            drawn
        });
        match result {
            Ok(drawn) => drawn,
            Err(err) => {
                self.ctx.session.borrow_mut().overlay.clear();
                self.ctx.report(ConsoleKind::Warning, ScriptError::from(err).to_string());
                false
            }
        }
    }

    /// Out-of-range ports select the host's default controller.
    fn port(&self, port: i64) -> usize {
        resolve_port(port, self.host.borrow().default_joypad())
    }

    /// Whether the script forced input on `port` this frame.
    pub fn is_joypad_overridden(&self, port: i64) -> bool {
        let port = self.port(port);
        self.is_script_running() && self.ctx.session.borrow().joypads.is_overridden(port)
    }

    pub fn read_overridden_joypad(&self, port: i64) -> Buttons {
        let port = self.port(port);
        self.ctx.session.borrow().joypads.read(port)
    }

    pub fn is_remapping_input_display(&self, port: i64) -> bool {
        let port = self.port(port);
        self.is_script_running() && self.ctx.session.borrow().remaps.is_remapping(port)
    }

    /// Input bits to show on screen for `raw` input on `port`.
    pub fn remap_input_display(&self, port: i64, raw: u32, source: JoypadSource) -> u32 {
        if !self.is_remapping_input_display(port) {
            return raw;
        }
        let port = self.port(port);
        self.ctx.session.borrow().remaps.remap(port, raw, source)
    }

    /// True when the script asked the movie recorder not to count rerecords.
    pub fn skip_rerecord_count(&self) -> bool {
        self.is_script_running() && self.ctx.session.borrow().skip_rerecords
    }

    fn report_error(&mut self, err: &ScriptError) {
        let text = err.to_string();
        self.ctx.report(ConsoleKind::Error, text.clone());
        self.error = Some(text);
    }

    fn fail(&mut self, err: ScriptError) {
        self.report_error(&err);
        self.teardown(ScriptState::Crashed);
    }

    fn teardown(&mut self, final_state: ScriptState) {
        let Some(runtime) = &self.runtime else {
            return;
        };
        let exit = self.ctx.session.borrow_mut().callbacks.replace(EventKind::BeforeExit, None);
        if let Some(key) = exit {
            if let Err(err) = run_callback(&self.ctx, &runtime.lua, &key) {
                self.ctx.report(ConsoleKind::Error, format!("{}: {err}", EventKind::BeforeExit));
            }
        }
        let released = {
            let mut session = self.ctx.session.borrow_mut();
            let released = session.hooks.total_active();
            session.hooks.clear();
            released
        };
        self.host.borrow_mut().on_script_stop();
        self.ctx.reset_session();
        self.runtime = None;
        self.ctx.flags.running.set(false);
        self.state = final_state;
        info!(state = ?final_state, hooks_released = released, "script stopped");
    }
}

fn resume(ctx: &Rc<ScriptContext>, runtime: &LuaRuntime) -> ResumeOutcome {
    let flags = &ctx.flags;
    flags.frame_advance_waiting.set(false);
    flags.frame_boundary.set(true);
    ctx.watchdog.arm();
    let result = runtime.lua.registry_value::<Thread>(&runtime.thread).and_then(|thread| {
        ctx.watch_thread(&thread);
        thread.resume::<_, MultiValue>(()).map(|_| thread.status())
    });
    flags.frame_boundary.set(false);

    if ctx.watchdog.tripped() {
        return ResumeOutcome::Failed(ctx.watchdog.expired().into());
    }
    match result {
        Err(err) => ResumeOutcome::Failed(err.into()),
        Ok(ThreadStatus::Resumable) if flags.frame_advance_waiting.get() => ResumeOutcome::FrameAdvance,
        Ok(ThreadStatus::Resumable) => ResumeOutcome::Yielded,
        Ok(_) => ResumeOutcome::Finished,
    }
}

/// Calls a stored guest function from the host side with a fresh watchdog budget.
fn run_callback(ctx: &Rc<ScriptContext>, lua: &Lua, key: &RegistryKey) -> Result<(), ScriptError> {
    ctx.watchdog.arm();
    ctx.watch_thread(&lua.current_thread());
    let _scope = CallbackScope::enter(ctx);
    let result = lua.registry_value::<Function>(key).and_then(|callback| callback.call::<_, ()>(()));
    classify(ctx, result)
}

fn classify(ctx: &ScriptContext, result: mlua::Result<()>) -> Result<(), ScriptError> {
    if ctx.watchdog.tripped() {
        return Err(ctx.watchdog.expired().into());
    }
    result.map_err(ScriptError::from)
}

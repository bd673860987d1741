use std::cell::{Cell, RefCell};
use std::rc::Rc;

use mlua::{Function, HookTriggers, Lua, RegistryKey, Thread};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::trace;

use crate::callbacks::CallbackSlots;
use crate::config::BridgeConfig;
use crate::console::{ConsoleKind, ScriptConsole};
use crate::host::EmulatorHost;
use crate::hooks::{HookKind, HookRegistry};
use crate::joypad::{InputDisplayRemaps, JoypadOverrides};
use crate::overlay::OverlayBuffer;
use crate::watchdog::Watchdog;

pub(crate) type CallbackKey = Rc<RegistryKey>;

/// The emulator as the guest API sees it.
pub(crate) type SharedHost = Rc<RefCell<dyn EmulatorHost>>;

/// Instructions billed to the watchdog each time the hook moves between threads.
const THREAD_SWITCH_COST: u32 = 32;

/// Everything one loaded script owns. Rebuilt from scratch on every load and stop.
pub(crate) struct ScriptSession {
    pub hooks: HookRegistry<CallbackKey>,
    pub callbacks: CallbackSlots<CallbackKey>,
    pub joypads: JoypadOverrides,
    pub remaps: InputDisplayRemaps,
    pub overlay: OverlayBuffer,
    pub skip_rerecords: bool,
}

impl ScriptSession {
    fn new(config: &BridgeConfig) -> Self {
        Self {
            hooks: HookRegistry::new(config.hooks.max_span),
            callbacks: CallbackSlots::new(),
            joypads: JoypadOverrides::default(),
            remaps: InputDisplayRemaps::default(),
            overlay: OverlayBuffer::new(config.overlay.width, config.overlay.height),
            skip_rerecords: false,
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct SchedulerFlags {
    /// Set only while the host is inside a resume.
    pub frame_boundary: Cell<bool>,
    pub frame_advance_waiting: Cell<bool>,
    /// Whether a script counts as running for host queries. Held true across every guest callback.
    pub running: Cell<bool>,
    /// Number of guest callbacks currently on the stack.
    pub callback_depth: Cell<u32>,
}

/// State shared between the host-facing [`super::ScriptHost`] and the guest API closures.
pub struct ScriptContext {
    config: BridgeConfig,
    pub(crate) session: RefCell<ScriptSession>,
    pub(crate) flags: SchedulerFlags,
    pub(crate) watchdog: Watchdog,
    pub(crate) console: RefCell<ScriptConsole>,
    pub(crate) rng: RefCell<StdRng>,
    host: SharedHost,
}

impl ScriptContext {
    pub(crate) fn new(config: BridgeConfig, host: SharedHost) -> Self {
        let rng = match config.random.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            session: RefCell::new(ScriptSession::new(&config)),
            flags: SchedulerFlags::default(),
            watchdog: Watchdog::new(config.watchdog.budget, config.watchdog.instruction_interval),
            console: RefCell::new(ScriptConsole::new(config.console.capacity)),
            rng: RefCell::new(rng),
            host,
            config,
        }
    }

    pub(crate) fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Drops every callback, hook, override and drawing left by the previous script.
    pub(crate) fn reset_session(&self) {
        let fresh = ScriptSession::new(&self.config);
        let stale = self.session.replace(fresh);
        drop(stale);
        self.flags.frame_boundary.set(false);
        self.flags.frame_advance_waiting.set(false);
        self.flags.callback_depth.set(0);
    }

    pub(crate) fn report(&self, kind: ConsoleKind, text: impl Into<String>) {
        self.console.borrow_mut().push(kind, text);
    }

    /// Runs `f` against the emulator. `f` must not call back into Lua.
    pub(crate) fn with_host<R>(&self, f: impl FnOnce(&mut dyn EmulatorHost) -> R) -> mlua::Result<R> {
        let mut host = self
            .host
            .try_borrow_mut()
            .map_err(|_| mlua::Error::RuntimeError("the emulator is busy and cannot be reached from here".into()))?;
        Ok(f(&mut *host))
    }

    /// Points the instruction-count watchdog at `thread`.
    ///
    /// mlua keeps a single hooked thread per interpreter, so every entry into guest code on a
    /// different thread moves the hook there first.
    pub(crate) fn watch_thread(self: &Rc<Self>, thread: &Thread) {
        let ctx = Rc::clone(self);
        let triggers = HookTriggers::new().every_nth_instruction(self.watchdog.interval());
        thread.set_hook(triggers, move |_lua, _debug| {
            ctx.watchdog.tick().map_err(|expired| mlua::Error::RuntimeError(expired.to_string()))
        });
    }

    /// Moves the watchdog onto a guest coroutine (or back), billing the switch.
    pub(crate) fn switch_thread(self: &Rc<Self>, thread: &Thread) -> mlua::Result<()> {
        self.watchdog
            .charge(THREAD_SWITCH_COST)
            .map_err(|expired| mlua::Error::RuntimeError(expired.to_string()))?;
        self.watch_thread(thread);
        Ok(())
    }

    /// Fires the first callback hooked on `[address, address + size)`. Errors propagate to the
    /// caller unchanged.
    pub(crate) fn dispatch(&self, lua: &Lua, kind: HookKind, address: u32, size: u32) -> mlua::Result<()> {
        let key = {
            let session = self.session.borrow();
            match session.hooks.lookup(kind, address, size) {
                Some(key) => Rc::clone(key),
                None => return Ok(()),
            }
        };
        trace!(kind = kind.label(), address, size, "memory hook");
        let callback: Function = lua.registry_value(&key)?;
        let _scope = CallbackScope::enter(self);
        callback.call::<_, ()>((address, size))
    }
}

/// Marks a synchronous guest callback: suspension is illegal until it returns, and the script
/// reports as running for as long as it is on the stack.
pub(crate) struct CallbackScope<'a> {
    ctx: &'a ScriptContext,
    was_running: bool,
}

impl<'a> CallbackScope<'a> {
    pub(crate) fn enter(ctx: &'a ScriptContext) -> Self {
        let flags = &ctx.flags;
        flags.callback_depth.set(flags.callback_depth.get() + 1);
        let was_running = flags.running.replace(true);
        Self { ctx, was_running }
    }
}

impl Drop for CallbackScope<'_> {
    fn drop(&mut self) {
        let flags = &self.ctx.flags;
        flags.running.set(self.was_running);
        flags.callback_depth.set(flags.callback_depth.get().saturating_sub(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::RamHost;

    fn context() -> (Rc<RefCell<RamHost>>, ScriptContext) {
        let host = Rc::new(RefCell::new(RamHost::new(16)));
        let shared: SharedHost = host.clone();
        (host, ScriptContext::new(BridgeConfig::default(), shared))
    }

    #[test]
    fn host_is_unreachable_while_borrowed_elsewhere() {
        let (host, ctx) = context();
        ctx.with_host(|host| host.write_byte(3, 7)).expect("host is free");
        assert_eq!(host.borrow().memory()[3], 7);
        let held = host.borrow();
        assert!(ctx.with_host(|_| ()).is_err());
        drop(held);
        assert!(ctx.with_host(|_| ()).is_ok());
    }

    #[test]
    fn callback_scope_restores_flags() {
        let (_host, ctx) = context();
        {
            let _outer = CallbackScope::enter(&ctx);
            let _inner = CallbackScope::enter(&ctx);
            assert_eq!(ctx.flags.callback_depth.get(), 2);
            assert!(ctx.flags.running.get());
        }
        assert_eq!(ctx.flags.callback_depth.get(), 0);
        assert!(!ctx.flags.running.get());
    }
}

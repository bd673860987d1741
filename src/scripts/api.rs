use std::rc::Rc;

use mlua::{Function, IntoLuaMulti, Lua, MultiValue, Table, Value, Variadic};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::context::{CallbackKey, ScriptContext};
use crate::callbacks::EventKind;
use crate::console::ConsoleKind;
use crate::error::ScriptError;
use crate::host::EmulatorHost;
use crate::hooks::{Bus, HookKind, HookSpan};
use crate::joypad::{resolve_port, Buttons, BUTTON_NAMES};
use crate::overlay::Rgba;

pub(crate) const FRAME_ADVANCE_ERROR: &str = "can't call emu.frameadvance() from here";

pub const MIN_THROTTLE: i64 = 6;
pub const MAX_THROTTLE: i64 = 10_000;

const DEFAULT_DRAW_COLOR: Rgba = Rgba::new(0xFF, 0xFF, 0xFF, 0xFF);
const DEFAULT_BOX_FILL: Rgba = Rgba::new(0xFF, 0xFF, 0xFF, 0x3F);

// The Rust checks decide; suspension itself has to happen in a Lua frame.
const FRAME_ADVANCE_WRAPPER: &str = r#"
local check, yield, error = ...
return function()
    local ok, message = check()
    if not ok then
        error(message, 2)
    end
    return yield()
end
"#;

// Once the watchdog trips, protected calls rethrow instead of letting the guest keep running.
// Coroutine resumes also move the watchdog hook onto the resumed thread and back.
const WATCHDOG_GUARD: &str = r#"
local tripped, watch, running, create, error, type, pack, unpack = ...
local function settle(results)
    if not results[1] and tripped() then
        error(results[2], 0)
    end
    return unpack(results, 1, results.n)
end
local function guard(protected)
    return function(...)
        return settle(pack(protected(...)))
    end
end
local function guard_resume(resume)
    return function(co, ...)
        local caller = running()
        watch(co)
        local results = pack(resume(co, ...))
        watch(caller)
        return settle(results)
    end
end
local function guard_wrap(resume)
    return function(f)
        local co = create(f)
        return function(...)
            local results = pack(resume(co, ...))
            if results[1] then
                return unpack(results, 2, results.n)
            end
            if type(results[2]) == "string" then
                error(results[2], 2)
            end
            error(results[2], 0)
        end
    end
end
return guard, guard_resume, guard_wrap
"#;

const PAUSE_WRAPPER: &str = r#"
local check, yield = ...
return function()
    if check() then
        return yield()
    end
end
"#;

/// Installs the `emu` (also reachable as `vba`), `memory`, `joypad`, `gui` and `movie` tables plus
/// the `print` and `math.random` overrides, and makes protected calls rethrow a watchdog stop.
pub(crate) fn register_api(lua: &Lua, ctx: &Rc<ScriptContext>) -> mlua::Result<()> {
    let globals = lua.globals();
    let emu = emu_table(lua, ctx)?;
    globals.set("vba", emu.clone())?;
    globals.set("emu", emu)?;
    globals.set("memory", memory_table(lua, ctx)?)?;
    globals.set("joypad", joypad_table(lua, ctx)?)?;
    globals.set("gui", gui_table(lua, ctx)?)?;
    globals.set("movie", movie_table(lua, ctx)?)?;
    globals.set("print", print_fn(lua, ctx)?)?;
    install_random(lua, ctx)?;
    install_watchdog_guard(lua, ctx)?;
    Ok(())
}

fn emu_table<'lua>(lua: &'lua Lua, ctx: &Rc<ScriptContext>) -> mlua::Result<Table<'lua>> {
    let emu = lua.create_table()?;
    emu.set("frameadvance", frame_advance_fn(lua, ctx)?)?;
    emu.set("pause", pause_fn(lua, ctx)?)?;
    emu.set("framecount", host_query(lua, ctx, |host| host.frame_count())?)?;
    emu.set("lagcount", host_query(lua, ctx, |host| host.lag_count())?)?;
    emu.set("lagged", host_query(lua, ctx, |host| host.lagged())?)?;
    emu.set("emulating", host_query(lua, ctx, |host| host.is_emulating())?)?;
    emu.set("getthrottle", host_query(lua, ctx, |host| host.throttle())?)?;
    emu.set("print", print_fn(lua, ctx)?)?;

    let c = Rc::clone(ctx);
    emu.set(
        "message",
        lua.create_function(move |lua, values: Variadic<Value>| {
            let text = stringify(lua, &values)?;
            c.with_host(|host| host.show_message(&text))
        })?,
    )?;

    let c = Rc::clone(ctx);
    emu.set(
        "setthrottle",
        lua.create_function(move |_, percent: i64| {
            let applied = percent.clamp(MIN_THROTTLE, MAX_THROTTLE);
            c.with_host(|host| host.set_throttle(applied as u32))?;
            Ok(applied)
        })?,
    )?;

    let c = Rc::clone(ctx);
    emu.set(
        "remapinputdisplay",
        lua.create_function(move |_, (port, button, target): (Option<i64>, String, Value)| {
            let Some(button) = Buttons::from_guest_name(&button) else {
                c.report(ConsoleKind::Warning, format!("emu.remapinputdisplay: unknown button '{button}'"));
                return Ok(());
            };
            let target = match target {
                Value::Nil => None,
                Value::String(name) => match Buttons::from_guest_name(name.to_str()?) {
                    Some(target) => Some(target),
                    None => {
                        let name = name.to_str()?;
                        c.report(ConsoleKind::Warning, format!("emu.remapinputdisplay: unknown button '{name}'"));
                        return Ok(());
                    }
                },
                other => match integer_value(&other) {
                    Some(mask) => Some(Buttons::from_bits_truncate(mask as u16)),
                    None => {
                        return Err(mlua::Error::RuntimeError(format!(
                            "bad argument #3 to 'remapinputdisplay' (button name, mask or nil expected, got {})",
                            other.type_name()
                        )))
                    }
                },
            };
            let port = c.with_host(|host| guest_port(port, host.default_joypad()))?;
            c.session.borrow_mut().remaps.set(port, button, target);
            Ok(())
        })?,
    )?;

    for kind in EventKind::ALL {
        let c = Rc::clone(ctx);
        emu.set(
            kind.register_fn(),
            lua.create_function(move |lua, callback: Option<Function>| {
                let key = store_callback(lua, callback)?;
                let previous = c.session.borrow_mut().callbacks.replace(kind, key);
                previous.map(|key| lua.registry_value::<Function>(&key)).transpose()
            })?,
        )?;
    }
    Ok(emu)
}

fn frame_advance_fn<'lua>(lua: &'lua Lua, ctx: &Rc<ScriptContext>) -> mlua::Result<Function<'lua>> {
    let c = Rc::clone(ctx);
    let check = lua.create_function(move |_, ()| {
        let flags = &c.flags;
        if !flags.frame_boundary.get()
            || flags.frame_advance_waiting.get()
            || flags.callback_depth.get() > 0
            || c.watchdog.tripped()
        {
            return Ok((false, Some(FRAME_ADVANCE_ERROR)));
        }
        flags.frame_advance_waiting.set(true);
        Ok((true, None))
    })?;
    let error: Function = lua.globals().get("error")?;
    suspending(lua, FRAME_ADVANCE_WRAPPER, "=emu.frameadvance", (check, yield_fn(lua)?, error))
}

fn pause_fn<'lua>(lua: &'lua Lua, ctx: &Rc<ScriptContext>) -> mlua::Result<Function<'lua>> {
    let c = Rc::clone(ctx);
    let check = lua.create_function(move |_, ()| {
        c.with_host(|host| host.set_paused(true))?;
        let flags = &c.flags;
        if flags.frame_advance_waiting.get()
            || !flags.frame_boundary.get()
            || flags.callback_depth.get() > 0
            || c.watchdog.tripped()
        {
            return Ok(false);
        }
        flags.frame_advance_waiting.set(true);
        Ok(true)
    })?;
    suspending(lua, PAUSE_WRAPPER, "=emu.pause", (check, yield_fn(lua)?))
}

fn yield_fn(lua: &Lua) -> mlua::Result<Function<'_>> {
    let coroutine: Table = lua.globals().get("coroutine")?;
    coroutine.get("yield")
}

fn suspending<'lua>(
    lua: &'lua Lua,
    wrapper: &str,
    name: &str,
    upvalues: impl IntoLuaMulti<'lua>,
) -> mlua::Result<Function<'lua>> {
    lua.load(wrapper).set_name(name).call(upvalues)
}

fn host_query<'lua, R>(
    lua: &'lua Lua,
    ctx: &Rc<ScriptContext>,
    query: fn(&dyn EmulatorHost) -> R,
) -> mlua::Result<Function<'lua>>
where
    R: IntoLuaMulti<'lua> + 'static,
{
    let c = Rc::clone(ctx);
    lua.create_function(move |_, ()| c.with_host(|host| query(host)))
}

fn memory_table<'lua>(lua: &'lua Lua, ctx: &Rc<ScriptContext>) -> mlua::Result<Table<'lua>> {
    let memory = lua.create_table()?;

    let readers: [(&[&str], fn(&dyn EmulatorHost, u32) -> i64); 6] = [
        (&["readbyte", "readbyteunsigned"], |host, addr| i64::from(host.read_byte(addr))),
        (&["readbytesigned"], |host, addr| i64::from(host.read_byte(addr) as i8)),
        (&["readword", "readwordunsigned", "readshort", "readshortunsigned"], |host, addr| {
            i64::from(host.read_word(addr))
        }),
        (&["readwordsigned", "readshortsigned"], |host, addr| i64::from(host.read_word(addr) as i16)),
        (&["readdword", "readdwordunsigned", "readlong", "readlongunsigned"], |host, addr| {
            i64::from(host.read_dword(addr))
        }),
        (&["readdwordsigned", "readlongsigned"], |host, addr| i64::from(host.read_dword(addr) as i32)),
    ];
    for (names, read) in readers {
        let c = Rc::clone(ctx);
        let function = lua.create_function(move |_, address: i64| {
            let Some(address) = guest_address(&c, address) else {
                return Ok(None);
            };
            c.with_host(|host| Some(read(host, address)))
        })?;
        for name in names {
            memory.set(*name, function.clone())?;
        }
    }

    let c = Rc::clone(ctx);
    memory.set(
        "readbyterange",
        lua.create_function(move |lua, (address, length): (i64, i64)| {
            let span = match HookSpan::normalize(address, length, c.config().hooks.max_span) {
                Ok(span) => span,
                Err(err) => {
                    c.report(ConsoleKind::Warning, format!("memory.readbyterange: {err}"));
                    return Ok(None);
                }
            };
            let bytes = c.with_host(|host| span.addresses().map(|addr| host.read_byte(addr)).collect::<Vec<_>>())?;
            lua.create_sequence_from(bytes).map(Some)
        })?,
    )?;

    let writers: [(&[&str], u32, fn(&mut dyn EmulatorHost, u32, i64)); 3] = [
        (&["writebyte"], 1, |host, addr, value| host.write_byte(addr, value as u8)),
        (&["writeword", "writeshort"], 2, |host, addr, value| host.write_word(addr, value as u16)),
        (&["writedword", "writelong"], 4, |host, addr, value| host.write_dword(addr, value as u32)),
    ];
    for (names, size, write) in writers {
        let c = Rc::clone(ctx);
        let function = lua.create_function(move |lua, (address, value): (i64, i64)| {
            let Some(address) = guest_address(&c, address) else {
                return Ok(());
            };
            c.with_host(|host| write(host, address, value))?;
            c.dispatch(lua, HookKind::Write, address, size)
        })?;
        for name in names {
            memory.set(*name, function.clone())?;
        }
    }

    let hook_fns: [(&[&str], HookKind); 3] = [
        (&["registerwrite", "register"], HookKind::Write),
        (&["registerread"], HookKind::Read),
        (&["registerexec", "registerexecute", "registerrun"], HookKind::Exec),
    ];
    for (names, kind) in hook_fns {
        let c = Rc::clone(ctx);
        let function = lua.create_function(move |lua, args: MultiValue| {
            let request = HookRequest::parse(names[0], args)?;
            let callback = store_callback(lua, request.callback)?;
            let kind = kind.on_bus(request.bus);
            let result = c.session.borrow_mut().hooks.register(kind, request.address, request.size, callback);
            if let Err(err) = result {
                c.report(ConsoleKind::Warning, format!("memory.{}: {err}", names[0]));
            }
            Ok(())
        })?;
        for name in names {
            memory.set(*name, function.clone())?;
        }
    }
    Ok(memory)
}

/// Arguments of `memory.register*(address, [size], fn | nil, [bus])`.
struct HookRequest<'lua> {
    address: i64,
    size: i64,
    callback: Option<Function<'lua>>,
    bus: Bus,
}

impl<'lua> HookRequest<'lua> {
    fn parse(name: &str, args: MultiValue<'lua>) -> mlua::Result<Self> {
        let mut values = args.into_vec().into_iter();
        let address = values.next().as_ref().and_then(integer_value).ok_or_else(|| {
            mlua::Error::RuntimeError(format!("bad argument #1 to '{name}' (address expected)"))
        })?;
        let mut request = Self { address, size: 1, callback: None, bus: Bus::Main };
        let mut sized = false;
        for (position, value) in values.enumerate() {
            match value {
                Value::Nil => {}
                Value::Function(callback) => request.callback = Some(callback),
                Value::String(bus) => request.bus = Bus::from_name(bus.to_str()?),
                other => match integer_value(&other) {
                    Some(size) if !sized && request.callback.is_none() => {
                        request.size = size;
                        sized = true;
                    }
                    _ => {
                        return Err(mlua::Error::RuntimeError(format!(
                            "bad argument #{} to '{name}' (unexpected {})",
                            position + 2,
                            other.type_name()
                        )))
                    }
                },
            }
        }
        Ok(request)
    }
}

fn joypad_table<'lua>(lua: &'lua Lua, ctx: &Rc<ScriptContext>) -> mlua::Result<Table<'lua>> {
    let joypad = lua.create_table()?;

    let readers: [(&[&str], ButtonReport); 3] = [
        (&["get", "read"], ButtonReport::All),
        (&["getdown", "readdown"], ButtonReport::Down),
        (&["getup", "readup"], ButtonReport::Up),
    ];
    for (names, report) in readers {
        let c = Rc::clone(ctx);
        let function = lua.create_function(move |lua, port: Option<i64>| {
            let buttons = c.with_host(|host| host.joypad_state(guest_port(port, host.default_joypad())))?;
            let table = lua.create_table()?;
            for (bit, name) in BUTTON_NAMES.iter().enumerate() {
                let pressed = buttons.bits() & (1 << bit) != 0;
                if report.includes(pressed) {
                    table.set(*name, pressed)?;
                }
            }
            Ok(table)
        })?;
        for name in names {
            joypad.set(*name, function.clone())?;
        }
    }

    let c = Rc::clone(ctx);
    let set = lua.create_function(move |_, (port, buttons): (Option<i64>, Table)| {
        let mut pressed = Buttons::empty();
        for pair in buttons.pairs::<String, Value>() {
            let (name, value) = pair?;
            if matches!(value, Value::Nil | Value::Boolean(false)) {
                continue;
            }
            match Buttons::from_guest_name(&name) {
                Some(button) => pressed |= button,
                None => c.report(ConsoleKind::Warning, format!("joypad.set: unknown button '{name}'")),
            }
        }
        let port = c.with_host(|host| guest_port(port, host.default_joypad()))?;
        c.session.borrow_mut().joypads.set(port, pressed);
        Ok(())
    })?;
    joypad.set("set", set.clone())?;
    joypad.set("write", set)?;
    Ok(joypad)
}

/// Which buttons a `joypad.get*` table lists.
#[derive(Debug, Clone, Copy)]
enum ButtonReport {
    All,
    Down,
    Up,
}

impl ButtonReport {
    fn includes(self, pressed: bool) -> bool {
        match self {
            ButtonReport::All => true,
            ButtonReport::Down => pressed,
            ButtonReport::Up => !pressed,
        }
    }
}

fn gui_table<'lua>(lua: &'lua Lua, ctx: &Rc<ScriptContext>) -> mlua::Result<Table<'lua>> {
    let gui = lua.create_table()?;

    let c = Rc::clone(ctx);
    gui.set(
        "register",
        lua.create_function(move |lua, callback: Option<Function>| {
            let key = store_callback(lua, callback)?;
            let previous = c.session.borrow_mut().callbacks.replace_gui(key);
            previous.map(|key| lua.registry_value::<Function>(&key)).transpose()
        })?,
    )?;

    let c = Rc::clone(ctx);
    let pixel = lua.create_function(move |_, (x, y, color): (f64, f64, Value)| {
        if let Some(color) = guest_color(&c, "gui.pixel", &color, DEFAULT_DRAW_COLOR) {
            c.session.borrow_mut().overlay.pixel(x.floor() as i64, y.floor() as i64, color);
        }
        Ok(())
    })?;
    for name in ["pixel", "drawpixel", "setpixel", "writepixel"] {
        gui.set(name, pixel.clone())?;
    }

    let c = Rc::clone(ctx);
    let line = lua.create_function(move |_, (x1, y1, x2, y2, color): (f64, f64, f64, f64, Value)| {
        if let Some(color) = guest_color(&c, "gui.line", &color, DEFAULT_DRAW_COLOR) {
            let [x1, y1, x2, y2] = [x1, y1, x2, y2].map(|v| v.floor() as i64);
            c.session.borrow_mut().overlay.line(x1, y1, x2, y2, color);
        }
        Ok(())
    })?;
    gui.set("line", line.clone())?;
    gui.set("drawline", line)?;

    let c = Rc::clone(ctx);
    let draw_box =
        lua.create_function(move |_, (x1, y1, x2, y2, fill, outline): (f64, f64, f64, f64, Value, Value)| {
            let Some(fill) = guest_color(&c, "gui.box", &fill, DEFAULT_BOX_FILL) else {
                return Ok(());
            };
            let Some(outline) = guest_color(&c, "gui.box", &outline, Rgba { a: 0xFF, ..fill }) else {
                return Ok(());
            };
            let [x1, y1, x2, y2] = [x1, y1, x2, y2].map(|v| v.floor() as i64);
            c.session.borrow_mut().overlay.draw_box(x1, y1, x2, y2, fill, outline);
            Ok(())
        })?;
    for name in ["box", "drawbox", "rect", "drawrect"] {
        gui.set(name, draw_box.clone())?;
    }

    let c = Rc::clone(ctx);
    let get_pixel = lua.create_function(move |lua, (x, y): (f64, f64)| {
        let pixel = c.session.borrow().overlay.get(x.floor() as i64, y.floor() as i64);
        match pixel {
            Some(color) => (color.r, color.g, color.b, color.a).into_lua_multi(lua),
            None => Value::Nil.into_lua_multi(lua),
        }
    })?;
    gui.set("getpixel", get_pixel.clone())?;
    gui.set("readpixel", get_pixel)?;

    let c = Rc::clone(ctx);
    gui.set(
        "parsecolor",
        lua.create_function(move |lua, color: Value| {
            match guest_color(&c, "gui.parsecolor", &color, Rgba::TRANSPARENT) {
                Some(color) => (color.r, color.g, color.b, color.a).into_lua_multi(lua),
                None => Value::Nil.into_lua_multi(lua),
            }
        })?,
    )?;

    let c = Rc::clone(ctx);
    gui.set(
        "opacity",
        lua.create_function(move |_, opacity: f64| {
            c.session.borrow_mut().overlay.set_opacity(opacity);
            Ok(())
        })?,
    )?;

    let c = Rc::clone(ctx);
    gui.set(
        "transparency",
        lua.create_function(move |_, level: f64| {
            c.session.borrow_mut().overlay.set_transparency(level);
            Ok(())
        })?,
    )?;

    let c = Rc::clone(ctx);
    gui.set(
        "clear",
        lua.create_function(move |_, ()| {
            c.session.borrow_mut().overlay.clear();
            Ok(())
        })?,
    )?;
    Ok(gui)
}

fn movie_table<'lua>(lua: &'lua Lua, ctx: &Rc<ScriptContext>) -> mlua::Result<Table<'lua>> {
    let movie = lua.create_table()?;
    let c = Rc::clone(ctx);
    movie.set(
        "rerecordcounting",
        lua.create_function(move |_, counting: Option<bool>| {
            let mut session = c.session.borrow_mut();
            if let Some(counting) = counting {
                session.skip_rerecords = !counting;
            }
            Ok(!session.skip_rerecords)
        })?,
    )?;
    Ok(movie)
}

fn print_fn<'lua>(lua: &'lua Lua, ctx: &Rc<ScriptContext>) -> mlua::Result<Function<'lua>> {
    let c = Rc::clone(ctx);
    lua.create_function(move |lua, values: Variadic<Value>| {
        let text = stringify(lua, &values)?;
        c.report(ConsoleKind::Output, text);
        Ok(())
    })
}

fn install_random(lua: &Lua, ctx: &Rc<ScriptContext>) -> mlua::Result<()> {
    let math: Table = lua.globals().get("math")?;

    let c = Rc::clone(ctx);
    math.set(
        "random",
        lua.create_function(move |_, (m, n): (Option<i64>, Option<i64>)| {
            let mut rng = c.rng.borrow_mut();
            let (low, high) = match (m, n) {
                (None, _) => return Ok(Value::Number(rng.gen::<f64>())),
                (Some(m), None) => (1, m),
                (Some(m), Some(n)) => (m, n),
            };
            if low > high {
                let arg = if n.is_some() { 2 } else { 1 };
                return Err(mlua::Error::RuntimeError(format!("bad argument #{arg} to 'random' (interval is empty)")));
            }
            Ok(Value::Integer(rng.gen_range(low..=high)))
        })?,
    )?;

    let c = Rc::clone(ctx);
    math.set(
        "randomseed",
        lua.create_function(move |_, seed: Option<i64>| {
            *c.rng.borrow_mut() = match seed {
                Some(seed) => StdRng::seed_from_u64(seed as u64),
                None => StdRng::from_entropy(),
            };
            Ok(())
        })?,
    )?;
    Ok(())
}

fn install_watchdog_guard(lua: &Lua, ctx: &Rc<ScriptContext>) -> mlua::Result<()> {
    let globals = lua.globals();
    let table: Table = globals.get("table")?;
    let coroutine: Table = globals.get("coroutine")?;

    let c = Rc::clone(ctx);
    let tripped = lua.create_function(move |_, ()| Ok(c.watchdog.tripped()))?;
    let c = Rc::clone(ctx);
    let watch = lua.create_function(move |_, thread: Value| match thread {
        Value::Thread(thread) => c.switch_thread(&thread),
        _ => Ok(()),
    })?;
    let (guard, guard_resume, guard_wrap): (Function, Function, Function) =
        lua.load(WATCHDOG_GUARD).set_name("=watchdog").call((
            tripped,
            watch,
            coroutine.get::<_, Function>("running")?,
            coroutine.get::<_, Function>("create")?,
            globals.get::<_, Function>("error")?,
            globals.get::<_, Function>("type")?,
            table.get::<_, Function>("pack")?,
            table.get::<_, Function>("unpack")?,
        ))?;

    for name in ["pcall", "xpcall"] {
        let protected: Function = globals.get(name)?;
        globals.set(name, guard.call::<_, Function>(protected)?)?;
    }
    let resume: Function = guard_resume.call(coroutine.get::<_, Function>("resume")?)?;
    coroutine.set("wrap", guard_wrap.call::<_, Function>(resume.clone())?)?;
    coroutine.set("resume", resume)?;
    Ok(())
}

fn store_callback<'lua>(lua: &'lua Lua, callback: Option<Function<'lua>>) -> mlua::Result<Option<CallbackKey>> {
    callback.map(|callback| lua.create_registry_value(callback).map(Rc::new)).transpose()
}

fn stringify<'lua>(lua: &'lua Lua, values: &[Value<'lua>]) -> mlua::Result<String> {
    let tostring: Function = lua.globals().get("tostring")?;
    let parts =
        values.iter().map(|value| tostring.call::<_, String>(value.clone())).collect::<mlua::Result<Vec<_>>>()?;
    Ok(parts.join("\t"))
}

fn integer_value(value: &Value) -> Option<i64> {
    match *value {
        Value::Integer(n) => Some(n),
        Value::Number(n) if n.is_finite() && n.fract() == 0.0 => Some(n as i64),
        _ => None,
    }
}

fn guest_address(ctx: &ScriptContext, address: i64) -> Option<u32> {
    match u32::try_from(address) {
        Ok(address) => Some(address),
        Err(_) => {
            ctx.report(ConsoleKind::Warning, ScriptError::AddressOutOfRange(address).to_string());
            None
        }
    }
}

/// Guest ports are 1-based; nil or out of range selects the host default.
fn guest_port(port: Option<i64>, default_port: usize) -> usize {
    resolve_port(port.map_or(-1, |port| port.saturating_sub(1)), default_port)
}

fn guest_color(ctx: &ScriptContext, function: &str, value: &Value, default: Rgba) -> Option<Rgba> {
    let parsed = match value {
        Value::Nil => Some(default),
        Value::String(text) => text.to_str().ok().and_then(Rgba::parse),
        Value::Table(table) => table_color(table),
        other => integer_value(other).map(|value| Rgba::from_u32(value as u32)),
    };
    if parsed.is_none() {
        ctx.report(ConsoleKind::Warning, format!("{function}: unrecognized color {}", value.type_name()));
    }
    parsed
}

fn table_color(table: &Table) -> Option<Rgba> {
    let channel = |key: &str, index: i64, default: i64| -> Option<u8> {
        let value: Value = match table.get(key) {
            Ok(Value::Nil) | Err(_) => table.get(index).ok()?,
            Ok(value) => value,
        };
        let value = match value {
            Value::Nil => default,
            other => integer_value(&other)?,
        };
        Some(value.clamp(0, 255) as u8)
    };
    Some(Rgba::new(channel("r", 1, 0)?, channel("g", 2, 0)?, channel("b", 3, 0)?, channel("a", 4, 255)?))
}

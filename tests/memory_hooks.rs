use script_bridge::config::BridgeConfig;
use script_bridge::console::ConsoleKind;
use script_bridge::hooks::HookKind;
use script_bridge::{EmulatorHost, RamHost, ScriptHost, ScriptState};
use std::io::Write;
use tempfile::NamedTempFile;

fn write_script(contents: &str) -> NamedTempFile {
    let mut temp = NamedTempFile::new().expect("temp script");
    write!(temp, "{contents}").expect("write script");
    temp
}

fn start(source: &str) -> (ScriptHost<RamHost>, NamedTempFile) {
    let file = write_script(source);
    let mut script = ScriptHost::new(BridgeConfig::default(), RamHost::default());
    script.load(file.path()).expect("load script");
    (script, file)
}

fn outputs(script: &ScriptHost<RamHost>) -> Vec<String> {
    script.console().iter().filter(|entry| entry.kind == ConsoleKind::Output).map(|entry| entry.text.clone()).collect()
}

#[test]
fn write_hook_fires_only_for_hooked_bytes() {
    let (mut script, _file) = start(
        r#"
            memory.registerwrite(0x100, function(address, size) print(address, size) end)
            while true do emu.frameadvance() end
        "#,
    );
    assert_eq!(script.active_hook_count(HookKind::Write), 1);

    script.write_memory(0x100, 1, 7);
    script.write_memory(0x101, 1, 8);
    assert_eq!(outputs(&script), vec!["256\t1"]);
    assert_eq!(script.host().read_byte(0x100), 7);
    assert_eq!(script.host().read_byte(0x101), 8);
}

#[test]
fn wide_access_hits_a_hook_on_any_covered_byte() {
    let (mut script, _file) = start(
        r#"
            memory.registerwrite(0x203, function(address, size) print(address, size) end)
            while true do emu.frameadvance() end
        "#,
    );
    script.write_memory(0x200, 4, 0xDEADBEEF);
    script.write_memory(0x204, 4, 0);
    assert_eq!(outputs(&script), vec!["512\t4"]);
    assert_eq!(script.host().read_dword(0x200), 0xDEADBEEF);
}

#[test]
fn oversized_host_writes_are_clamped_to_four_bytes() {
    let (mut script, _file) = start(
        r#"
            memory.registerwrite(0x205, function(address, size) print("past end " .. address) end)
            memory.registerwrite(0x203, function(address, size) print(address, size) end)
            while true do emu.frameadvance() end
        "#,
    );
    script.write_memory(0x200, 8, 0x1122_3344);
    assert_eq!(outputs(&script), vec!["512\t4"]);
    assert_eq!(script.host().read_dword(0x200), 0x1122_3344);
    assert_eq!(script.host().read_byte(0x204), 0);
}

#[test]
fn hook_ranges_and_unregistering() {
    let (mut script, _file) = start(
        r#"
            memory.registerwrite(0x300, 8, function(address) print("hit " .. address) end)
            memory.registerwrite(0x302, 2, nil)
            while true do emu.frameadvance() end
        "#,
    );
    assert_eq!(script.active_hook_count(HookKind::Write), 6);
    for address in 0x300..0x308 {
        script.write_memory(address, 1, 0);
    }
    assert_eq!(outputs(&script), vec!["hit 768", "hit 769", "hit 772", "hit 773", "hit 774", "hit 775"]);
}

#[test]
fn guest_writes_dispatch_nested_hooks() {
    let (script, _file) = start(
        r#"
            memory.registerwrite(0x40, 2, function(address, size) print("hooked " .. address .. " " .. size) end)
            memory.writeword(0x40, 0x1234)
            emu.frameadvance()
        "#,
    );
    assert_eq!(outputs(&script), vec!["hooked 64 2"]);
    assert_eq!(script.host().read_word(0x40), 0x1234);
}

#[test]
fn read_and_exec_hooks_are_driven_by_the_host() {
    let (mut script, _file) = start(
        r#"
            memory.registerread(0x10, function(address) print("read " .. address) end)
            memory.registerexec(0x8000, 4, function(address) print("exec " .. address) end)
            while true do emu.frameadvance() end
        "#,
    );
    script.notify_access(0x10, 1, 0, HookKind::Read);
    script.notify_access(0x10, 1, 0, HookKind::Write);
    script.notify_access(0x8002, 2, 0, HookKind::Exec);
    assert_eq!(outputs(&script), vec!["read 16", "exec 32770"]);
}

#[test]
fn sub_bus_hooks_live_in_their_own_table() {
    let (mut script, _file) = start(
        r#"
            memory.registerwrite(0x20, 1, function(address) print("sub " .. address) end, "sub")
            while true do emu.frameadvance() end
        "#,
    );
    assert_eq!(script.active_hook_count(HookKind::Write), 0);
    assert_eq!(script.active_hook_count(HookKind::WriteSub), 1);
    script.write_memory(0x20, 1, 1);
    script.notify_access(0x20, 1, 1, HookKind::WriteSub);
    assert_eq!(outputs(&script), vec!["sub 32"]);
}

#[test]
fn hook_error_crashes_the_script_and_clears_hooks() {
    let (mut script, _file) = start(
        r#"
            memory.registerread(0x10, function() error("boom") end)
            while true do emu.frameadvance() end
        "#,
    );
    script.notify_access(0x10, 1, 0, HookKind::Read);
    assert_eq!(script.state(), ScriptState::Crashed);
    assert!(script.last_error().is_some_and(|err| err.contains("boom")));
    assert_eq!(script.active_hook_count(HookKind::Read), 0);
}

#[test]
fn frame_advance_from_a_hook_crashes_when_uncaught() {
    let (mut script, _file) = start(
        r#"
            memory.registerwrite(0x10, function() emu.frameadvance() end)
            while true do emu.frameadvance() end
        "#,
    );
    script.write_memory(0x10, 1, 0);
    assert_eq!(script.state(), ScriptState::Crashed);
    assert!(script.last_error().is_some_and(|err| err.contains("can't call emu.frameadvance() from here")));
}

#[test]
fn pause_from_a_hook_only_pauses() {
    let (mut script, _file) = start(
        r#"
            memory.registerwrite(0x10, function() emu.pause() print("still here") end)
            while true do emu.frameadvance() end
        "#,
    );
    script.write_memory(0x10, 1, 0);
    assert!(script.host().paused);
    assert_eq!(outputs(&script), vec!["still here"]);
    assert_eq!(script.state(), ScriptState::Suspended);
}

#[test]
fn oversized_or_invalid_registrations_warn_and_install_nothing() {
    let (script, _file) = start(
        r#"
            memory.registerwrite(-1, function() end)
            memory.registerwrite(0, 0x20000, function() end)
            while true do emu.frameadvance() end
        "#,
    );
    assert_eq!(script.active_hook_count(HookKind::Write), 0);
    let warnings = script.console().iter().filter(|entry| entry.kind == ConsoleKind::Warning).count();
    assert_eq!(warnings, 2);
    assert_eq!(script.state(), ScriptState::Suspended);
}

#[test]
fn no_hooks_means_no_dispatch() {
    let (mut script, _file) = start("while true do emu.frameadvance() end");
    for address in 0..0x100 {
        script.notify_access(address, 1, 0, HookKind::Read);
    }
    assert!(script.console().is_empty());
    assert_eq!(script.state(), ScriptState::Suspended);
}

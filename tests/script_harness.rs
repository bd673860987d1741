use std::fs::File;
use std::path::Path;

use script_bridge::script_harness::{load_fixture, run_fixture, HarnessOutput};
use script_bridge::ScriptState;

#[test]
fn main_fixture_matches_golden() {
    assert_fixture_matches("tests/fixtures/script_harness/main.json", "tests/fixtures/script_harness/main.golden.json");
}

#[test]
fn runaway_fixture_matches_golden() {
    assert_fixture_matches(
        "tests/fixtures/script_harness/runaway.json",
        "tests/fixtures/script_harness/runaway.golden.json",
    );
}

#[test]
fn main_fixture_is_stable_across_runs() {
    let fixture = load_fixture("tests/fixtures/script_harness/main.json").expect("load fixture");
    let first = run_fixture(&fixture).expect("run fixture first time");
    let second = run_fixture(&fixture).expect("run fixture second time");
    assert_eq!(first, second, "fixture should produce identical output across runs");
    assert_eq!(first.final_state, ScriptState::Stopped);
}

fn assert_fixture_matches(fixture_path: &str, golden_path: &str) {
    let fixture = load_fixture(fixture_path).expect("load fixture");
    let output = run_fixture(&fixture).expect("run fixture");
    let golden_file = File::open(Path::new(golden_path)).expect("open golden");
    let golden: HarnessOutput = serde_json::from_reader(golden_file).expect("parse golden");
    assert_eq!(output, golden, "fixture {} diverged from golden {}", fixture_path, golden_path);
}

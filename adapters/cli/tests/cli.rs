use std::process::Command;

#[test]
fn help_lists_every_subcommand() {
    let output = Command::new(env!("CARGO_BIN_EXE_territory-defense"))
        .arg("--help")
        .output()
        .expect("failed to run territory-defense --help");

    assert!(output.status.success(), "--help should exit cleanly");
    let stdout = String::from_utf8(output.stdout).expect("utf-8 output");
    for command in ["run", "resolve", "demo"] {
        assert!(stdout.contains(command), "{stdout}");
    }
}

#[test]
fn zero_tick_period_flag_is_rejected() {
    let scenario = concat!(env!("CARGO_MANIFEST_DIR"), "/scenarios/three_by_three.toml");
    let output = Command::new(env!("CARGO_BIN_EXE_territory-defense"))
        .args(["--tick-period-ms", "0", "resolve", scenario])
        .output()
        .expect("failed to run territory-defense resolve");

    assert!(!output.status.success(), "a zero tick period should fail");
    let stderr = String::from_utf8(output.stderr).expect("utf-8 output");
    assert!(stderr.contains("tick_period_ms must be positive"), "{stderr}");
}

#[test]
fn demo_replays_to_json_snapshot() {
    let output = Command::new(env!("CARGO_BIN_EXE_territory-defense"))
        .args(["demo", "--seed", "3", "--side", "4", "--json"])
        .output()
        .expect("failed to run the territory-defense demo");

    assert!(output.status.success(), "demo should exit cleanly");
    let stdout = String::from_utf8(output.stdout).expect("utf-8 output");
    assert!(stdout.contains("\"side\": 4"), "{stdout}");
    assert!(stdout.contains("\"tiles\""), "{stdout}");
}

#[test]
fn resolve_replays_the_bundled_scenario() {
    let scenario = concat!(env!("CARGO_MANIFEST_DIR"), "/scenarios/three_by_three.toml");
    let output = Command::new(env!("CARGO_BIN_EXE_territory-defense"))
        .args(["resolve", scenario])
        .output()
        .expect("failed to run territory-defense resolve");

    assert!(output.status.success(), "resolve should exit cleanly");
    let stdout = String::from_utf8(output.stdout).expect("utf-8 output");
    assert!(stdout.contains("tile #4 at (0, 1) destroyed"), "{stdout}");
    assert!(stdout.contains("[line 5] 20 -> 0"), "{stdout}");
    assert!(stdout.contains("[line 1] 40 -> 35"), "{stdout}");
    assert!(stdout.contains("\nxA.\n"), "{stdout}");
}

use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::Value;

const LIBRARY: &str = r#"{
    "active_profile": "main",
    "profiles": {
        "main": { "id": "main", "game_id": "skyrim", "name": "Main" },
        "base": {
            "id": "base",
            "game_id": "skyrim",
            "name": "Baseline",
            "mod_state": { "m1": { "enabled": true } }
        },
        "elsewhere": { "id": "elsewhere", "game_id": "fallout4", "name": "Elsewhere" }
    },
    "mods": {
        "skyrim": {
            "m1": { "id": "m1", "name": "One", "state": "installed" },
            "m2": { "id": "m2", "name": "Two", "state": "installed" },
            "dl": { "id": "dl", "name": "Fresh", "state": "downloaded" },
            "old": {
                "id": "old",
                "name": "Old",
                "state": "downloaded",
                "attributes": { "wasInstalled": true }
            }
        }
    }
}"#;

struct TempData {
    path: PathBuf,
}

impl TempData {
    fn new(name: &str) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock error")
            .as_nanos();
        let path = std::env::temp_dir().join(format!(
            "refprofile-cli-tests-{}-{}-{}",
            name,
            std::process::id(),
            timestamp
        ));
        fs::create_dir_all(&path).expect("failed to create temp data dir");
        fs::write(path.join("library.json"), LIBRARY).expect("failed to write library");
        Self { path }
    }

    fn library(&self) -> Value {
        let raw = fs::read_to_string(self.path.join("library.json")).expect("read library");
        serde_json::from_str(&raw).expect("parse library")
    }
}

impl Drop for TempData {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.path);
    }
}

fn run(data: &TempData, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_refprofile"))
        .arg("--data-dir")
        .arg(&data.path)
        .args(args)
        .env_remove("REFPROFILE_DATA_DIR")
        .env("HOME", &data.path)
        .output()
        .expect("failed to run refprofile")
}

fn run_ok(data: &TempData, args: &[&str]) -> String {
    let output = run(data, args);
    assert!(
        output.status.success(),
        "refprofile {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn status_of(stdout: &str, mod_id: &str) -> String {
    let marker = format!(" {mod_id} (");
    let line = stdout
        .lines()
        .find(|line| line.contains(&marker))
        .unwrap_or_else(|| panic!("no status line for {mod_id} in:\n{stdout}"));
    line.get(..16).unwrap_or(line).trim().to_string()
}

#[test]
fn status_without_reference_is_not_available() {
    let data = TempData::new("no-reference");
    let stdout = run_ok(&data, &["status"]);
    assert_eq!(status_of(&stdout, "m1"), "N/A");
    assert_eq!(status_of(&stdout, "dl"), "Never Installed");
    assert_eq!(status_of(&stdout, "old"), "Uninstalled");
}

#[test]
fn reference_selection_drives_status() {
    let data = TempData::new("reference");
    let stdout = run_ok(&data, &["reference", "base"]);
    assert!(stdout.contains("Reference of 'main': base"));
    assert_eq!(data.library()["profiles"]["main"]["features"]["reference_profile"], "base");

    let stdout = run_ok(&data, &["status"]);
    assert_eq!(status_of(&stdout, "m1"), "Enabled");
    assert_eq!(status_of(&stdout, "m2"), "Disabled");

    let stdout = run_ok(&data, &["reference", "none"]);
    assert!(stdout.contains("cleared"));
    let stdout = run_ok(&data, &["status"]);
    assert_eq!(status_of(&stdout, "m1"), "N/A");
}

#[test]
fn reference_must_share_the_game() {
    let data = TempData::new("other-game");
    let output = run(&data, &["reference", "elsewhere"]);
    assert!(!output.status.success());
    assert!(data.library()["profiles"]["main"]["features"]
        .get("reference_profile")
        .is_none());
}

#[test]
fn toggle_writes_to_reference_profile() {
    let data = TempData::new("toggle");
    run_ok(&data, &["reference", "base"]);

    let stdout = run_ok(&data, &["toggle", "m1", "m2"]);
    assert_eq!(status_of(&stdout, "m1"), "Disabled");
    assert_eq!(status_of(&stdout, "m2"), "Enabled");

    let library = data.library();
    assert_eq!(library["profiles"]["base"]["mod_state"]["m2"]["enabled"], true);
    assert_eq!(library["profiles"]["base"]["mod_state"]["m1"]["enabled"], false);
    assert!(library["profiles"]["main"]["mod_state"].get("m2").is_none());
}

#[test]
fn toggle_of_downloaded_mod_requests_install() {
    let data = TempData::new("install");
    run_ok(&data, &["reference", "base"]);

    let stdout = run_ok(&data, &["toggle", "dl"]);
    assert!(stdout.contains("Install requested: dl"));
    assert_eq!(status_of(&stdout, "dl"), "Disabled");

    let library = data.library();
    assert_eq!(library["mods"]["skyrim"]["dl"]["state"], "installed");
    assert!(library["profiles"]["base"]["mod_state"].get("dl").is_none());
}

#[test]
fn set_and_json_filter() {
    let data = TempData::new("set");
    run_ok(&data, &["reference", "base"]);
    run_ok(&data, &["set", "enabled", "m2"]);

    let stdout = run_ok(&data, &["--format", "json", "status", "--filter", "Enabled"]);
    let items: Value = serde_json::from_str(&stdout).expect("status json");
    let ids: Vec<&str> = items
        .as_array()
        .expect("array")
        .iter()
        .filter_map(|item| item["id"].as_str())
        .collect();
    assert_eq!(ids, vec!["m1", "m2"]);

    run_ok(&data, &["set", "bogus", "m1"]);
    let stdout = run_ok(&data, &["status"]);
    assert_eq!(status_of(&stdout, "m1"), "Disabled");
}

#[test]
fn disabled_choices_fail_without_writing() {
    let data = TempData::new("disabled-choice");
    run_ok(&data, &["reference", "base"]);
    for value in ["uninstalled", "noprofile"] {
        let output = run(&data, &["set", value, "m1"]);
        assert!(!output.status.success());
        assert!(String::from_utf8_lossy(&output.stderr).contains("cannot be chosen"));
    }
    assert_eq!(data.library()["profiles"]["base"]["mod_state"]["m1"]["enabled"], true);
}

#[test]
fn unknown_mod_and_filter_are_rejected() {
    let data = TempData::new("errors");
    assert!(!run(&data, &["toggle", "missing"]).status.success());
    assert!(!run(&data, &["status", "--filter", "Sideways"]).status.success());
}

#[test]
fn profiles_lists_reference() {
    let data = TempData::new("profiles");
    run_ok(&data, &["reference", "base"]);
    let stdout = run_ok(&data, &["profiles"]);
    assert!(stdout.contains("* main (Main) [skyrim] -> base"));
    assert!(stdout.contains("  elsewhere (Elsewhere) [fallout4]"));
}

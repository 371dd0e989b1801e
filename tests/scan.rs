use assert_cmd::Command;
use assert_fs::prelude::*;
use predicates::prelude::*;

fn command() -> Command {
    Command::cargo_bin("devsweep").expect("binary exists")
}

#[test]
fn scan_include_reports_npm_cache() {
    let temp = assert_fs::TempDir::new().unwrap();
    let home = temp.child("home");
    home.child(".npm/_cacache/index").write_str("cached tarball").unwrap();
    home.child(".npm/_logs/debug.log").write_str("log line").unwrap();

    let mut cmd = command();
    cmd.env("HOME", home.path())
        .env("XDG_CONFIG_HOME", temp.child("config").path())
        .arg("scan")
        .arg("--include")
        .arg("npm")
        .arg("--verbose");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Scan results"))
        .stdout(predicate::str::contains("npm"))
        .stdout(predicate::str::contains("~/.npm"))
        .stdout(predicate::str::contains("[logs]"))
        .stdout(predicate::str::contains("Total reclaimable"))
        .stdout(predicate::str::contains("cargo").not());
}

#[test]
fn alias_sc_works_like_scan() {
    let temp = assert_fs::TempDir::new().unwrap();
    let home = temp.child("home");
    home.create_dir_all().unwrap();

    let mut cmd = command();
    cmd.env("HOME", home.path())
        .env("XDG_CONFIG_HOME", temp.child("config").path())
        .arg("sc")
        .arg("--include")
        .arg("npm");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Scan results"))
        .stdout(predicate::str::contains("Total reclaimable"));
}

#[test]
fn scan_json_emits_one_entry_per_selected_source() {
    let temp = assert_fs::TempDir::new().unwrap();
    let home = temp.child("home");
    home.child(".npm/_cacache/index").write_str("cached tarball").unwrap();

    let mut cmd = command();
    cmd.env("HOME", home.path())
        .env("XDG_CONFIG_HOME", temp.child("config").path())
        .arg("scan")
        .arg("--include")
        .arg("npm")
        .arg("--include")
        .arg("yarn")
        .arg("--json");

    let output = cmd.assert().success().get_output().stdout.clone();
    let parsed: serde_json::Value = serde_json::from_slice(&output).unwrap();
    let entries = parsed.as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["name"], "npm");
    assert_eq!(entries[0]["is_installed"], true);
    assert!(entries[0]["size"].as_u64().unwrap() > 0);
    assert_eq!(entries[1]["name"], "yarn");
}

#[test]
fn scan_rejects_unknown_type() {
    let temp = assert_fs::TempDir::new().unwrap();

    let mut cmd = command();
    cmd.env("HOME", temp.path())
        .env("XDG_CONFIG_HOME", temp.child("config").path())
        .arg("scan")
        .arg("--type")
        .arg("spaceship");

    cmd.assert().failure().stderr(predicate::str::contains("spaceship"));
}

#[test]
fn version_flag_prints_version() {
    command()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

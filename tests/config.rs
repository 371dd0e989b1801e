use assert_cmd::Command;
use assert_fs::prelude::*;
use predicates::prelude::*;
use std::fs;

fn command() -> Command {
    Command::cargo_bin("devsweep").expect("binary exists")
}

#[test]
fn config_protect_is_persisted_and_path_is_printed() {
    let temp = assert_fs::TempDir::new().unwrap();
    let home = temp.child("home");
    home.create_dir_all().unwrap();
    let config_root = temp.child("xdg-config");

    let mut protect = command();
    protect
        .env("HOME", home.path())
        .env("XDG_CONFIG_HOME", config_root.path())
        .arg("config")
        .arg("--protect")
        .arg("~/.cargo/registry/**");
    protect
        .assert()
        .success()
        .stdout(predicate::str::contains("Added protected pattern '~/.cargo/registry/**'."));

    let contents = fs::read_to_string(config_root.child("devsweep/config.toml").path()).unwrap();
    assert!(contents.contains(".cargo/registry/**"));

    let mut path_cmd = command();
    path_cmd
        .env("HOME", home.path())
        .env("XDG_CONFIG_HOME", config_root.path())
        .arg("config")
        .arg("--path");
    path_cmd
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration file"))
        .stdout(predicate::str::contains("devsweep/config.toml"));
}

#[test]
fn disabled_source_is_skipped_by_default_scan() {
    let temp = assert_fs::TempDir::new().unwrap();
    let home = temp.child("home");
    home.child(".npm/_cacache/index").write_str("cached tarball").unwrap();
    let config_root = temp.child("xdg-config");

    let mut disable = command();
    disable
        .env("HOME", home.path())
        .env("XDG_CONFIG_HOME", config_root.path())
        .arg("cfg")
        .arg("--disable")
        .arg("npm");
    disable.assert().success().stdout(predicate::str::contains("Disabled source 'npm'."));

    let contents = fs::read_to_string(config_root.child("devsweep/config.toml").path()).unwrap();
    assert!(contents.contains("npm = false"));

    let mut list = command();
    list.env("HOME", home.path()).env("XDG_CONFIG_HOME", config_root.path()).arg("list");
    list.assert()
        .success()
        .stdout(predicate::str::contains("Registered cache sources"))
        .stdout(
            predicate::str::is_match(r"- npm\s+package-manager\s+installed\s+disabled")
                .unwrap(),
        );

    let mut scan = command();
    scan.env("HOME", home.path())
        .env("XDG_CONFIG_HOME", config_root.path())
        .arg("scan")
        .arg("--type")
        .arg("package-manager")
        .arg("--json");
    let output = scan.assert().success().get_output().stdout.clone();
    let parsed: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert!(parsed.as_array().unwrap().iter().all(|entry| entry["name"] != "npm"));
}

#[test]
fn enabling_unknown_source_fails() {
    let temp = assert_fs::TempDir::new().unwrap();

    let mut cmd = command();
    cmd.env("HOME", temp.path())
        .env("XDG_CONFIG_HOME", temp.child("config").path())
        .arg("config")
        .arg("--enable")
        .arg("floppy-disk");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Unknown cache source 'floppy-disk'"));
    temp.child("config/devsweep/config.toml").assert(predicate::path::missing());
}

#[test]
fn broken_config_is_reported() {
    let temp = assert_fs::TempDir::new().unwrap();
    let config_root = temp.child("config");
    config_root.child("devsweep/config.toml").write_str("protected = [").unwrap();

    let mut cmd = command();
    cmd.env("HOME", temp.path()).env("XDG_CONFIG_HOME", config_root.path()).arg("list");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Failed to parse configuration"));
}

//! End-to-end tests for the `tprops` binary.
//!
//! Every command runs in its own process, so these tests also cover the
//! cross-process paths: revision checks, the file lock and recovery from
//! files written by someone else.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command as StdCommand;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

// =============================================================================
// Test Fixtures
// =============================================================================

/// A store root plus a config file defining the `main` store.
struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().expect("failed to create temp dir");
        let config = format!(
            r#"root = "{root}"
process = "launcher"

[lock]
max_attempts = 500
backoff_ms = 5

[stores.main]
secure_owner = "settings-app"

[stores.main.shared]
server_url = "https://example.invalid"

[stores.main.device]
first_launch = "true"
retries = "3"

[stores.main.secure]
admin_pw = ""
"#,
            root = dir.path().join("stores").display()
        );
        fs::write(dir.path().join("config.toml"), config).expect("write config");
        Self { dir }
    }

    fn config_path(&self) -> PathBuf {
        self.dir.path().join("config.toml")
    }

    fn store_dir(&self) -> PathBuf {
        self.dir.path().join("stores").join("main")
    }

    /// `tprops --config <fixture>` acting as the default process.
    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("tprops").expect("binary built");
        cmd.env_remove("TPROPS_LOG")
            .env_remove("TPROPS_CONFIG")
            .arg("--config")
            .arg(self.config_path());
        cmd
    }

    /// Same as [`Fixture::cmd`] but acting as the secure owner.
    fn owner(&self) -> Command {
        let mut cmd = self.cmd();
        cmd.args(["--process", "settings-app"]);
        cmd
    }

    fn get(&self, key: &str) -> String {
        let output = self.cmd().args(["get", "main", key]).output().expect("run get");
        assert!(output.status.success(), "get {} failed: {:?}", key, output);
        String::from_utf8(output.stdout).unwrap().trim_end().to_string()
    }
}

fn read(path: &Path) -> String {
    fs::read_to_string(path).unwrap_or_default()
}

// =============================================================================
// Reads and writes
// =============================================================================

#[test]
fn first_launch_across_processes() {
    let fx = Fixture::new();

    fx.cmd()
        .args(["get", "main", "first_launch", "--bool"])
        .assert()
        .success()
        .stdout("true\n");

    fx.cmd()
        .args(["set", "main", "first_launch=false"])
        .assert()
        .success();

    fx.cmd()
        .args(["get", "main", "first_launch", "--bool"])
        .assert()
        .success()
        .stdout("false\n");

    fx.cmd().args(["unset", "main", "first_launch"]).assert().success();
    assert_eq!(fx.get("first_launch"), "true");
}

#[test]
fn absent_key_exits_with_one() {
    let fx = Fixture::new();

    fx.cmd()
        .args(["get", "main", "nope"])
        .assert()
        .code(1)
        .stdout("")
        .stderr(predicate::str::contains("not set"));

    fx.cmd()
        .args(["set", "main", "word=abc"])
        .assert()
        .success();
    fx.cmd()
        .args(["get", "main", "word", "--int"])
        .assert()
        .code(1);
}

#[test]
fn tiers_land_in_separate_files() {
    let fx = Fixture::new();

    fx.owner()
        .args(["set", "main", "server_url=https://a", "retries=7", "admin_pw=s3cret"])
        .assert()
        .success();

    let shared = read(&fx.store_dir().join("shared/properties.toml"));
    let device = read(&fx.store_dir().join("device/properties.toml"));
    let secure = read(&fx.store_dir().join("secure/properties.toml"));

    assert!(shared.contains("server_url") && !shared.contains("retries"));
    assert!(device.contains("retries") && !device.contains("server_url"));
    assert!(secure.contains("admin_pw") && !device.contains("admin_pw"));
    assert!(fx.store_dir().join("device/rev.1").exists());
}

#[test]
fn secure_tier_requires_owner() {
    let fx = Fixture::new();

    fx.cmd()
        .args(["set", "main", "admin_pw=x"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("permission denied"));

    fx.cmd()
        .args(["get", "main", "admin_pw"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("permission denied"));

    fx.owner()
        .args(["set", "main", "admin_pw=x"])
        .assert()
        .success();
    fx.owner()
        .args(["get", "main", "admin_pw"])
        .assert()
        .success()
        .stdout("x\n");
}

#[test]
fn list_as_json() {
    let fx = Fixture::new();
    fx.cmd().args(["set", "main", "extra=1"]).assert().success();

    let output = fx.cmd().args(["list", "main", "--json"]).output().unwrap();
    assert!(output.status.success());
    let listing: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();

    assert_eq!(listing["shared"]["extra"], "1");
    assert_eq!(listing["shared"]["server_url"], "https://example.invalid");
    assert_eq!(listing["device"]["first_launch"], "true");
    assert!(listing.get("secure").is_none());

    let owned = fx.owner().args(["list", "main", "--json"]).output().unwrap();
    let listing: serde_json::Value = serde_json::from_slice(&owned.stdout).unwrap();
    assert_eq!(listing["secure"]["admin_pw"], "");
}

#[test]
fn list_single_tier_as_text() {
    let fx = Fixture::new();

    fx.cmd()
        .args(["list", "main", "--tier", "device"])
        .assert()
        .success()
        .stdout("[device]\nfirst_launch = true\nretries = 3\n");
}

// =============================================================================
// Cross-process coordination
// =============================================================================

#[test]
fn external_change_visible_after_signal() {
    let fx = Fixture::new();
    fx.cmd()
        .args(["set", "main", "server_url=https://old"])
        .assert()
        .success();
    fx.cmd().args(["revision", "main"]).assert().stdout("1\n");

    fs::write(
        fx.store_dir().join("shared/properties.toml"),
        "server_url = \"https://synced\"\n",
    )
    .unwrap();

    fx.cmd().args(["signal", "main"]).assert().success();
    fx.cmd().args(["revision", "main"]).assert().stdout("2\n");
    assert_eq!(fx.get("server_url"), "https://synced");
}

#[test]
fn concurrent_writers_lose_nothing() {
    let fx = Fixture::new();
    let binary = assert_cmd::cargo::cargo_bin("tprops");
    const WRITERS: usize = 4;
    const KEYS_EACH: usize = 5;

    let children: Vec<_> = (0..WRITERS)
        .map(|w| {
            let binary = binary.clone();
            let config = fx.config_path();
            std::thread::spawn(move || {
                for k in 0..KEYS_EACH {
                    let entry = format!("w{}_k{}=v", w, k);
                    let status = StdCommand::new(&binary)
                        .arg("--config")
                        .arg(&config)
                        .args(["-q", "set", "main", entry.as_str()])
                        .env_remove("TPROPS_LOG")
                        .status()
                        .expect("spawn tprops");
                    assert!(status.success());
                }
            })
        })
        .collect();
    for child in children {
        child.join().unwrap();
    }

    let output = fx.cmd().args(["list", "main", "--tier", "shared", "--json"]).output().unwrap();
    let listing: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    for w in 0..WRITERS {
        for k in 0..KEYS_EACH {
            assert_eq!(listing["shared"][format!("w{}_k{}", w, k)], "v");
        }
    }

    fx.cmd()
        .args(["revision", "main"])
        .assert()
        .stdout(predicate::str::diff(format!("{}\n", WRITERS * KEYS_EACH)));
}

#[test]
fn interrupted_replace_recovered_by_next_process() {
    let fx = Fixture::new();
    fx.cmd().args(["set", "main", "retries=9"]).assert().success();

    // Simulate a crash right after the current file was moved aside.
    let device = fx.store_dir().join("device");
    fs::rename(device.join("properties.toml"), device.join("properties.toml.bak0")).unwrap();
    fs::write(device.join("properties.toml.tmp"), "retries = \"10\"\n").unwrap();

    assert_eq!(fx.get("retries"), "9");
    assert!(device.join("properties.toml").exists());
}

// =============================================================================
// Maintenance
// =============================================================================

#[test]
fn clear_keeps_shared_and_installation() {
    let fx = Fixture::new();

    let id = fx.owner().args(["installation-id", "main"]).output().unwrap();
    assert!(id.status.success());
    let id = String::from_utf8(id.stdout).unwrap();

    fx.owner()
        .args(["set", "main", "server_url=https://kept", "retries=1", "admin_pw=x"])
        .assert()
        .success();
    fx.owner().args(["clear", "main"]).assert().success();

    assert_eq!(fx.get("server_url"), "https://kept");
    assert_eq!(fx.get("retries"), "3");
    fx.owner().args(["get", "main", "admin_pw"]).assert().stdout("\n");
    fx.owner()
        .args(["installation-id", "main"])
        .assert()
        .success()
        .stdout(predicate::str::diff(id));
}

#[test]
fn installation_id_is_owner_only() {
    let fx = Fixture::new();
    fx.cmd()
        .args(["installation-id", "main"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("permission denied"));
}

#[test]
fn invalid_store_name_fails() {
    let fx = Fixture::new();
    fx.cmd()
        .args(["get", "main/../x", "k"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("invalid store name"));
}

#[test]
fn completion_does_not_need_config() {
    let mut cmd = Command::cargo_bin("tprops").unwrap();
    cmd.args(["--config", "/nonexistent/config.toml", "completion", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("tprops"));
}

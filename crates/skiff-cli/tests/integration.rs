use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// A command with a scratch home so no real token cache or AWS profile
/// leaks into the test.
fn skiff(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("skiff").unwrap();
    cmd.env("HOME", home.path())
        .env("XDG_CACHE_HOME", home.path().join("cache"))
        .env("AWS_REGION", "us-east-1")
        .env("AWS_EC2_METADATA_DISABLED", "true")
        .env_remove("SKIFF_APP");
    cmd
}

// ---------------------------------------------------------------------------
// Argument surface
// ---------------------------------------------------------------------------

#[test]
fn help_lists_command_surface() {
    let home = TempDir::new().unwrap();
    skiff(&home)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("auth"))
        .stdout(predicate::str::contains("create"))
        .stdout(predicate::str::contains("deployments"))
        .stdout(predicate::str::contains("pipelines"))
        .stdout(predicate::str::contains("shell"));
}

#[test]
fn version_flag_works() {
    let home = TempDir::new().unwrap();
    skiff(&home)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("skiff"));
}

#[test]
fn unknown_command_fails() {
    let home = TempDir::new().unwrap();
    skiff(&home).arg("frobnicate").assert().failure();
}

#[test]
fn destroy_app_requires_a_name() {
    let home = TempDir::new().unwrap();
    skiff(&home).args(["destroy", "app"]).assert().failure();
}

#[test]
fn config_set_rejects_bare_keys() {
    let home = TempDir::new().unwrap();
    skiff(&home)
        .args(["-a", "demo", "config", "set", "NOVALUE"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("expected KEY=value"));
}

// ---------------------------------------------------------------------------
// App context requirements
// ---------------------------------------------------------------------------

#[test]
fn config_requires_an_app() {
    let home = TempDir::new().unwrap();
    skiff(&home)
        .args(["config", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no application given"));
}

#[test]
fn promote_requires_an_app() {
    let home = TempDir::new().unwrap();
    skiff(&home)
        .args(["pipelines", "promote", "--to", "prod"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no application given"));
}

#[test]
fn db_requires_an_app() {
    let home = TempDir::new().unwrap();
    skiff(&home)
        .args(["db", "dump"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no application given"));
}

// ---------------------------------------------------------------------------
// Offline auth failure modes
// ---------------------------------------------------------------------------

#[test]
fn whoami_requires_login() {
    let home = TempDir::new().unwrap();
    skiff(&home)
        .args(["auth", "whoami"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not logged in"));
}

#[test]
fn app_commands_require_login() {
    let home = TempDir::new().unwrap();
    skiff(&home)
        .args(["-a", "demo", "config", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not logged in"));
}

#[test]
fn logout_without_login_is_fine() {
    let home = TempDir::new().unwrap();
    skiff(&home)
        .args(["auth", "logout"])
        .assert()
        .success();
}

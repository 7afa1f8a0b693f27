//! Behavioural smoke tests for the CLI entrypoint.

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::TempDir;

#[test]
fn cli_lists_lifecycle_subcommands() {
    let mut cmd = cargo_bin_cmd!("yandex-machine");
    cmd.arg("--help");
    cmd.assert().success().stdout(
        predicate::str::contains("create")
            .and(predicate::str::contains("remove"))
            .and(predicate::str::contains("url")),
    );
}

#[test]
fn cli_without_arguments_prints_help() {
    let mut cmd = cargo_bin_cmd!("yandex-machine");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn instance_verbs_require_an_instance_id() {
    let mut cmd = cargo_bin_cmd!("yandex-machine");
    cmd.arg("stop");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("INSTANCE_ID"));
}

#[test]
fn create_reports_a_missing_public_key_before_calling_the_api() {
    let home = TempDir::new().unwrap_or_else(|err| panic!("temp dir: {err}"));
    let key_path = home.path().join("missing_key");
    let key_arg = key_path
        .to_str()
        .unwrap_or_else(|| panic!("temp path should be UTF-8"));

    let mut cmd = cargo_bin_cmd!("yandex-machine");
    cmd.current_dir(home.path())
        .env("HOME", home.path())
        .env("XDG_CONFIG_HOME", home.path())
        .env("YC_TOKEN", "t1.smoke.token")
        .env("YC_ENDPOINT", "http://127.0.0.1:9")
        .args(["create", "docker-host", "--ssh-key", key_arg]);

    cmd.assert()
        .code(1)
        .stdout("")
        .stderr(predicate::str::contains("failed to read the SSH public key"));
}

#[test]
fn create_reports_a_missing_user_data_file_before_resolving_credentials() {
    let home = TempDir::new().unwrap_or_else(|err| panic!("temp dir: {err}"));
    let key_path = home.path().join("id_ed25519");
    std::fs::write(home.path().join("id_ed25519.pub"), "ssh-ed25519 AAAAC3Nza smoke")
        .unwrap_or_else(|err| panic!("public key should be written: {err}"));
    let key_arg = key_path
        .to_str()
        .unwrap_or_else(|| panic!("temp path should be UTF-8"));

    let mut cmd = cargo_bin_cmd!("yandex-machine");
    cmd.current_dir(home.path())
        .env("HOME", home.path())
        .env("XDG_CONFIG_HOME", home.path())
        .env_remove("YC_TOKEN")
        .env_remove("YC_SA_KEY_FILE")
        .env("YC_FETCH_TOKEN_URL", "http://127.0.0.1:9/token")
        .env("YC_USERDATA", "missing-user-data.yaml")
        .args(["create", "docker-host", "--ssh-key", key_arg]);

    cmd.assert().code(1).stdout("").stderr(
        predicate::str::contains("user-data file")
            .and(predicate::str::contains("does not exist"))
            .and(predicate::str::contains("failed to connect").not()),
    );
}

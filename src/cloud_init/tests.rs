//! Unit tests for boot metadata composition.

use std::io::Write;

use camino::Utf8PathBuf;
use rstest::rstest;

use super::*;
use crate::test_helpers::machine_config;

const KEY: &str = "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIFake user@host";

fn temp_file(contents: &str) -> (tempfile::NamedTempFile, Utf8PathBuf) {
    let mut file = tempfile::NamedTempFile::new()
        .unwrap_or_else(|err| panic!("temp file should be created: {err}"));
    file.write_all(contents.as_bytes())
        .unwrap_or_else(|err| panic!("temp file should be written: {err}"));
    let path = Utf8PathBuf::from_path_buf(file.path().to_path_buf())
        .unwrap_or_else(|_| panic!("temp path should be UTF-8"));
    (file, path)
}

#[test]
fn bootstrap_without_mounts_matches_template() {
    let document = render_bootstrap("debian", KEY, &[]);

    let expected = format!(
        "#cloud-config\nssh_pwauth: no\n\nusers:\n  - name: debian\n    sudo: ALL=(ALL) NOPASSWD:ALL\n    shell: /bin/bash\n    ssh_authorized_keys:\n      - {KEY}\n"
    );
    assert_eq!(document, expected);
}

#[test]
fn bootstrap_with_mounts_adds_runcmd() {
    let mounts = vec![FilesystemMount {
        mount_path: String::from("/data"),
        filesystem_id: String::from("fs-1"),
    }];

    let document = render_bootstrap("ubuntu", KEY, &mounts);

    assert!(document.ends_with("\nruncmd:\n  - mkdir /data\n  - mount -t virtiofs data /data\n"));
}

#[test]
fn single_part_document_has_one_users_block() {
    let config = machine_config();

    let metadata = prepare_metadata(&config, KEY)
        .unwrap_or_else(|err| panic!("metadata should be prepared: {err}"));
    let user_data = metadata
        .get(USER_DATA_KEY)
        .unwrap_or_else(|| panic!("user-data should be present"));

    assert!(user_data.starts_with("#cloud-config\n"));
    assert_eq!(user_data.matches("users:").count(), 1);
    assert!(!user_data.contains(MIME_BOUNDARY));
    assert_eq!(
        metadata.get(SSH_KEYS_KEY).map(String::as_str),
        Some(format!("ubuntu:{KEY}").as_str())
    );
}

#[test]
fn multi_part_document_puts_generated_part_last() {
    let (_file, path) = temp_file("#cloud-config\npackages:\n  - git\n");
    let mut config = machine_config();
    config.user_data_file = Some(path);

    let metadata = prepare_metadata(&config, KEY)
        .unwrap_or_else(|err| panic!("metadata should be prepared: {err}"));
    let user_data = metadata
        .get(USER_DATA_KEY)
        .unwrap_or_else(|| panic!("user-data should be present"));

    let user_part = user_data
        .find("custom-user-data.yaml")
        .unwrap_or_else(|| panic!("user part missing"));
    let generated_part = user_data
        .find("yandex-machine-driver.yaml")
        .unwrap_or_else(|| panic!("generated part missing"));
    assert!(user_part < generated_part);
    assert!(user_data.contains("packages:\r\n  - git\r\n"));
    assert!(user_data.ends_with("--DOCKERMACHINEMIMEBOUNDARY--\r\n"));
}

#[test]
fn missing_user_data_file_is_a_precondition_failure() {
    let dir = tempfile::tempdir().unwrap_or_else(|err| panic!("temp dir: {err}"));
    let path = Utf8PathBuf::from_path_buf(dir.path().join("missing.yaml"))
        .unwrap_or_else(|_| panic!("temp path should be UTF-8"));
    let mut config = machine_config();
    config.user_data_file = Some(path.clone());

    let result = prepare_metadata(&config, KEY);

    assert_eq!(
        result,
        Err(CloudInitError::UserDataFileMissing {
            path: path.to_string()
        })
    );
}

#[test]
fn malformed_mounts_degrade_to_no_runcmd() {
    let mut config = machine_config();
    config.filesystems = vec![String::from("/data-without-id")];

    let metadata = prepare_metadata(&config, KEY)
        .unwrap_or_else(|err| panic!("metadata should be prepared: {err}"));

    assert!(
        metadata
            .get(USER_DATA_KEY)
            .is_some_and(|data| !data.contains("runcmd"))
    );
}

#[test]
fn reserved_metadata_keys_override_configured_entries() {
    let mut config = machine_config();
    config
        .metadata
        .insert(String::from("user-data"), String::from("stale"));
    config
        .metadata
        .insert(String::from("serial-port-enable"), String::from("1"));

    let metadata = prepare_metadata(&config, KEY)
        .unwrap_or_else(|err| panic!("metadata should be prepared: {err}"));

    assert_eq!(metadata.get("serial-port-enable").map(String::as_str), Some("1"));
    assert_ne!(metadata.get(USER_DATA_KEY).map(String::as_str), Some("stale"));
}

#[rstest]
#[case::with_content("ssh-ed25519 AAAA key\n", Ok(String::from("ssh-ed25519 AAAA key")))]
#[case::blank("   \n", Err(CloudInitError::PublicKeyEmpty { path: String::new() }))]
fn public_key_is_read_from_pub_file(
    #[case] contents: &str,
    #[case] expected: Result<String, CloudInitError>,
) {
    let dir = tempfile::tempdir().unwrap_or_else(|err| panic!("temp dir: {err}"));
    let key_path = Utf8PathBuf::from_path_buf(dir.path().join("id_ed25519"))
        .unwrap_or_else(|_| panic!("temp path should be UTF-8"));
    let public_path = format!("{key_path}.pub");
    std::fs::write(&public_path, contents)
        .unwrap_or_else(|err| panic!("write public key: {err}"));
    let mut identity = machine_config().identity;
    identity.set_ssh_key_path(key_path);

    let result = read_public_key(&identity);

    match expected {
        Ok(key) => assert_eq!(result, Ok(key)),
        Err(_) => assert_eq!(
            result,
            Err(CloudInitError::PublicKeyEmpty { path: public_path })
        ),
    }
}

#[test]
fn unreadable_public_key_is_reported() {
    let mut identity = machine_config().identity;
    identity.set_ssh_key_path(Utf8PathBuf::from("/nonexistent/dir/id_rsa"));

    assert!(matches!(
        read_public_key(&identity),
        Err(CloudInitError::PublicKeyRead { .. })
    ));
}

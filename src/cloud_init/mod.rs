//! Boot-time user-data for new machines.
//!
//! Every machine receives a generated cloud-config that provisions the SSH
//! user and mounts attached filesystems. An optional user-supplied document
//! is combined with it into a two-part MIME message (see [`mime`]).

use std::collections::BTreeMap;

use camino::Utf8Path;
use thiserror::Error;

use crate::files::{expand_tilde, file_exists_ambient, read_to_string_ambient};
use crate::machine::{FilesystemMount, MachineConfig, SshHost};

pub mod mime;

pub use mime::{MIME_BOUNDARY, combine_cloud_configs};

/// Metadata key carrying the boot document.
pub const USER_DATA_KEY: &str = "user-data";

/// Metadata key carrying `user:public-key`.
pub const SSH_KEYS_KEY: &str = "ssh-keys";

/// Errors raised while preparing boot metadata.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum CloudInitError {
    /// Raised when the configured user-data file does not exist.
    #[error("user-data file `{path}` does not exist")]
    UserDataFileMissing {
        /// Expanded path that was checked.
        path: String,
    },
    /// Raised when reading the user-data file fails.
    #[error("failed to read user-data file `{path}`: {message}")]
    UserDataFileRead {
        /// Expanded path that failed to read.
        path: String,
        /// Underlying error message.
        message: String,
    },
    /// Raised when the SSH public key cannot be read.
    #[error("failed to read SSH public key `{path}`: {message}")]
    PublicKeyRead {
        /// Path of the public key.
        path: String,
        /// Underlying error message.
        message: String,
    },
    /// Raised when the SSH public key file is empty.
    #[error("SSH public key `{path}` is empty")]
    PublicKeyEmpty {
        /// Path of the public key.
        path: String,
    },
}

/// Renders the generated cloud-config for `ssh_user` and `public_key`.
///
/// When mounts are given a `runcmd` section creates each mount point and
/// mounts the virtiofs device into it.
#[must_use]
pub fn render_bootstrap(ssh_user: &str, public_key: &str, mounts: &[FilesystemMount]) -> String {
    let mut document = format!(
        "#cloud-config\n\
         ssh_pwauth: no\n\
         \n\
         users:\n  \
         - name: {ssh_user}\n    \
         sudo: ALL=(ALL) NOPASSWD:ALL\n    \
         shell: /bin/bash\n    \
         ssh_authorized_keys:\n      \
         - {public_key}\n",
        public_key = public_key.trim()
    );

    if !mounts.is_empty() {
        document.push_str("\nruncmd:\n");
        for mount in mounts {
            document.push_str(&format!("  - mkdir {}\n", mount.mount_path));
            document.push_str(&format!(
                "  - mount -t virtiofs {} {}\n",
                mount.device_name(),
                mount.mount_path
            ));
        }
    }
    document
}

/// Produces the final user-data: the generated document verbatim, or a
/// multi-part message when a user document is supplied.
#[must_use]
pub fn compose_user_data(generated: &str, user_document: Option<&str>) -> String {
    match user_document {
        Some(document) => combine_cloud_configs(document, generated),
        None => generated.to_owned(),
    }
}

/// Loads the optional user-data file.
///
/// # Errors
///
/// Returns [`CloudInitError::UserDataFileMissing`] when the file does not
/// exist and [`CloudInitError::UserDataFileRead`] when it cannot be read.
pub fn load_user_data_file(path: Option<&Utf8Path>) -> Result<Option<String>, CloudInitError> {
    let Some(raw) = path.filter(|candidate| !candidate.as_str().trim().is_empty()) else {
        return Ok(None);
    };
    let expanded = expand_tilde(raw);
    if !file_exists_ambient(&expanded) {
        return Err(CloudInitError::UserDataFileMissing {
            path: expanded.to_string(),
        });
    }

    tracing::info!(path = %expanded, "using provided user-data file");
    read_to_string_ambient(&expanded)
        .map(Some)
        .map_err(|message| CloudInitError::UserDataFileRead {
            path: expanded.to_string(),
            message,
        })
}

/// Reads the public half of the host's SSH key pair.
///
/// # Errors
///
/// Returns [`CloudInitError`] when the `.pub` file is unreadable or empty.
pub fn read_public_key(host: &impl SshHost) -> Result<String, CloudInitError> {
    let key_path = expand_tilde(host.ssh_key_path());
    let public_path = camino::Utf8PathBuf::from(format!("{key_path}.pub"));
    let content = read_to_string_ambient(&public_path).map_err(|message| {
        CloudInitError::PublicKeyRead {
            path: public_path.to_string(),
            message,
        }
    })?;
    let key = content.trim();
    if key.is_empty() {
        return Err(CloudInitError::PublicKeyEmpty {
            path: public_path.to_string(),
        });
    }
    Ok(key.to_owned())
}

/// Builds the instance metadata: the configured free-form entries plus
/// `ssh-keys` and `user-data`, which always take precedence.
///
/// Malformed filesystem entries are logged and the `runcmd` section is
/// omitted; the request builder drops the filesystem specs in the same case.
///
/// # Errors
///
/// Returns [`CloudInitError`] when the user-data file is missing or
/// unreadable.
pub fn prepare_metadata(
    config: &MachineConfig,
    public_key: &str,
) -> Result<BTreeMap<String, String>, CloudInitError> {
    let user_document = load_user_data_file(config.user_data_file.as_deref())?;
    let mounts = config.parsed_filesystems().unwrap_or_else(|err| {
        tracing::warn!(error = %err, "ignoring filesystem mounts");
        Vec::new()
    });

    let ssh_user = config.identity.ssh_username();
    let generated = render_bootstrap(ssh_user, public_key, &mounts);
    let user_data = compose_user_data(&generated, user_document.as_deref());
    tracing::debug!(user_data = %user_data, "rendered user-data");

    let mut metadata = config.metadata.clone();
    metadata.insert(
        SSH_KEYS_KEY.to_owned(),
        format!("{ssh_user}:{}", public_key.trim()),
    );
    metadata.insert(USER_DATA_KEY.to_owned(), user_data);
    Ok(metadata)
}

#[cfg(test)]
mod tests;

//! Declarative description of the single machine the driver manages.
//!
//! [`MachineConfig`] is assembled by the configuration layer and owned by a
//! single lifecycle invocation. It is composed from smaller parts rather than
//! one flat record so each collaborator only reads the slice it needs.

use std::collections::BTreeMap;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;

/// Capability the provisioning core needs from the surrounding host
/// abstraction: who to log in as and which key pair to use.
pub trait SshHost {
    /// Returns the SSH login name.
    fn ssh_username(&self) -> &str;

    /// Returns the path of the private key; the public key lives next to it
    /// with a `.pub` suffix.
    fn ssh_key_path(&self) -> &Utf8Path;

    /// Replaces the private key path.
    fn set_ssh_key_path(&mut self, path: Utf8PathBuf);
}

/// Machine identity and SSH access details.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MachineIdentity {
    /// Instance name, unique within the target folder.
    pub name: String,
    /// SSH login name provisioned through cloud-init.
    pub ssh_user: String,
    /// SSH port.
    pub ssh_port: u16,
    /// Private key path.
    pub ssh_key_path: Utf8PathBuf,
}

impl MachineIdentity {
    /// Returns the path of the public key paired with [`Self::ssh_key_path`].
    #[must_use]
    pub fn public_key_path(&self) -> Utf8PathBuf {
        Utf8PathBuf::from(format!("{}.pub", self.ssh_key_path))
    }
}

impl SshHost for MachineIdentity {
    fn ssh_username(&self) -> &str {
        &self.ssh_user
    }

    fn ssh_key_path(&self) -> &Utf8Path {
        &self.ssh_key_path
    }

    fn set_ssh_key_path(&mut self, path: Utf8PathBuf) {
        self.ssh_key_path = path;
    }
}

/// Where the machine is created. Blank identifiers are derived from remote
/// inventory before the creation request is built.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Placement {
    /// Cloud identifier; only consulted when the folder is unknown.
    pub cloud_id: Option<String>,
    /// Folder identifier.
    pub folder_id: Option<String>,
    /// Availability zone.
    pub zone: String,
    /// Subnet identifier.
    pub subnet_id: Option<String>,
}

/// Compute shape of the machine.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ComputeShape {
    /// Hardware platform.
    pub platform_id: String,
    /// Number of virtual cores.
    pub cores: u32,
    /// Guaranteed core share in percent.
    pub core_fraction: u32,
    /// Memory in gigabytes.
    pub memory_gb: u32,
    /// Number of GPUs.
    pub gpus: u32,
    /// Whether the machine is preemptible.
    pub preemptible: bool,
}

/// Source of the boot disk contents.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ImageSource {
    /// Explicit image identifier.
    Id(String),
    /// Latest image of a family published in a folder.
    Family {
        /// Image family name.
        family: String,
        /// Folder the family is looked up in.
        folder_id: String,
    },
}

impl ImageSource {
    /// Picks the image source; a non-blank explicit identifier always wins
    /// over the family lookup.
    #[must_use]
    pub fn select(image_id: Option<&str>, family: &str, folder_id: &str) -> Self {
        match image_id.map(str::trim).filter(|id| !id.is_empty()) {
            Some(id) => Self::Id(id.to_owned()),
            None => Self::Family {
                family: family.trim().to_owned(),
                folder_id: folder_id.trim().to_owned(),
            },
        }
    }
}

/// Boot disk of the machine.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BootDisk {
    /// Disk type (for example `network-ssd`).
    pub disk_type: String,
    /// Disk size in gigabytes.
    pub size_gb: u32,
    /// Image the disk is created from.
    pub image: ImageSource,
}

/// Which reported address is used to reach the machine.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum AddressPolicy {
    /// External one-to-one NAT IPv4 address.
    #[default]
    External,
    /// Internal IPv4 address.
    Internal,
    /// IPv6 address.
    Ipv6,
}

impl AddressPolicy {
    /// Derives the policy from the two user-facing toggles; IPv6 wins.
    #[must_use]
    pub const fn from_flags(use_ipv6: bool, use_internal_ip: bool) -> Self {
        if use_ipv6 {
            Self::Ipv6
        } else if use_internal_ip {
            Self::Internal
        } else {
            Self::External
        }
    }
}

/// Network settings of the machine.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct NetworkPolicy {
    /// Whether to request a one-to-one NAT address.
    pub nat: bool,
    /// Static external address pinned when NAT is enabled.
    pub static_address: Option<String>,
    /// Security groups applied to the interface.
    pub security_group_ids: Vec<String>,
    /// Address used for SSH connectivity.
    pub address_policy: AddressPolicy,
}

/// API access settings and credential sources.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ApiConfig {
    /// Endpoint override applied to every provider service.
    pub endpoint: Option<String>,
    /// Static OAuth or IAM token.
    pub token: Option<String>,
    /// Service-account key file.
    pub service_account_key_file: Option<Utf8PathBuf>,
    /// Metadata-service URL used to obtain an ambient token.
    pub metadata_token_url: String,
}

/// Complete declarative description of one machine.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MachineConfig {
    /// Identity and SSH access.
    pub identity: MachineIdentity,
    /// Placement.
    pub placement: Placement,
    /// Compute shape.
    pub shape: ComputeShape,
    /// Boot disk.
    pub boot_disk: BootDisk,
    /// Network policy.
    pub network: NetworkPolicy,
    /// Filesystem mounts in `devicePath=filesystemID` form.
    pub filesystems: Vec<String>,
    /// Labels in `key=value` form.
    pub labels: Vec<String>,
    /// Free-form instance metadata.
    pub metadata: BTreeMap<String, String>,
    /// Service account bound to the instance.
    pub service_account_id: Option<String>,
    /// Cloud-init document merged into the generated one.
    pub user_data_file: Option<Utf8PathBuf>,
    /// API access and credentials.
    pub api: ApiConfig,
}

impl MachineConfig {
    /// Checks the invariants that do not need remote state.
    ///
    /// # Errors
    ///
    /// Returns [`MachineConfigError`] when the name or zone is blank or a
    /// size is zero.
    pub fn validate(&self) -> Result<(), MachineConfigError> {
        if self.identity.name.trim().is_empty() {
            return Err(MachineConfigError::MissingField("name"));
        }
        if self.placement.zone.trim().is_empty() {
            return Err(MachineConfigError::MissingField("zone"));
        }
        if self.shape.cores == 0 {
            return Err(MachineConfigError::NotPositive("cores"));
        }
        if self.shape.memory_gb == 0 {
            return Err(MachineConfigError::NotPositive("memory"));
        }
        if self.boot_disk.size_gb == 0 {
            return Err(MachineConfigError::NotPositive("disk_size"));
        }
        Ok(())
    }

    /// Parses the `key=value` labels. A label without `=` maps to an empty
    /// value; later duplicates replace earlier ones.
    #[must_use]
    pub fn parsed_labels(&self) -> BTreeMap<String, String> {
        self.labels
            .iter()
            .map(|pair| pair.trim())
            .filter(|pair| !pair.is_empty())
            .map(|pair| match pair.split_once('=') {
                Some((key, value)) => (key.to_owned(), value.to_owned()),
                None => (pair.to_owned(), String::new()),
            })
            .collect()
    }

    /// Parses the configured filesystem mounts.
    ///
    /// # Errors
    ///
    /// Returns [`FilesystemParseError`] for the first malformed entry.
    pub fn parsed_filesystems(&self) -> Result<Vec<FilesystemMount>, FilesystemParseError> {
        parse_filesystems(&self.filesystems)
    }
}

/// Errors raised by [`MachineConfig::validate`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum MachineConfigError {
    /// A required value is blank.
    #[error("machine {0} must not be empty")]
    MissingField(&'static str),
    /// A size is zero.
    #[error("machine {0} must be greater than zero")]
    NotPositive(&'static str),
}

/// Filesystem mounted into the guest at boot.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FilesystemMount {
    /// Absolute mount path inside the guest.
    pub mount_path: String,
    /// Provider filesystem identifier.
    pub filesystem_id: String,
}

impl FilesystemMount {
    /// Device name the filesystem is exposed under: the last segment of the
    /// mount path.
    #[must_use]
    pub fn device_name(&self) -> &str {
        self.mount_path
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default()
    }
}

/// Errors raised while parsing `devicePath=filesystemID` entries.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum FilesystemParseError {
    /// Entry has no `=` separator.
    #[error("filesystem entry `{0}` must use the form path=filesystem-id")]
    MissingSeparator(String),
    /// Mount path or filesystem identifier is blank.
    #[error("filesystem entry `{0}` has an empty path or filesystem id")]
    EmptyComponent(String),
    /// Mount path yields no device name.
    #[error("filesystem entry `{0}` does not name a device")]
    NoDeviceName(String),
    /// Two entries map to the same device name.
    #[error("filesystem device `{0}` is mounted more than once")]
    DuplicateDevice(String),
}

/// Parses filesystem mounts, preserving their order.
///
/// # Errors
///
/// Returns [`FilesystemParseError`] for the first malformed entry.
pub fn parse_filesystems(entries: &[String]) -> Result<Vec<FilesystemMount>, FilesystemParseError> {
    let mut mounts: Vec<FilesystemMount> = Vec::with_capacity(entries.len());
    for entry in entries {
        let trimmed = entry.trim();
        let (path, filesystem_id) = trimmed
            .split_once('=')
            .ok_or_else(|| FilesystemParseError::MissingSeparator(trimmed.to_owned()))?;
        let mount_path = path.trim();
        let id = filesystem_id.trim();
        if mount_path.is_empty() || id.is_empty() {
            return Err(FilesystemParseError::EmptyComponent(trimmed.to_owned()));
        }

        let mount = FilesystemMount {
            mount_path: mount_path.to_owned(),
            filesystem_id: id.to_owned(),
        };
        let device = mount.device_name();
        if device.is_empty() {
            return Err(FilesystemParseError::NoDeviceName(trimmed.to_owned()));
        }
        if mounts.iter().any(|known| known.device_name() == device) {
            return Err(FilesystemParseError::DuplicateDevice(device.to_owned()));
        }
        mounts.push(mount);
    }
    Ok(mounts)
}

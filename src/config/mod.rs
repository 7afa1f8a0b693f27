//! Configuration loading via `ortho-config`.
//!
//! [`YandexConfig`] is the flat, user-facing record merged from defaults,
//! `yandex-machine.toml`, and `YC_*` environment variables. It is converted
//! into the structured [`MachineConfig`] consumed by the lifecycle driver.

use std::collections::BTreeMap;
use std::ffi::OsString;

use camino::Utf8Path;
use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::credentials::DEFAULT_METADATA_TOKEN_URL;
use crate::files::expand_tilde;
use crate::machine::{
    AddressPolicy, ApiConfig, BootDisk, ComputeShape, ImageSource, MachineConfig,
    MachineIdentity, NetworkPolicy, Placement,
};

/// Folder that publishes the public image families.
pub const STANDARD_IMAGES_FOLDER_ID: &str = "standard-images";

/// Provider settings derived from environment variables and configuration
/// files.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "YC",
    discovery(
        app_name = "yandex-machine",
        env_var = "YC_CONFIG_PATH",
        config_file_name = "yandex-machine.toml",
        dotfile_name = ".yandex-machine.toml",
        project_file_name = "yandex-machine.toml"
    )
)]
#[expect(
    clippy::struct_excessive_bools,
    reason = "configuration struct with user-facing toggle settings that are naturally expressed as booleans"
)]
pub struct YandexConfig {
    /// API endpoint override: an API gateway host such as
    /// `api.cloud.yandex.net:443`, or a gateway URL serving every service.
    pub endpoint: Option<String>,
    /// OAuth or IAM token.
    pub token: Option<String>,
    /// Path to a service-account key file in JSON form.
    pub sa_key_file: Option<String>,
    /// Metadata-service URL queried for an ambient token when no explicit
    /// credential is configured.
    #[ortho_config(default = DEFAULT_METADATA_TOKEN_URL.to_owned())]
    pub fetch_token_url: String,
    /// Cloud identifier; only used to derive a missing folder.
    pub cloud_id: Option<String>,
    /// Folder identifier. Derived from the only folder of the only cloud
    /// when absent.
    pub folder_id: Option<String>,
    /// Availability zone.
    #[ortho_config(default = "ru-central1-a".to_owned())]
    pub zone: String,
    /// Subnet identifier. The first subnet in the zone is used when absent.
    pub subnet_id: Option<String>,
    /// Hardware platform.
    #[ortho_config(default = "standard-v1".to_owned())]
    pub platform_id: String,
    /// Number of virtual cores.
    #[ortho_config(default = 2)]
    pub cores: u32,
    /// Guaranteed core share in percent.
    #[ortho_config(default = 100)]
    pub core_fraction: u32,
    /// Memory in gigabytes.
    #[ortho_config(default = 1)]
    pub memory: u32,
    /// Number of GPUs.
    #[ortho_config(default = 0)]
    pub gpus: u32,
    /// Whether the machine is preemptible.
    #[ortho_config(default = false, skip_cli)]
    pub preemptible: bool,
    /// Boot disk type.
    #[ortho_config(default = "network-hdd".to_owned())]
    pub disk_type: String,
    /// Boot disk size in gigabytes.
    #[ortho_config(default = 20)]
    pub disk_size: u32,
    /// Explicit image identifier; wins over the family lookup.
    pub image_id: Option<String>,
    /// Image family resolved to its latest image.
    #[ortho_config(default = "ubuntu-2004-lts".to_owned())]
    pub image_family: String,
    /// Folder the image family is published in.
    #[ortho_config(default = STANDARD_IMAGES_FOLDER_ID.to_owned())]
    pub image_folder_id: String,
    /// Whether to request a one-to-one NAT address.
    #[ortho_config(default = false, skip_cli)]
    pub nat: bool,
    /// Static external address used with NAT.
    pub static_address: Option<String>,
    /// Comma-separated security group identifiers.
    pub security_groups: Option<String>,
    /// Whether SSH connects through the internal address.
    #[ortho_config(default = false, skip_cli)]
    pub use_internal_ip: bool,
    /// Whether SSH connects through the IPv6 address.
    #[ortho_config(default = false, skip_cli)]
    pub use_ipv6: bool,
    /// Comma-separated `path=filesystem-id` mounts.
    pub filesystems: Option<String>,
    /// Comma-separated `key=value` labels.
    pub labels: Option<String>,
    /// Comma-separated `key=value` metadata entries.
    pub metadata: Option<String>,
    /// Service account bound to the instance.
    pub sa_id: Option<String>,
    /// Path to a cloud-init document merged into the generated one.
    pub userdata: Option<String>,
    /// SSH login name.
    #[ortho_config(default = "ubuntu".to_owned())]
    pub ssh_user: String,
    /// SSH port.
    #[ortho_config(default = 22)]
    pub ssh_port: u16,
    /// Private key path; the public key is read from the `.pub` sibling.
    /// Supports tilde expansion.
    #[ortho_config(default = "~/.ssh/id_ed25519".to_owned())]
    pub ssh_key_path: String,
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }

    fn guidance(&self) -> String {
        format!(
            "set {} or add {} to yandex-machine.toml",
            self.env_var, self.toml_key
        )
    }
}

impl YandexConfig {
    fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(ConfigError::MissingField(format!(
                "missing {}: {}",
                metadata.description,
                metadata.guidance()
            )));
        }
        Ok(())
    }

    fn require_positive(value: u32, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if value == 0 {
            return Err(ConfigError::Invalid(format!(
                "{} must be greater than zero: {}",
                metadata.description,
                metadata.guidance()
            )));
        }
        Ok(())
    }

    /// Loads configuration without attempting to parse CLI arguments. Values
    /// still merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([OsString::from("yandex-machine")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Performs semantic validation. Error messages include guidance on how
    /// to provide values via environment variables or the configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required field is empty
    /// and [`ConfigError::Invalid`] when a value is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Self::require_field(
            &self.zone,
            &FieldMetadata::new("availability zone", "YC_ZONE", "zone"),
        )?;
        Self::require_field(
            &self.platform_id,
            &FieldMetadata::new("hardware platform", "YC_PLATFORM_ID", "platform_id"),
        )?;
        Self::require_field(
            &self.disk_type,
            &FieldMetadata::new("boot disk type", "YC_DISK_TYPE", "disk_type"),
        )?;
        if self.image_id.as_deref().is_none_or(|id| id.trim().is_empty()) {
            Self::require_field(
                &self.image_family,
                &FieldMetadata::new("image family", "YC_IMAGE_FAMILY", "image_family"),
            )?;
            Self::require_field(
                &self.image_folder_id,
                &FieldMetadata::new("image folder", "YC_IMAGE_FOLDER_ID", "image_folder_id"),
            )?;
        }
        Self::require_field(
            &self.ssh_user,
            &FieldMetadata::new("SSH user", "YC_SSH_USER", "ssh_user"),
        )?;
        Self::require_field(
            &self.ssh_key_path,
            &FieldMetadata::new("SSH key path", "YC_SSH_KEY_PATH", "ssh_key_path"),
        )?;
        Self::require_positive(
            self.cores,
            &FieldMetadata::new("core count", "YC_CORES", "cores"),
        )?;
        Self::require_positive(
            self.memory,
            &FieldMetadata::new("memory size", "YC_MEMORY", "memory"),
        )?;
        Self::require_positive(
            self.disk_size,
            &FieldMetadata::new("boot disk size", "YC_DISK_SIZE", "disk_size"),
        )?;
        if self.core_fraction == 0 || self.core_fraction > 100 {
            let metadata = FieldMetadata::new("core fraction", "YC_CORE_FRACTION", "core_fraction");
            return Err(ConfigError::Invalid(format!(
                "{} must be between 1 and 100: {}",
                metadata.description,
                metadata.guidance()
            )));
        }
        self.parsed_metadata()?;
        Ok(())
    }

    /// Builds the [`MachineConfig`] for a machine called `name`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when validation fails or the name is blank.
    pub fn as_machine_config(&self, name: &str) -> Result<MachineConfig, ConfigError> {
        self.validate()?;
        if name.trim().is_empty() {
            return Err(ConfigError::MissingField(String::from(
                "missing machine name: pass it to the create command",
            )));
        }

        Ok(MachineConfig {
            identity: MachineIdentity {
                name: name.trim().to_owned(),
                ssh_user: self.ssh_user.trim().to_owned(),
                ssh_port: self.ssh_port,
                ssh_key_path: expand_tilde(Utf8Path::new(self.ssh_key_path.trim())),
            },
            placement: Placement {
                cloud_id: non_blank(self.cloud_id.as_deref()),
                folder_id: non_blank(self.folder_id.as_deref()),
                zone: self.zone.trim().to_owned(),
                subnet_id: non_blank(self.subnet_id.as_deref()),
            },
            shape: ComputeShape {
                platform_id: self.platform_id.trim().to_owned(),
                cores: self.cores,
                core_fraction: self.core_fraction,
                memory_gb: self.memory,
                gpus: self.gpus,
                preemptible: self.preemptible,
            },
            boot_disk: BootDisk {
                disk_type: self.disk_type.trim().to_owned(),
                size_gb: self.disk_size,
                image: ImageSource::select(
                    self.image_id.as_deref(),
                    &self.image_family,
                    &self.image_folder_id,
                ),
            },
            network: NetworkPolicy {
                nat: self.nat,
                static_address: non_blank(self.static_address.as_deref()),
                security_group_ids: split_list(self.security_groups.as_deref()),
                address_policy: self.address_policy(),
            },
            filesystems: split_list(self.filesystems.as_deref()),
            labels: split_list(self.labels.as_deref()),
            metadata: self.parsed_metadata()?,
            service_account_id: non_blank(self.sa_id.as_deref()),
            user_data_file: non_blank(self.userdata.as_deref())
                .map(|path| expand_tilde(Utf8Path::new(&path))),
            api: self.api_config(),
        })
    }

    /// Returns the API access settings; instance verbs need nothing else.
    #[must_use]
    pub fn api_config(&self) -> ApiConfig {
        ApiConfig {
            endpoint: non_blank(self.endpoint.as_deref()),
            token: non_blank(self.token.as_deref()),
            service_account_key_file: non_blank(self.sa_key_file.as_deref())
                .map(|path| expand_tilde(Utf8Path::new(&path))),
            metadata_token_url: self.fetch_token_url.trim().to_owned(),
        }
    }

    /// Returns the address policy derived from the connectivity toggles.
    #[must_use]
    pub const fn address_policy(&self) -> AddressPolicy {
        AddressPolicy::from_flags(self.use_ipv6, self.use_internal_ip)
    }

    fn parsed_metadata(&self) -> Result<BTreeMap<String, String>, ConfigError> {
        split_list(self.metadata.as_deref())
            .into_iter()
            .map(|entry| match entry.split_once('=') {
                Some((key, value)) if !key.trim().is_empty() => {
                    Ok((key.trim().to_owned(), value.trim().to_owned()))
                }
                _ => Err(ConfigError::Invalid(format!(
                    "metadata entry `{entry}` must use the form key=value: set YC_METADATA or add metadata to yandex-machine.toml"
                ))),
            })
            .collect()
    }
}

/// Returns the trimmed value when it is not blank.
fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|candidate| !candidate.is_empty())
        .map(str::to_owned)
}

/// Splits a comma-separated setting, dropping blank entries.
fn split_list(value: Option<&str>) -> Vec<String> {
    value
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Indicates a configured value is out of range or malformed.
    #[error("invalid configuration value: {0}")]
    Invalid(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}

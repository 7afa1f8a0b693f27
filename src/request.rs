//! Mapping of a [`MachineConfig`] onto the provider creation request.
//!
//! [`build_create_request`] performs no I/O: placement must already be
//! resolved and the image id known.

use crate::machine::MachineConfig;
use crate::model::{
    AttachedDiskSpec, AttachedFilesystemSpec, CreateInstanceRequest, DiskSpec, FilesystemMode,
    IpVersion, NetworkInterfaceSpec, OneToOneNatSpec, PrimaryAddressSpec, ResourcesSpec,
    SchedulingPolicy,
};

/// Bytes per gigabyte as used by the compute API.
pub const BYTES_PER_GB: u64 = 1 << 30;

/// Converts whole gigabytes to bytes.
#[must_use]
pub fn gigabytes_to_bytes(gigabytes: u32) -> u64 {
    u64::from(gigabytes) * BYTES_PER_GB
}

/// Builds the creation request for `config` booting from `image_id`.
///
/// Placement identifiers are taken from `config` as-is; callers fill them in
/// beforehand. The metadata map is copied verbatim, so the caller merges the
/// boot metadata into `config.metadata` first. Malformed filesystem entries
/// are logged and no filesystem specs are attached.
#[must_use]
pub fn build_create_request(config: &MachineConfig, image_id: &str) -> CreateInstanceRequest {
    let network = &config.network;
    let one_to_one_nat_spec = network.nat.then(|| OneToOneNatSpec {
        address: network
            .static_address
            .as_deref()
            .map(str::trim)
            .filter(|address| !address.is_empty())
            .map(str::to_owned),
        ip_version: IpVersion::Ipv4,
    });

    CreateInstanceRequest {
        folder_id: config.placement.folder_id.clone().unwrap_or_default(),
        name: config.identity.name.clone(),
        labels: config.parsed_labels(),
        zone_id: config.placement.zone.clone(),
        platform_id: config.shape.platform_id.clone(),
        resources_spec: ResourcesSpec {
            memory: gigabytes_to_bytes(config.shape.memory_gb),
            cores: u64::from(config.shape.cores),
            core_fraction: u64::from(config.shape.core_fraction),
            gpus: u64::from(config.shape.gpus),
        },
        metadata: config.metadata.clone(),
        boot_disk_spec: AttachedDiskSpec {
            auto_delete: true,
            disk_spec: DiskSpec {
                type_id: config.boot_disk.disk_type.clone(),
                size: gigabytes_to_bytes(config.boot_disk.size_gb),
                image_id: image_id.to_owned(),
            },
        },
        filesystem_specs: filesystem_specs(config),
        network_interface_specs: vec![NetworkInterfaceSpec {
            subnet_id: config.placement.subnet_id.clone().unwrap_or_default(),
            primary_v4_address_spec: PrimaryAddressSpec {
                one_to_one_nat_spec,
            },
            security_group_ids: network.security_group_ids.clone(),
        }],
        scheduling_policy: SchedulingPolicy {
            preemptible: config.shape.preemptible,
        },
        service_account_id: config
            .service_account_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_owned),
    }
}

fn filesystem_specs(config: &MachineConfig) -> Vec<AttachedFilesystemSpec> {
    match config.parsed_filesystems() {
        Ok(mounts) => mounts
            .iter()
            .map(|mount| AttachedFilesystemSpec {
                mode: FilesystemMode::ReadWrite,
                device_name: mount.device_name().to_owned(),
                filesystem_id: mount.filesystem_id.clone(),
            })
            .collect(),
        Err(err) => {
            tracing::warn!(error = %err, "attaching no filesystems");
            Vec::new()
        }
    }
}

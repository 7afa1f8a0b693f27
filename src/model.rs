//! Provider-shaped request and response types for the Yandex Cloud API.
//!
//! Field names follow the JSON mapping of the provider's resource schema so
//! the structures serialise straight onto the wire. Only the fields the
//! driver reads or writes are modelled; unknown response fields are ignored.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request body for `POST /compute/v1/instances`.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInstanceRequest {
    /// Folder that will own the instance.
    pub folder_id: String,
    /// Instance name, unique within the folder.
    pub name: String,
    /// Resource labels.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Availability zone.
    pub zone_id: String,
    /// Hardware platform (for example `standard-v1`).
    pub platform_id: String,
    /// Compute resources.
    pub resources_spec: ResourcesSpec,
    /// Instance metadata, including `user-data` and `ssh-keys`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
    /// Boot disk specification.
    pub boot_disk_spec: AttachedDiskSpec,
    /// Attached filesystems.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filesystem_specs: Vec<AttachedFilesystemSpec>,
    /// Network interfaces; the driver always builds exactly one.
    pub network_interface_specs: Vec<NetworkInterfaceSpec>,
    /// Scheduling policy.
    pub scheduling_policy: SchedulingPolicy,
    /// Service account bound to the instance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_id: Option<String>,
}

/// Compute resources requested for an instance.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourcesSpec {
    /// Memory in bytes.
    pub memory: u64,
    /// Number of virtual cores.
    pub cores: u64,
    /// Guaranteed share of each core, in percent.
    pub core_fraction: u64,
    /// Number of GPUs.
    pub gpus: u64,
}

/// Boot disk attachment.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachedDiskSpec {
    /// Whether the disk is deleted together with the instance.
    pub auto_delete: bool,
    /// Specification of the disk to create.
    pub disk_spec: DiskSpec,
}

/// Disk created together with the instance.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiskSpec {
    /// Disk type (for example `network-hdd`).
    pub type_id: String,
    /// Disk size in bytes.
    pub size: u64,
    /// Source image identifier.
    pub image_id: String,
}

/// Filesystem attachment.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachedFilesystemSpec {
    /// Access mode.
    pub mode: FilesystemMode,
    /// Device name exposed to the guest.
    pub device_name: String,
    /// Identifier of the filesystem to attach.
    pub filesystem_id: String,
}

/// Access mode of an attached filesystem.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FilesystemMode {
    /// Read-only access.
    ReadOnly,
    /// Read-write access.
    ReadWrite,
}

/// Network interface to create with the instance.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInterfaceSpec {
    /// Subnet the interface is attached to.
    pub subnet_id: String,
    /// Primary IPv4 address settings.
    pub primary_v4_address_spec: PrimaryAddressSpec,
    /// Security groups applied to the interface.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub security_group_ids: Vec<String>,
}

/// Primary address settings of an interface.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrimaryAddressSpec {
    /// One-to-one NAT settings; absent when no external address is wanted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub one_to_one_nat_spec: Option<OneToOneNatSpec>,
}

/// One-to-one NAT request.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OneToOneNatSpec {
    /// Pinned external address; `None` requests a dynamic one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// IP version of the external address.
    pub ip_version: IpVersion,
}

/// IP protocol version.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum IpVersion {
    /// IPv4.
    #[serde(rename = "IPV4")]
    Ipv4,
    /// IPv6.
    #[serde(rename = "IPV6")]
    Ipv6,
}

/// Scheduling policy of an instance.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulingPolicy {
    /// Whether the instance may be stopped by the provider at any time.
    pub preemptible: bool,
}

/// Instance description returned by the compute API.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    /// Instance identifier.
    pub id: String,
    /// Owning folder.
    #[serde(default)]
    pub folder_id: String,
    /// Instance name.
    #[serde(default)]
    pub name: String,
    /// Availability zone.
    #[serde(default)]
    pub zone_id: String,
    /// Current status.
    #[serde(default)]
    pub status: InstanceStatus,
    /// Reported network interfaces.
    #[serde(default)]
    pub network_interfaces: Vec<NetworkInterface>,
}

/// Instance status as reported by the provider.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstanceStatus {
    /// Resources are being allocated.
    Provisioning,
    /// Instance is running.
    Running,
    /// Instance is stopping.
    Stopping,
    /// Instance is stopped.
    Stopped,
    /// Instance is starting.
    Starting,
    /// Instance is restarting.
    Restarting,
    /// Instance is being updated.
    Updating,
    /// Instance encountered a problem.
    Error,
    /// Instance crashed and will be restarted.
    Crashed,
    /// Instance is being deleted.
    Deleting,
    /// Status not reported or not recognised.
    #[default]
    #[serde(other)]
    StatusUnspecified,
}

/// Network interface attached to an instance.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInterface {
    /// Interface index.
    #[serde(default)]
    pub index: String,
    /// Subnet the interface is attached to.
    #[serde(default)]
    pub subnet_id: String,
    /// MAC address.
    #[serde(default)]
    pub mac_address: String,
    /// Primary IPv4 address.
    #[serde(default)]
    pub primary_v4_address: Option<PrimaryAddress>,
    /// Primary IPv6 address.
    #[serde(default)]
    pub primary_v6_address: Option<PrimaryAddress>,
}

/// Address assigned to an interface.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrimaryAddress {
    /// Internal address.
    #[serde(default)]
    pub address: String,
    /// One-to-one NAT mapping, when the address is exposed externally.
    #[serde(default)]
    pub one_to_one_nat: Option<OneToOneNat>,
}

/// One-to-one NAT mapping.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OneToOneNat {
    /// External address.
    pub address: String,
    /// IP version of the external address.
    #[serde(default)]
    pub ip_version: Option<IpVersion>,
}

/// Long-running operation handle.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    /// Operation identifier used for polling.
    pub id: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Whether the operation reached a terminal state.
    #[serde(default)]
    pub done: bool,
    /// Service-specific metadata, available while the operation runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    /// Failure status once done.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<OperationStatus>,
    /// Result payload once done.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
}

impl Operation {
    /// Returns the instance identifier carried in the operation metadata.
    #[must_use]
    pub fn instance_id(&self) -> Option<&str> {
        self.metadata
            .as_ref()
            .and_then(|metadata| metadata.get("instanceId"))
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
    }

    /// Decodes the response payload of a finished operation.
    ///
    /// Returns `None` when the operation carries no response.
    #[must_use]
    pub fn response_as<T: DeserializeOwned>(&self) -> Option<Result<T, serde_json::Error>> {
        self.response
            .as_ref()
            .map(|payload| serde_json::from_value(payload.clone()))
    }
}

/// Failure status of an operation or API call.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct OperationStatus {
    /// Provider status code.
    #[serde(default)]
    pub code: i32,
    /// Provider message.
    #[serde(default)]
    pub message: String,
}

/// Cloud visible to the caller.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Cloud {
    /// Cloud identifier.
    pub id: String,
    /// Cloud name.
    #[serde(default)]
    pub name: String,
}

/// Folder inside a cloud.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Folder {
    /// Folder identifier.
    pub id: String,
    /// Owning cloud.
    #[serde(default)]
    pub cloud_id: String,
    /// Folder name.
    #[serde(default)]
    pub name: String,
}

/// VPC subnet.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Subnet {
    /// Subnet identifier.
    pub id: String,
    /// Owning folder.
    #[serde(default)]
    pub folder_id: String,
    /// Subnet name.
    #[serde(default)]
    pub name: String,
    /// Zone the subnet lives in.
    #[serde(default)]
    pub zone_id: String,
}

/// Disk image.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    /// Image identifier.
    pub id: String,
    /// Owning folder.
    #[serde(default)]
    pub folder_id: String,
    /// Image family.
    #[serde(default)]
    pub family: String,
    /// Image name.
    #[serde(default)]
    pub name: String,
}

/// Power actions that map to `POST /instances/{id}:<action>`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum InstanceAction {
    /// Power on a stopped instance.
    Start,
    /// Power off a running instance.
    Stop,
    /// Reboot a running instance.
    Restart,
}

impl InstanceAction {
    /// Returns the verb used in the REST method suffix.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Restart => "restart",
        }
    }
}

impl fmt::Display for InstanceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//! Test support utilities shared across unit and integration tests.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::env;
use std::ffi::OsString;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use camino::Utf8PathBuf;
use serde_json::json;
use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};

use crate::backend::{BackendFuture, CloudApi};
use crate::credentials::DEFAULT_METADATA_TOKEN_URL;
use crate::machine::{
    AddressPolicy, ApiConfig, BootDisk, ComputeShape, ImageSource, MachineConfig,
    MachineIdentity, NetworkPolicy, Placement,
};
use crate::model::{
    Cloud, CreateInstanceRequest, Folder, Image, Instance, InstanceAction, InstanceStatus,
    NetworkInterface, OneToOneNat, Operation, OperationStatus, PrimaryAddress, Subnet,
};

/// Folder that scripted instances are created in by default.
pub const SCRIPTED_FOLDER_ID: &str = "b1g-folder";

/// Returns a valid configuration with the provider defaults and no
/// placement identifiers.
#[must_use]
pub fn sample_machine_config() -> MachineConfig {
    MachineConfig {
        identity: MachineIdentity {
            name: String::from("docker-host"),
            ssh_user: String::from("ubuntu"),
            ssh_port: 22,
            ssh_key_path: Utf8PathBuf::from("/home/ubuntu/.ssh/id_ed25519"),
        },
        placement: Placement {
            cloud_id: None,
            folder_id: None,
            zone: String::from("ru-central1-a"),
            subnet_id: None,
        },
        shape: ComputeShape {
            platform_id: String::from("standard-v1"),
            cores: 2,
            core_fraction: 100,
            memory_gb: 1,
            gpus: 0,
            preemptible: false,
        },
        boot_disk: BootDisk {
            disk_type: String::from("network-hdd"),
            size_gb: 20,
            image: ImageSource::Family {
                family: String::from("ubuntu-2004-lts"),
                folder_id: String::from("standard-images"),
            },
        },
        network: NetworkPolicy {
            nat: true,
            static_address: None,
            security_group_ids: Vec::new(),
            address_policy: AddressPolicy::External,
        },
        filesystems: Vec::new(),
        labels: Vec::new(),
        metadata: BTreeMap::new(),
        service_account_id: None,
        user_data_file: None,
        api: ApiConfig {
            endpoint: None,
            token: Some(String::from("t1.test.token")),
            service_account_key_file: None,
            metadata_token_url: DEFAULT_METADATA_TOKEN_URL.to_owned(),
        },
    }
}

/// Error returned by [`ScriptedCloud`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ScriptedCloudError {
    /// Simulated transient outage.
    #[error("service unavailable")]
    Unavailable,
    /// Requested resource does not exist.
    #[error("{0} not found")]
    NotFound(String),
}

#[derive(Debug)]
struct PendingOperation {
    remaining_polls: u32,
    outcome: Operation,
}

#[derive(Debug, Default)]
struct CloudState {
    clouds: Vec<Cloud>,
    folders: Vec<Folder>,
    subnets: Vec<Subnet>,
    images: Vec<Image>,
    instances: Vec<Instance>,
    operations: HashMap<String, PendingOperation>,
    failures: HashMap<String, VecDeque<ScriptedCloudError>>,
    operation_failures: HashMap<String, OperationStatus>,
    create_interfaces: Option<Vec<NetworkInterface>>,
    create_without_instance_id: bool,
    pending_polls: u32,
    calls: Vec<String>,
    create_requests: Vec<CreateInstanceRequest>,
    next_id: u32,
}

impl CloudState {
    fn record(&mut self, call: &str) -> Result<(), ScriptedCloudError> {
        self.calls.push(call.to_owned());
        match self
            .failures
            .get_mut(call)
            .and_then(VecDeque::pop_front)
        {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn allocate(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }

    fn begin(
        &mut self,
        call: &str,
        metadata: Option<serde_json::Value>,
        response: Option<serde_json::Value>,
    ) -> Operation {
        let id = self.allocate("op");
        let error = self.operation_failures.remove(call);
        let pending = Operation {
            id: id.clone(),
            description: call.to_owned(),
            done: false,
            metadata,
            error: None,
            response: None,
        };
        let outcome = Operation {
            done: true,
            response: if error.is_none() { response } else { None },
            error,
            ..pending.clone()
        };
        self.operations.insert(
            id,
            PendingOperation {
                remaining_polls: self.pending_polls,
                outcome,
            },
        );
        pending
    }

    fn set_status(
        &mut self,
        instance_id: &str,
        status: InstanceStatus,
    ) -> Result<(), ScriptedCloudError> {
        let instance = self
            .instances
            .iter_mut()
            .find(|instance| instance.id == instance_id)
            .ok_or_else(|| ScriptedCloudError::NotFound(format!("instance {instance_id}")))?;
        instance.status = status;
        Ok(())
    }
}

/// In-memory [`CloudApi`] double with scriptable inventory, failures and
/// operation outcomes.
///
/// Operations stay pending for a configurable number of polls. Instance state
/// changes take effect when the call is submitted.
#[derive(Clone, Debug, Default)]
pub struct ScriptedCloud {
    state: Arc<Mutex<CloudState>>,
}

impl ScriptedCloud {
    /// Creates an empty cloud.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, CloudState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds a cloud.
    pub fn add_cloud(&self, id: &str) {
        self.lock().clouds.push(Cloud {
            id: id.to_owned(),
            name: id.to_owned(),
        });
    }

    /// Adds a folder to `cloud_id`.
    pub fn add_folder(&self, id: &str, cloud_id: &str) {
        self.lock().folders.push(Folder {
            id: id.to_owned(),
            cloud_id: cloud_id.to_owned(),
            name: id.to_owned(),
        });
    }

    /// Adds a subnet in `zone`; subnets are listed in insertion order.
    pub fn add_subnet(&self, id: &str, zone: &str) {
        self.lock().subnets.push(Subnet {
            id: id.to_owned(),
            folder_id: SCRIPTED_FOLDER_ID.to_owned(),
            name: id.to_owned(),
            zone_id: zone.to_owned(),
        });
    }

    /// Publishes an image as the latest of `family`.
    pub fn add_image(&self, id: &str, family: &str) {
        self.lock().images.push(Image {
            id: id.to_owned(),
            folder_id: String::from("standard-images"),
            family: family.to_owned(),
            name: id.to_owned(),
        });
    }

    /// Adds a running instance with one interface and returns its id.
    pub fn add_instance(&self, name: &str, internal: &str, nat: Option<&str>) -> String {
        let mut state = self.lock();
        let id = state.allocate("fhm");
        state.instances.push(Instance {
            id: id.clone(),
            folder_id: SCRIPTED_FOLDER_ID.to_owned(),
            name: name.to_owned(),
            zone_id: String::from("ru-central1-a"),
            status: InstanceStatus::Running,
            network_interfaces: vec![interface(internal, nat)],
        });
        id
    }

    /// Fails the next call of `method` with `error`.
    pub fn fail_next(&self, method: &str, error: ScriptedCloudError) {
        self.lock()
            .failures
            .entry(method.to_owned())
            .or_default()
            .push_back(error);
    }

    /// Makes the next operation started by `method` finish with `status`.
    pub fn fail_operation(&self, method: &str, status: OperationStatus) {
        self.lock()
            .operation_failures
            .insert(method.to_owned(), status);
    }

    /// Sets how many polls each new operation answers as pending; the poll
    /// after those reports the final outcome.
    pub fn set_pending_polls(&self, polls: u32) {
        self.lock().pending_polls = polls;
    }

    /// Overrides the interfaces reported for created instances.
    pub fn set_create_interfaces(&self, interfaces: Vec<NetworkInterface>) {
        self.lock().create_interfaces = Some(interfaces);
    }

    /// Makes create operations omit the instance id from their metadata.
    pub fn omit_instance_id(&self) {
        self.lock().create_without_instance_id = true;
    }

    /// Starts a standalone operation, optionally finishing with `error`.
    pub fn begin_operation(&self, error: Option<OperationStatus>) -> Operation {
        let mut state = self.lock();
        if let Some(status) = error {
            state
                .operation_failures
                .insert(String::from("standalone"), status);
        }
        state.begin("standalone", None, None)
    }

    /// Returns the names of the calls made so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// Returns the creation requests submitted so far.
    #[must_use]
    pub fn create_requests(&self) -> Vec<CreateInstanceRequest> {
        self.lock().create_requests.clone()
    }

    /// Returns the instance with `id` if it still exists.
    #[must_use]
    pub fn instance(&self, id: &str) -> Option<Instance> {
        self.lock()
            .instances
            .iter()
            .find(|instance| instance.id == id)
            .cloned()
    }

    /// Returns the number of instances that still exist.
    #[must_use]
    pub fn instance_count(&self) -> usize {
        self.lock().instances.len()
    }
}

/// Builds an interface with an internal address and an optional NAT address.
#[must_use]
pub fn interface(internal: &str, nat: Option<&str>) -> NetworkInterface {
    NetworkInterface {
        index: String::from("0"),
        subnet_id: String::from("e9b-subnet"),
        mac_address: String::from("d0:0d:00:00:00:01"),
        primary_v4_address: Some(PrimaryAddress {
            address: internal.to_owned(),
            one_to_one_nat: nat.map(|address| OneToOneNat {
                address: address.to_owned(),
                ip_version: None,
            }),
        }),
        primary_v6_address: None,
    }
}

fn default_interfaces(request: &CreateInstanceRequest) -> Vec<NetworkInterface> {
    request
        .network_interface_specs
        .iter()
        .map(|spec| {
            let nat = spec
                .primary_v4_address_spec
                .one_to_one_nat_spec
                .as_ref()
                .map(|nat| nat.address.clone().unwrap_or_else(|| String::from("84.201.0.10")));
            let mut created = interface("10.128.0.10", nat.as_deref());
            created.subnet_id.clone_from(&spec.subnet_id);
            created
        })
        .collect()
}

impl CloudApi for ScriptedCloud {
    type Error = ScriptedCloudError;

    fn list_clouds(&self) -> BackendFuture<'_, Vec<Cloud>, Self::Error> {
        Box::pin(async move {
            let mut state = self.lock();
            state.record("list_clouds")?;
            Ok(state.clouds.clone())
        })
    }

    fn list_folders<'a>(
        &'a self,
        cloud_id: &'a str,
    ) -> BackendFuture<'a, Vec<Folder>, Self::Error> {
        Box::pin(async move {
            let mut state = self.lock();
            state.record("list_folders")?;
            Ok(state
                .folders
                .iter()
                .filter(|folder| folder.cloud_id == cloud_id)
                .cloned()
                .collect())
        })
    }

    fn get_folder<'a>(&'a self, folder_id: &'a str) -> BackendFuture<'a, Folder, Self::Error> {
        Box::pin(async move {
            let mut state = self.lock();
            state.record("get_folder")?;
            state
                .folders
                .iter()
                .find(|folder| folder.id == folder_id)
                .cloned()
                .ok_or_else(|| ScriptedCloudError::NotFound(format!("folder {folder_id}")))
        })
    }

    fn list_subnets<'a>(
        &'a self,
        folder_id: &'a str,
    ) -> BackendFuture<'a, Vec<Subnet>, Self::Error> {
        Box::pin(async move {
            let mut state = self.lock();
            state.record("list_subnets")?;
            Ok(state
                .subnets
                .iter()
                .filter(|subnet| subnet.folder_id == folder_id)
                .cloned()
                .collect())
        })
    }

    fn find_instances_by_name<'a>(
        &'a self,
        folder_id: &'a str,
        name: &'a str,
    ) -> BackendFuture<'a, Vec<Instance>, Self::Error> {
        Box::pin(async move {
            let mut state = self.lock();
            state.record("find_instances_by_name")?;
            Ok(state
                .instances
                .iter()
                .filter(|instance| instance.folder_id == folder_id && instance.name == name)
                .cloned()
                .collect())
        })
    }

    fn latest_image_by_family<'a>(
        &'a self,
        folder_id: &'a str,
        family: &'a str,
    ) -> BackendFuture<'a, Image, Self::Error> {
        Box::pin(async move {
            let mut state = self.lock();
            state.record("latest_image_by_family")?;
            state
                .images
                .iter()
                .rev()
                .find(|image| image.family == family)
                .cloned()
                .ok_or_else(|| {
                    ScriptedCloudError::NotFound(format!("image family {family} in {folder_id}"))
                })
        })
    }

    fn create_instance<'a>(
        &'a self,
        request: &'a CreateInstanceRequest,
    ) -> BackendFuture<'a, Operation, Self::Error> {
        Box::pin(async move {
            let mut state = self.lock();
            state.record("create_instance")?;
            state.create_requests.push(request.clone());

            let id = state.allocate("fhm");
            let interfaces = state
                .create_interfaces
                .clone()
                .unwrap_or_else(|| default_interfaces(request));
            let instance = Instance {
                id: id.clone(),
                folder_id: request.folder_id.clone(),
                name: request.name.clone(),
                zone_id: request.zone_id.clone(),
                status: InstanceStatus::Running,
                network_interfaces: interfaces,
            };
            let response = serde_json::to_value(&instance).ok();
            state.instances.push(instance);

            let metadata = if state.create_without_instance_id {
                json!({})
            } else {
                json!({ "instanceId": id })
            };
            Ok(state.begin("create_instance", Some(metadata), response))
        })
    }

    fn get_instance<'a>(
        &'a self,
        instance_id: &'a str,
    ) -> BackendFuture<'a, Instance, Self::Error> {
        Box::pin(async move {
            let mut state = self.lock();
            state.record("get_instance")?;
            state
                .instances
                .iter()
                .find(|instance| instance.id == instance_id)
                .cloned()
                .ok_or_else(|| ScriptedCloudError::NotFound(format!("instance {instance_id}")))
        })
    }

    fn instance_action<'a>(
        &'a self,
        instance_id: &'a str,
        action: InstanceAction,
    ) -> BackendFuture<'a, Operation, Self::Error> {
        Box::pin(async move {
            let mut state = self.lock();
            let call = format!("{action}_instance");
            state.record(&call)?;
            let status = match action {
                InstanceAction::Start | InstanceAction::Restart => InstanceStatus::Running,
                InstanceAction::Stop => InstanceStatus::Stopped,
            };
            state.set_status(instance_id, status)?;
            let metadata = json!({ "instanceId": instance_id });
            Ok(state.begin(&call, Some(metadata), None))
        })
    }

    fn delete_instance<'a>(
        &'a self,
        instance_id: &'a str,
    ) -> BackendFuture<'a, Operation, Self::Error> {
        Box::pin(async move {
            let mut state = self.lock();
            state.record("delete_instance")?;
            let before = state.instances.len();
            state.instances.retain(|instance| instance.id != instance_id);
            if state.instances.len() == before {
                return Err(ScriptedCloudError::NotFound(format!(
                    "instance {instance_id}"
                )));
            }
            let metadata = json!({ "instanceId": instance_id });
            Ok(state.begin("delete_instance", Some(metadata), None))
        })
    }

    fn get_operation<'a>(
        &'a self,
        operation_id: &'a str,
    ) -> BackendFuture<'a, Operation, Self::Error> {
        Box::pin(async move {
            let mut state = self.lock();
            state.record("get_operation")?;
            let pending = state
                .operations
                .get_mut(operation_id)
                .ok_or_else(|| ScriptedCloudError::NotFound(format!("operation {operation_id}")))?;
            if pending.remaining_polls > 0 {
                pending.remaining_polls -= 1;
                return Ok(Operation {
                    done: false,
                    error: None,
                    response: None,
                    ..pending.outcome.clone()
                });
            }
            Ok(pending.outcome.clone())
        })
    }
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: AsyncMutex<()> = AsyncMutex::const_new(());

/// Guard that holds the env mutex and restores variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: AsyncMutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets multiple environment variables while holding a global mutex.
    pub async fn set_vars(pairs: &[(&str, &str)]) -> Self {
        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            let old = env::var_os(key);
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe { env::set_var(key, value) };
            previous.push(((*key).to_owned(), old));
        }

        Self {
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in &self.previous {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }
    }
}

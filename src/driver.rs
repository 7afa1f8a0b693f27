//! Lifecycle verbs for a single machine.
//!
//! [`LifecycleDriver`] is the entry point for create, start, stop, restart,
//! remove and the read-only queries. Every mutating verb yields a provider
//! operation that is polled until it reaches a terminal state. A failed
//! create removes the half-built instance before the error is returned.

use std::fmt;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::time::sleep;

use crate::address::{AddressError, resolve_address};
use crate::backend::CloudApi;
use crate::cloud_init::{CloudInitError, load_user_data_file, prepare_metadata};
use crate::machine::{AddressPolicy, ImageSource, MachineConfig, MachineConfigError};
use crate::model::{Instance, InstanceAction, InstanceStatus, Operation};
use crate::placement::{PlacementError, ResourceLocator};
use crate::request::build_create_request;

const OPERATION_POLL_INTERVAL: Duration = Duration::from_secs(1);
const OPERATION_WAIT_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Port the Docker daemon listens on inside the machine.
pub const DOCKER_PORT: u16 = 2376;

/// Lifecycle verb an operation belongs to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LifecycleAction {
    /// Instance creation.
    Create,
    /// Power on.
    Start,
    /// Power off.
    Stop,
    /// Reboot.
    Restart,
    /// Deletion.
    Remove,
}

impl LifecycleAction {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Restart => "restart",
            Self::Remove => "remove",
        }
    }
}

impl fmt::Display for LifecycleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<InstanceAction> for LifecycleAction {
    fn from(value: InstanceAction) -> Self {
        match value {
            InstanceAction::Start => Self::Start,
            InstanceAction::Stop => Self::Stop,
            InstanceAction::Restart => Self::Restart,
        }
    }
}

/// Coarse machine state reported to the host tooling.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MachineState {
    /// State cannot be mapped.
    None,
    /// Machine is being provisioned or started.
    Starting,
    /// Machine is running.
    Running,
    /// Machine is stopping, stopped or being deleted.
    Stopped,
}

impl MachineState {
    /// Maps a provider status onto a machine state.
    #[must_use]
    pub const fn from_status(status: InstanceStatus) -> Self {
        match status {
            InstanceStatus::Provisioning | InstanceStatus::Starting => Self::Starting,
            InstanceStatus::Running => Self::Running,
            InstanceStatus::Stopping | InstanceStatus::Stopped | InstanceStatus::Deleting => {
                Self::Stopped
            }
            InstanceStatus::StatusUnspecified
            | InstanceStatus::Restarting
            | InstanceStatus::Updating
            | InstanceStatus::Error
            | InstanceStatus::Crashed => Self::None,
        }
    }
}

impl fmt::Display for MachineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::None => "None",
            Self::Starting => "Starting",
            Self::Running => "Running",
            Self::Stopped => "Stopped",
        })
    }
}

/// Machine created by [`LifecycleDriver::create`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Machine {
    /// Provider instance identifier.
    pub instance_id: String,
    /// Address selected for SSH connectivity.
    pub address: String,
}

/// Placement identifiers after derivation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResolvedPlacement {
    /// Folder the machine is created in.
    pub folder_id: String,
    /// Subnet the machine's interface is attached to.
    pub subnet_id: String,
}

/// Errors raised by lifecycle verbs.
#[derive(Debug, Error)]
pub enum DriverError<E>
where
    E: std::error::Error + 'static,
{
    /// Raised when the machine configuration is invalid.
    #[error("invalid machine configuration: {0}")]
    InvalidConfig(#[source] MachineConfigError),
    /// Raised when boot metadata cannot be prepared.
    #[error("failed to prepare user-data: {0}")]
    UserData(#[source] CloudInitError),
    /// Raised when the cloud, folder or subnet cannot be determined.
    #[error("failed to resolve placement: {0}")]
    Placement(#[source] PlacementError<E>),
    /// Raised when the configured folder cannot be fetched.
    #[error("folder {folder_id} is not accessible: {source}")]
    FolderNotFound {
        /// Folder identifier.
        folder_id: String,
        /// Provider error.
        #[source]
        source: E,
    },
    /// Raised when the name is already taken in the folder.
    #[error("instance `{name}` already exists in folder {folder_id}")]
    MachineExists {
        /// Requested instance name.
        name: String,
        /// Folder that was searched.
        folder_id: String,
    },
    /// Raised when the boot image cannot be resolved.
    #[error("image family `{family}` not found in folder {folder_id}: {source}")]
    ImageLookup {
        /// Requested image family.
        family: String,
        /// Folder that was searched.
        folder_id: String,
        /// Provider error.
        #[source]
        source: E,
    },
    /// Raised when the provider rejects the request.
    #[error("failed to submit {action} request: {source}")]
    Submit {
        /// Verb being submitted.
        action: LifecycleAction,
        /// Provider error.
        #[source]
        source: E,
    },
    /// Raised when a create operation does not name the new instance.
    #[error("create operation {operation_id} did not report an instance id")]
    MissingInstanceId {
        /// Operation identifier.
        operation_id: String,
    },
    /// Raised when polling an operation fails.
    #[error("failed while waiting for {action} operation {operation_id}: {source}")]
    Wait {
        /// Verb being waited on.
        action: LifecycleAction,
        /// Operation identifier.
        operation_id: String,
        /// Provider error.
        #[source]
        source: E,
    },
    /// Raised when an operation does not finish in time.
    #[error("timed out waiting for {action} operation {operation_id}")]
    WaitTimeout {
        /// Verb being waited on.
        action: LifecycleAction,
        /// Operation identifier.
        operation_id: String,
    },
    /// Raised when an operation finishes with an error status.
    #[error("{action} operation {operation_id} failed with code {code}: {message}")]
    OperationFailed {
        /// Verb that failed.
        action: LifecycleAction,
        /// Operation identifier.
        operation_id: String,
        /// Provider status code.
        code: i32,
        /// Provider status message.
        message: String,
    },
    /// Raised when a finished operation carries an undecodable response.
    #[error("operation {operation_id} returned an invalid response: {message}")]
    InvalidResponse {
        /// Operation identifier.
        operation_id: String,
        /// Decoder message.
        message: String,
    },
    /// Raised when an instance cannot be fetched.
    #[error("failed to query instance {instance_id}: {source}")]
    Query {
        /// Instance identifier.
        instance_id: String,
        /// Provider error.
        #[source]
        source: E,
    },
    /// Raised when no usable address is reported.
    #[error("instance {instance_id} has no usable address: {source}")]
    Address {
        /// Instance identifier.
        instance_id: String,
        /// Address selection error.
        #[source]
        source: AddressError,
    },
}

/// Checks the preconditions that need no remote call: configuration
/// invariants and the user-data file.
///
/// # Errors
///
/// Returns [`DriverError::InvalidConfig`] or [`DriverError::UserData`].
pub fn check_local_preconditions<E>(config: &MachineConfig) -> Result<(), DriverError<E>>
where
    E: std::error::Error + 'static,
{
    config.validate().map_err(DriverError::InvalidConfig)?;
    load_user_data_file(config.user_data_file.as_deref()).map_err(DriverError::UserData)?;
    Ok(())
}

/// Drives lifecycle verbs against a [`CloudApi`].
#[derive(Debug)]
pub struct LifecycleDriver<A> {
    api: A,
    poll_interval: Duration,
    wait_timeout: Duration,
}

impl<A> LifecycleDriver<A>
where
    A: CloudApi,
{
    /// Creates a driver over `api`.
    #[must_use]
    pub const fn new(api: A) -> Self {
        Self {
            api,
            poll_interval: OPERATION_POLL_INTERVAL,
            wait_timeout: OPERATION_WAIT_TIMEOUT,
        }
    }

    /// Overrides the operation polling interval.
    ///
    /// This is primarily used by tests to keep polling scenarios fast.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Overrides the maximum time spent waiting for one operation.
    #[must_use]
    pub const fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = timeout;
        self
    }

    /// Returns the underlying API.
    #[must_use]
    pub const fn api(&self) -> &A {
        &self.api
    }

    /// Runs the checks that must pass before a machine is created and
    /// returns the derived placement.
    ///
    /// Local preconditions (configuration invariants, user-data file) are
    /// checked before any remote call.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError`] when the configuration is invalid, the
    /// user-data file is missing, placement cannot be resolved, the folder is
    /// inaccessible, or the name is taken.
    pub async fn pre_create_check(
        &self,
        config: &MachineConfig,
    ) -> Result<ResolvedPlacement, DriverError<A::Error>> {
        check_local_preconditions(config)?;
        self.resolve_placement(config).await
    }

    async fn resolve_placement(
        &self,
        config: &MachineConfig,
    ) -> Result<ResolvedPlacement, DriverError<A::Error>> {
        let locator = ResourceLocator::new(&self.api);
        let folder_id = locator
            .resolve_folder_id(&config.placement)
            .await
            .map_err(DriverError::Placement)?;

        self.api
            .get_folder(&folder_id)
            .await
            .map_err(|source| DriverError::FolderNotFound {
                folder_id: folder_id.clone(),
                source,
            })?;

        let name = config.identity.name.as_str();
        let existing = self
            .api
            .find_instances_by_name(&folder_id, name)
            .await
            .map_err(|source| DriverError::Placement(PlacementError::Api(source)))?;
        if existing.iter().any(|instance| instance.name == name) {
            return Err(DriverError::MachineExists {
                name: name.to_owned(),
                folder_id,
            });
        }

        let subnet_id = locator
            .resolve_subnet_id(&config.placement, &folder_id)
            .await
            .map_err(DriverError::Placement)?;
        Ok(ResolvedPlacement {
            folder_id,
            subnet_id,
        })
    }

    async fn resolve_image(&self, source: &ImageSource) -> Result<String, DriverError<A::Error>> {
        match source {
            ImageSource::Id(id) => Ok(id.clone()),
            ImageSource::Family { family, folder_id } => {
                let image = self
                    .api
                    .latest_image_by_family(folder_id, family)
                    .await
                    .map_err(|err| DriverError::ImageLookup {
                        family: family.clone(),
                        folder_id: folder_id.clone(),
                        source: err,
                    })?;
                tracing::info!(image_id = %image.id, %family, "resolved image family");
                Ok(image.id)
            }
        }
    }

    /// Creates the machine described by `config` and returns its id and the
    /// address selected by the configured policy.
    ///
    /// Runs [`Self::pre_create_check`] first; use [`Self::create_placed`]
    /// when the checks already ran.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError`] when a precondition fails, the request is
    /// rejected, the operation fails, or no usable address is reported. Once
    /// the instance id is known any failure triggers a best-effort delete.
    pub async fn create(
        &self,
        config: &MachineConfig,
        public_key: &str,
    ) -> Result<Machine, DriverError<A::Error>> {
        let placement = self.pre_create_check(config).await?;
        self.create_placed(config, &placement, public_key).await
    }

    /// Creates the machine in a placement returned by
    /// [`Self::pre_create_check`].
    ///
    /// # Errors
    ///
    /// As for [`Self::create`], minus the placement checks.
    pub async fn create_placed(
        &self,
        config: &MachineConfig,
        placement: &ResolvedPlacement,
        public_key: &str,
    ) -> Result<Machine, DriverError<A::Error>> {
        config.validate().map_err(DriverError::InvalidConfig)?;
        let metadata = prepare_metadata(config, public_key).map_err(DriverError::UserData)?;
        let image_id = self.resolve_image(&config.boot_disk.image).await?;

        let mut resolved = config.clone();
        resolved.placement.folder_id = Some(placement.folder_id.clone());
        resolved.placement.subnet_id = Some(placement.subnet_id.clone());
        resolved.metadata = metadata;
        let request = build_create_request(&resolved, &image_id);

        tracing::info!(name = %request.name, folder_id = %request.folder_id, "creating instance");
        let operation = self
            .api
            .create_instance(&request)
            .await
            .map_err(|source| DriverError::Submit {
                action: LifecycleAction::Create,
                source,
            })?;
        let Some(instance_id) = operation.instance_id().map(str::to_owned) else {
            return Err(DriverError::MissingInstanceId {
                operation_id: operation.id,
            });
        };

        match self
            .finish_create(&instance_id, operation, config.network.address_policy)
            .await
        {
            Ok(address) => {
                tracing::info!(%instance_id, %address, "instance created");
                Ok(Machine {
                    instance_id,
                    address,
                })
            }
            Err(err) => {
                self.cleanup(&instance_id).await;
                Err(err)
            }
        }
    }

    async fn finish_create(
        &self,
        instance_id: &str,
        operation: Operation,
        policy: AddressPolicy,
    ) -> Result<String, DriverError<A::Error>> {
        let done = self.wait(LifecycleAction::Create, operation).await?;
        let instance = match done.response_as::<Instance>() {
            Some(Ok(instance)) => instance,
            Some(Err(err)) => {
                return Err(DriverError::InvalidResponse {
                    operation_id: done.id,
                    message: err.to_string(),
                });
            }
            None => self.fetch_instance(instance_id).await?,
        };
        resolve_address(policy, &instance.network_interfaces).map_err(|source| {
            DriverError::Address {
                instance_id: instance_id.to_owned(),
                source,
            }
        })
    }

    async fn cleanup(&self, instance_id: &str) {
        tracing::warn!(%instance_id, "removing partially created instance");
        if let Err(err) = self.remove(instance_id).await {
            tracing::warn!(%instance_id, error = %err, "cleanup of failed instance did not succeed");
        }
    }

    /// Polls `operation` until it is done.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Wait`] when polling fails,
    /// [`DriverError::WaitTimeout`] when the operation does not finish in
    /// time, and [`DriverError::OperationFailed`] when it finishes with an
    /// error status.
    pub async fn wait(
        &self,
        action: LifecycleAction,
        operation: Operation,
    ) -> Result<Operation, DriverError<A::Error>> {
        // A timeout too large to represent waits without a deadline.
        let deadline = Instant::now().checked_add(self.wait_timeout);
        let mut current = operation;

        while !current.done {
            if deadline.is_some_and(|limit| Instant::now() > limit) {
                return Err(DriverError::WaitTimeout {
                    action,
                    operation_id: current.id,
                });
            }
            sleep(self.poll_interval).await;
            current = self
                .api
                .get_operation(&current.id)
                .await
                .map_err(|source| DriverError::Wait {
                    action,
                    operation_id: current.id.clone(),
                    source,
                })?;
        }

        if let Some(status) = current.error {
            return Err(DriverError::OperationFailed {
                action,
                operation_id: current.id,
                code: status.code,
                message: status.message,
            });
        }
        Ok(current)
    }

    async fn power(
        &self,
        instance_id: &str,
        action: InstanceAction,
    ) -> Result<(), DriverError<A::Error>> {
        let verb = LifecycleAction::from(action);
        tracing::info!(%instance_id, action = %verb, "submitting instance action");
        let operation = self
            .api
            .instance_action(instance_id, action)
            .await
            .map_err(|source| DriverError::Submit {
                action: verb,
                source,
            })?;
        self.wait(verb, operation).await.map(|_| ())
    }

    /// Powers the instance on.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError`] when the request or its operation fails.
    pub async fn start(&self, instance_id: &str) -> Result<(), DriverError<A::Error>> {
        self.power(instance_id, InstanceAction::Start).await
    }

    /// Powers the instance off.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError`] when the request or its operation fails.
    pub async fn stop(&self, instance_id: &str) -> Result<(), DriverError<A::Error>> {
        self.power(instance_id, InstanceAction::Stop).await
    }

    /// Forcibly powers the instance off; identical to [`Self::stop`].
    ///
    /// # Errors
    ///
    /// Returns [`DriverError`] when the request or its operation fails.
    pub async fn kill(&self, instance_id: &str) -> Result<(), DriverError<A::Error>> {
        self.stop(instance_id).await
    }

    /// Reboots the instance.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError`] when the request or its operation fails.
    pub async fn restart(&self, instance_id: &str) -> Result<(), DriverError<A::Error>> {
        self.power(instance_id, InstanceAction::Restart).await
    }

    /// Deletes the instance together with its boot disk.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError`] when the request or its operation fails.
    pub async fn remove(&self, instance_id: &str) -> Result<(), DriverError<A::Error>> {
        tracing::info!(%instance_id, "removing instance");
        let operation = self
            .api
            .delete_instance(instance_id)
            .await
            .map_err(|source| DriverError::Submit {
                action: LifecycleAction::Remove,
                source,
            })?;
        self.wait(LifecycleAction::Remove, operation)
            .await
            .map(|_| ())
    }

    async fn fetch_instance(&self, instance_id: &str) -> Result<Instance, DriverError<A::Error>> {
        self.api
            .get_instance(instance_id)
            .await
            .map_err(|source| DriverError::Query {
                instance_id: instance_id.to_owned(),
                source,
            })
    }

    /// Reports the coarse state of the instance.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Query`] when the instance cannot be fetched.
    pub async fn state(&self, instance_id: &str) -> Result<MachineState, DriverError<A::Error>> {
        let instance = self.fetch_instance(instance_id).await?;
        Ok(MachineState::from_status(instance.status))
    }

    /// Returns the address selected by `policy` from a fresh instance
    /// description.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError`] when the instance cannot be fetched or has no
    /// matching address.
    pub async fn ip(
        &self,
        instance_id: &str,
        policy: AddressPolicy,
    ) -> Result<String, DriverError<A::Error>> {
        let instance = self.fetch_instance(instance_id).await?;
        resolve_address(policy, &instance.network_interfaces).map_err(|source| {
            DriverError::Address {
                instance_id: instance_id.to_owned(),
                source,
            }
        })
    }

    /// Returns the Docker endpoint URL of the instance.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError`] when [`Self::ip`] fails.
    pub async fn url(
        &self,
        instance_id: &str,
        policy: AddressPolicy,
    ) -> Result<String, DriverError<A::Error>> {
        let host = self.ip(instance_id, policy).await?;
        Ok(format!("tcp://{host}:{DOCKER_PORT}"))
    }
}

//! Provider capability seam used by the lifecycle driver.
//!
//! [`CloudApi`] lists exactly the remote calls the provisioning flow needs.
//! The REST implementation lives in [`crate::yandex`]; tests substitute a
//! scripted double.

use std::future::Future;
use std::pin::Pin;

use crate::model::{
    Cloud, CreateInstanceRequest, Folder, Image, Instance, InstanceAction, Operation, Subnet,
};

/// Future returned by backend operations.
pub type BackendFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// Remote inventory and compute calls required to manage one machine.
///
/// Implementations are expected to retry transient failures internally; the
/// driver treats every error as final for the call that produced it.
pub trait CloudApi {
    /// Provider specific error type returned by the backend.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Lists every cloud visible to the credential.
    fn list_clouds(&self) -> BackendFuture<'_, Vec<Cloud>, Self::Error>;

    /// Lists the folders of a cloud.
    fn list_folders<'a>(&'a self, cloud_id: &'a str)
    -> BackendFuture<'a, Vec<Folder>, Self::Error>;

    /// Fetches a folder by identifier.
    fn get_folder<'a>(&'a self, folder_id: &'a str) -> BackendFuture<'a, Folder, Self::Error>;

    /// Lists the subnets of a folder.
    fn list_subnets<'a>(&'a self, folder_id: &'a str)
    -> BackendFuture<'a, Vec<Subnet>, Self::Error>;

    /// Lists the instances in a folder whose name equals `name`.
    fn find_instances_by_name<'a>(
        &'a self,
        folder_id: &'a str,
        name: &'a str,
    ) -> BackendFuture<'a, Vec<Instance>, Self::Error>;

    /// Returns the latest image of a family published in a folder.
    fn latest_image_by_family<'a>(
        &'a self,
        folder_id: &'a str,
        family: &'a str,
    ) -> BackendFuture<'a, Image, Self::Error>;

    /// Submits an instance creation request.
    fn create_instance<'a>(
        &'a self,
        request: &'a CreateInstanceRequest,
    ) -> BackendFuture<'a, Operation, Self::Error>;

    /// Fetches the current description of an instance.
    fn get_instance<'a>(&'a self, instance_id: &'a str)
    -> BackendFuture<'a, Instance, Self::Error>;

    /// Submits a start, stop or restart request.
    fn instance_action<'a>(
        &'a self,
        instance_id: &'a str,
        action: InstanceAction,
    ) -> BackendFuture<'a, Operation, Self::Error>;

    /// Submits a delete request.
    fn delete_instance<'a>(
        &'a self,
        instance_id: &'a str,
    ) -> BackendFuture<'a, Operation, Self::Error>;

    /// Polls a long-running operation.
    fn get_operation<'a>(
        &'a self,
        operation_id: &'a str,
    ) -> BackendFuture<'a, Operation, Self::Error>;
}

//! Core library for the `yandex-machine` provisioning driver.
//!
//! The crate provisions a single Docker host on Yandex Cloud and manages its
//! lifecycle. It exposes a provider capability seam ([`CloudApi`]) with a REST
//! implementation ([`YandexBackend`]), and the orchestration built on top of
//! it: placement derivation, boot metadata composition, request building,
//! operation waiting, and address resolution ([`LifecycleDriver`]).

pub mod address;
pub mod backend;
pub mod cloud_init;
pub mod config;
pub mod credentials;
pub mod driver;
pub mod files;
pub mod machine;
pub mod model;
pub mod placement;
pub mod request;
#[cfg(test)]
pub mod test_helpers;
pub mod test_support;
pub mod yandex;

pub use address::{AddressError, InstanceAddresses, resolve_address};
pub use backend::{BackendFuture, CloudApi};
pub use cloud_init::{CloudInitError, prepare_metadata, read_public_key};
pub use config::{ConfigError, YandexConfig};
pub use credentials::{CredentialError, CredentialResolver, Credentials};
pub use driver::{DriverError, LifecycleAction, LifecycleDriver, Machine, MachineState};
pub use machine::{AddressPolicy, MachineConfig, MachineIdentity, SshHost};
pub use placement::{PlacementError, ResourceLocator};
pub use request::build_create_request;
pub use yandex::{Endpoints, RetryPolicy, YandexApiError, YandexBackend};

//! Shared fixtures for in-crate unit tests.

use crate::machine::MachineConfig;

pub use crate::test_support::EnvGuard;

/// Returns a valid configuration without placement identifiers.
pub fn machine_config() -> MachineConfig {
    crate::test_support::sample_machine_config()
}

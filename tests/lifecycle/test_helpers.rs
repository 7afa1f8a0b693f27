//! Shared fixtures for lifecycle BDD scenarios.

use std::time::Duration;

use rstest::fixture;
use thiserror::Error;
use tokio::runtime::Runtime;
use yandex_machine::driver::ResolvedPlacement;
use yandex_machine::test_support::{ScriptedCloud, sample_machine_config};
use yandex_machine::{LifecycleDriver, Machine, MachineConfig, MachineState};

/// Public key installed on scenario machines.
pub const PUBLIC_KEY: &str = "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIFake docker@host";

#[derive(Clone, Debug)]
pub struct LifecycleContext {
    pub cloud: ScriptedCloud,
    pub config: MachineConfig,
    pub instance_id: Option<String>,
    pub outcome: Option<LifecycleResult>,
}

#[derive(Clone, Debug)]
pub enum LifecycleResult {
    Created(Machine),
    Checked(ResolvedPlacement),
    State(MachineState),
    Url(String),
    Done,
    Failed(String),
}

#[derive(Debug, Error)]
pub enum LifecycleTestError {
    #[error("failed to start the async runtime: {0}")]
    Runtime(#[from] std::io::Error),
    #[error("scenario has no instance to act on")]
    NoInstance,
}

impl LifecycleContext {
    pub fn driver(&self) -> LifecycleDriver<ScriptedCloud> {
        LifecycleDriver::new(self.cloud.clone()).with_poll_interval(Duration::from_millis(1))
    }

    pub fn instance_id(&self) -> Result<String, LifecycleTestError> {
        self.instance_id.clone().ok_or(LifecycleTestError::NoInstance)
    }

    /// Runs `future` to completion and records its outcome.
    pub fn record<F, T, E>(
        mut self,
        future: F,
        into_result: fn(T) -> LifecycleResult,
    ) -> Result<Self, LifecycleTestError>
    where
        F: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let runtime = Runtime::new()?;
        let outcome = match runtime.block_on(future) {
            Ok(value) => into_result(value),
            Err(err) => LifecycleResult::Failed(err.to_string()),
        };
        self.outcome = Some(outcome);
        Ok(self)
    }
}

#[fixture]
pub fn lifecycle_context() -> LifecycleContext {
    LifecycleContext {
        cloud: ScriptedCloud::new(),
        config: sample_machine_config(),
        instance_id: None,
        outcome: None,
    }
}

//! BDD step definitions for the lifecycle driver.

use std::fmt;

use rstest_bdd_macros::{given, then, when};
use yandex_machine::model::OperationStatus;
use yandex_machine::test_support::{SCRIPTED_FOLDER_ID, ScriptedCloudError, interface};

use super::test_helpers::{LifecycleContext, LifecycleResult, LifecycleTestError, PUBLIC_KEY};

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error(transparent)]
    Setup(#[from] LifecycleTestError),
    #[error("assertion failed: {0}")]
    Assertion(String),
}

macro_rules! string_newtype {
    ($name:ident) => {
        #[derive(Clone, Debug, Eq, PartialEq)]
        struct $name(String);

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                self.0.as_str()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_ref())
            }
        }

        impl std::str::FromStr for $name {
            type Err = std::convert::Infallible;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                Ok(Self(value.to_owned()))
            }
        }
    };
}

string_newtype!(ResourceId);
string_newtype!(Zone);
string_newtype!(InstanceName);
string_newtype!(ErrorSnippet);
string_newtype!(Expected);

#[given("a single cloud with a single folder")]
fn single_cloud_and_folder(lifecycle_context: LifecycleContext) -> LifecycleContext {
    lifecycle_context.cloud.add_cloud("b1g-cloud");
    lifecycle_context
        .cloud
        .add_folder(SCRIPTED_FOLDER_ID, "b1g-cloud");
    lifecycle_context
}

#[given("two clouds are visible")]
fn two_clouds(lifecycle_context: LifecycleContext) -> LifecycleContext {
    lifecycle_context.cloud.add_cloud("b1g-cloud-1");
    lifecycle_context.cloud.add_cloud("b1g-cloud-2");
    lifecycle_context
}

#[given("a subnet \"{subnet_id}\" in zone \"{zone}\"")]
fn subnet_in_zone(
    lifecycle_context: LifecycleContext,
    subnet_id: ResourceId,
    zone: Zone,
) -> LifecycleContext {
    lifecycle_context
        .cloud
        .add_subnet(subnet_id.as_ref(), zone.as_ref());
    lifecycle_context
}

#[given("the default image family is published")]
fn default_image_published(lifecycle_context: LifecycleContext) -> LifecycleContext {
    lifecycle_context
        .cloud
        .add_image("fd8-ubuntu", "ubuntu-2004-lts");
    lifecycle_context
}

#[given("an instance named \"{name}\" already exists")]
fn instance_exists(lifecycle_context: LifecycleContext, name: InstanceName) -> LifecycleContext {
    lifecycle_context
        .cloud
        .add_instance(name.as_ref(), "10.128.0.5", Some("84.201.0.5"));
    lifecycle_context
}

#[given("a running instance named \"{name}\"")]
fn running_instance(
    mut lifecycle_context: LifecycleContext,
    name: InstanceName,
) -> LifecycleContext {
    let id = lifecycle_context
        .cloud
        .add_instance(name.as_ref(), "10.128.0.20", Some("84.201.0.20"));
    lifecycle_context.instance_id = Some(id);
    lifecycle_context
}

#[given("the create operation fails with \"{message}\"")]
fn create_operation_fails(
    lifecycle_context: LifecycleContext,
    message: ErrorSnippet,
) -> LifecycleContext {
    lifecycle_context.cloud.fail_operation(
        "create_instance",
        OperationStatus {
            code: 8,
            message: message.to_string(),
        },
    );
    lifecycle_context
}

#[given("deleting instances is unavailable")]
fn delete_unavailable(lifecycle_context: LifecycleContext) -> LifecycleContext {
    lifecycle_context
        .cloud
        .fail_next("delete_instance", ScriptedCloudError::Unavailable);
    lifecycle_context
}

#[given("created instances report no external address")]
fn no_external_address(lifecycle_context: LifecycleContext) -> LifecycleContext {
    lifecycle_context
        .cloud
        .set_create_interfaces(vec![interface("10.128.0.10", None)]);
    lifecycle_context
}

#[given("create operations omit the instance id")]
fn omit_instance_id(lifecycle_context: LifecycleContext) -> LifecycleContext {
    lifecycle_context.cloud.omit_instance_id();
    lifecycle_context
}

#[when("I create the machine")]
fn create_machine(lifecycle_context: LifecycleContext) -> Result<LifecycleContext, StepError> {
    let driver = lifecycle_context.driver();
    let config = lifecycle_context.config.clone();
    let created = lifecycle_context.record(
        async move { driver.create(&config, PUBLIC_KEY).await },
        LifecycleResult::Created,
    )?;
    Ok(created)
}

#[when("I run the pre-create checks")]
fn pre_create_checks(lifecycle_context: LifecycleContext) -> Result<LifecycleContext, StepError> {
    let driver = lifecycle_context.driver();
    let config = lifecycle_context.config.clone();
    let checked = lifecycle_context.record(
        async move { driver.pre_create_check(&config).await },
        LifecycleResult::Checked,
    )?;
    Ok(checked)
}

#[when("I stop the machine")]
fn stop_machine(lifecycle_context: LifecycleContext) -> Result<LifecycleContext, StepError> {
    let driver = lifecycle_context.driver();
    let id = lifecycle_context.instance_id()?;
    let stopped = lifecycle_context.record(
        async move { driver.stop(&id).await },
        |()| LifecycleResult::Done,
    )?;
    Ok(stopped)
}

#[when("I start the machine")]
fn start_machine(lifecycle_context: LifecycleContext) -> Result<LifecycleContext, StepError> {
    let driver = lifecycle_context.driver();
    let id = lifecycle_context.instance_id()?;
    let started = lifecycle_context.record(
        async move { driver.start(&id).await },
        |()| LifecycleResult::Done,
    )?;
    Ok(started)
}

#[when("I remove the machine")]
fn remove_machine(lifecycle_context: LifecycleContext) -> Result<LifecycleContext, StepError> {
    let driver = lifecycle_context.driver();
    let id = lifecycle_context.instance_id()?;
    let removed = lifecycle_context.record(
        async move { driver.remove(&id).await },
        |()| LifecycleResult::Done,
    )?;
    Ok(removed)
}

#[when("I query the machine state")]
fn query_state(lifecycle_context: LifecycleContext) -> Result<LifecycleContext, StepError> {
    let driver = lifecycle_context.driver();
    let id = lifecycle_context.instance_id()?;
    let queried = lifecycle_context.record(
        async move { driver.state(&id).await },
        LifecycleResult::State,
    )?;
    Ok(queried)
}

#[when("I ask for the machine URL")]
fn query_url(lifecycle_context: LifecycleContext) -> Result<LifecycleContext, StepError> {
    let driver = lifecycle_context.driver();
    let id = lifecycle_context.instance_id()?;
    let policy = lifecycle_context.config.network.address_policy;
    let queried = lifecycle_context.record(
        async move { driver.url(&id, policy).await },
        LifecycleResult::Url,
    )?;
    Ok(queried)
}

fn outcome(lifecycle_context: &LifecycleContext) -> Result<&LifecycleResult, StepError> {
    lifecycle_context
        .outcome
        .as_ref()
        .ok_or_else(|| StepError::Assertion(String::from("no lifecycle outcome recorded")))
}

fn unexpected(result: &LifecycleResult) -> StepError {
    StepError::Assertion(format!("unexpected lifecycle outcome: {result:?}"))
}

#[then("the machine is created with address \"{address}\"")]
fn machine_created(
    lifecycle_context: &LifecycleContext,
    address: Expected,
) -> Result<(), StepError> {
    match outcome(lifecycle_context)? {
        LifecycleResult::Created(machine) if machine.address == address.as_ref() => {
            if lifecycle_context.cloud.instance(&machine.instance_id).is_none() {
                return Err(StepError::Assertion(format!(
                    "instance {} does not exist",
                    machine.instance_id
                )));
            }
            Ok(())
        }
        other => Err(unexpected(other)),
    }
}

#[then("the request targets folder \"{folder_id}\" and subnet \"{subnet_id}\"")]
fn request_targets(
    lifecycle_context: &LifecycleContext,
    folder_id: ResourceId,
    subnet_id: ResourceId,
) -> Result<(), StepError> {
    let requests = lifecycle_context.cloud.create_requests();
    let [request] = requests.as_slice() else {
        return Err(StepError::Assertion(format!(
            "expected one creation request, got {}",
            requests.len()
        )));
    };
    let subnets: Vec<&str> = request
        .network_interface_specs
        .iter()
        .map(|spec| spec.subnet_id.as_str())
        .collect();
    if request.folder_id != folder_id.as_ref() || subnets != [subnet_id.as_ref()] {
        return Err(StepError::Assertion(format!(
            "request placed in folder {} subnets {subnets:?}",
            request.folder_id
        )));
    }
    Ok(())
}

#[then("the request boot disk holds {size} gigabytes")]
fn boot_disk_size(lifecycle_context: &LifecycleContext, size: u64) -> Result<(), StepError> {
    let requests = lifecycle_context.cloud.create_requests();
    let expected = size * (1 << 30);
    if requests
        .iter()
        .all(|request| request.boot_disk_spec.disk_spec.size == expected)
        && !requests.is_empty()
    {
        return Ok(());
    }
    Err(StepError::Assertion(format!(
        "expected boot disks of {expected} bytes in {requests:?}"
    )))
}

#[then("the lifecycle fails with error containing \"{snippet}\"")]
fn lifecycle_fails(
    lifecycle_context: &LifecycleContext,
    snippet: ErrorSnippet,
) -> Result<(), StepError> {
    match outcome(lifecycle_context)? {
        LifecycleResult::Failed(message) if message.contains(snippet.as_ref()) => Ok(()),
        other => Err(unexpected(other)),
    }
}

#[then("no creation request was submitted")]
fn no_creation_request(lifecycle_context: &LifecycleContext) -> Result<(), StepError> {
    let requests = lifecycle_context.cloud.create_requests();
    if requests.is_empty() {
        return Ok(());
    }
    Err(StepError::Assertion(format!(
        "expected no creation request, got {}",
        requests.len()
    )))
}

#[then("no instance is left behind")]
fn no_instance_left(lifecycle_context: &LifecycleContext) -> Result<(), StepError> {
    let count = lifecycle_context.cloud.instance_count();
    if count == 0 {
        return Ok(());
    }
    Err(StepError::Assertion(format!(
        "expected no instances, found {count}"
    )))
}

#[then("a cleanup delete was attempted")]
fn cleanup_attempted(lifecycle_context: &LifecycleContext) -> Result<(), StepError> {
    let calls = lifecycle_context.cloud.calls();
    if calls.iter().any(|call| call == "delete_instance") {
        return Ok(());
    }
    Err(StepError::Assertion(format!(
        "expected a delete call, got {calls:?}"
    )))
}

#[then("{count} instance remains")]
fn instances_remain(lifecycle_context: &LifecycleContext, count: usize) -> Result<(), StepError> {
    let remaining = lifecycle_context.cloud.instance_count();
    if remaining == count {
        return Ok(());
    }
    Err(StepError::Assertion(format!(
        "expected {count} instances, found {remaining}"
    )))
}

#[then("the checks resolve folder \"{folder_id}\" and subnet \"{subnet_id}\"")]
fn checks_resolve(
    lifecycle_context: &LifecycleContext,
    folder_id: ResourceId,
    subnet_id: ResourceId,
) -> Result<(), StepError> {
    match outcome(lifecycle_context)? {
        LifecycleResult::Checked(placement)
            if placement.folder_id == folder_id.as_ref()
                && placement.subnet_id == subnet_id.as_ref() =>
        {
            Ok(())
        }
        other => Err(unexpected(other)),
    }
}

#[then("the reported state is \"{state}\"")]
fn reported_state(lifecycle_context: &LifecycleContext, state: Expected) -> Result<(), StepError> {
    match outcome(lifecycle_context)? {
        LifecycleResult::State(reported) if reported.to_string() == state.as_ref() => Ok(()),
        other => Err(unexpected(other)),
    }
}

#[then("the reported URL is \"{url}\"")]
fn reported_url(lifecycle_context: &LifecycleContext, url: Expected) -> Result<(), StepError> {
    match outcome(lifecycle_context)? {
        LifecycleResult::Url(reported) if reported == url.as_ref() => Ok(()),
        other => Err(unexpected(other)),
    }
}

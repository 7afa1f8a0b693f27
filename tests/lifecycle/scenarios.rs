//! BDD scenarios for the machine lifecycle.

use rstest_bdd_macros::scenario;

use super::test_helpers::{LifecycleContext, lifecycle_context};

#[scenario(
    path = "tests/features/lifecycle.feature",
    name = "Create a machine with derived placement"
)]
fn scenario_create_with_derived_placement(lifecycle_context: LifecycleContext) {
    let _ = lifecycle_context;
}

#[scenario(
    path = "tests/features/lifecycle.feature",
    name = "Refuse to guess between several clouds"
)]
fn scenario_ambiguous_cloud(lifecycle_context: LifecycleContext) {
    let _ = lifecycle_context;
}

#[scenario(
    path = "tests/features/lifecycle.feature",
    name = "Reject a name that is already taken"
)]
fn scenario_machine_exists(lifecycle_context: LifecycleContext) {
    let _ = lifecycle_context;
}

#[scenario(
    path = "tests/features/lifecycle.feature",
    name = "Pass the pre-create checks"
)]
fn scenario_pre_create_checks(lifecycle_context: LifecycleContext) {
    let _ = lifecycle_context;
}

#[scenario(
    path = "tests/features/lifecycle.feature",
    name = "Delete the instance when the create operation fails"
)]
fn scenario_create_operation_fails(lifecycle_context: LifecycleContext) {
    let _ = lifecycle_context;
}

#[scenario(
    path = "tests/features/lifecycle.feature",
    name = "Delete the instance when it reports no external address"
)]
fn scenario_no_external_address(lifecycle_context: LifecycleContext) {
    let _ = lifecycle_context;
}

#[scenario(
    path = "tests/features/lifecycle.feature",
    name = "Fail when the create operation names no instance"
)]
fn scenario_missing_instance_id(lifecycle_context: LifecycleContext) {
    let _ = lifecycle_context;
}

#[scenario(
    path = "tests/features/lifecycle.feature",
    name = "Stop and start a running machine"
)]
fn scenario_stop_and_start(lifecycle_context: LifecycleContext) {
    let _ = lifecycle_context;
}

#[scenario(
    path = "tests/features/lifecycle.feature",
    name = "Report the Docker URL of a machine"
)]
fn scenario_docker_url(lifecycle_context: LifecycleContext) {
    let _ = lifecycle_context;
}

#[scenario(
    path = "tests/features/lifecycle.feature",
    name = "Remove a machine"
)]
fn scenario_remove(lifecycle_context: LifecycleContext) {
    let _ = lifecycle_context;
}

#[scenario(
    path = "tests/features/lifecycle.feature",
    name = "Report the create failure when the cleanup delete also fails"
)]
fn scenario_cleanup_failure_keeps_create_error(lifecycle_context: LifecycleContext) {
    let _ = lifecycle_context;
}

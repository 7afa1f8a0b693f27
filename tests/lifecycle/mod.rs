//! Lifecycle scenarios run against an in-memory cloud.

mod bdd_steps;
mod scenarios;
mod test_helpers;

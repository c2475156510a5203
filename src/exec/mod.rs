//! Command Execution
//!
//! Runs a [`CommandLine`](crate::guards::CommandLine) that the
//! [`CommandAuthorizer`](crate::guards::CommandAuthorizer) has already
//! approved.
//!
//! # Security Features
//!
//! - **List Invocation**: the program and its arguments are passed as a vector, never through a shell
//! - **Clean Environment**: the child sees only a fixed `PATH`
//! - **Timeout Enforcement**: a child that outlives its deadline is killed
//! - **Output Limits**: captured stdout/stderr are capped

mod runner;

pub use runner::{CommandOutput, CommandRunner, ExecError, RunnerConfig, DEFAULT_SEARCH_PATH};

//! Warden Library
//!
//! Boundary guards for a small HTTP service that hands untrusted request
//! fields to privileged operations: a command whitelist, path confinement,
//! hostname validation, parameterized SQL, structural payload checks, and
//! an API key compared in constant time.

pub mod config;
pub mod deadline;
pub mod error;
pub mod exec;
pub mod guards;
pub mod logging;
pub mod metrics;
pub mod probe;
pub mod server;
pub mod store;

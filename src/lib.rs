//! Secret Lease Controller Library
//!
//! Provisions secrets, resources and numeric leases for pods from their
//! annotations. The controller binary watches pods and creates missing
//! values in the shared store; the init binary resolves a pod's values into
//! files before the workload starts.
//!
//! Tests are included in the module files and under `tests/`.

pub mod annotations;
pub mod aws;
pub mod config;
pub mod constants;
pub mod controller;
pub mod generator;
pub mod init;
pub mod lease;
pub mod model;
pub mod observability;
pub mod runtime;
pub mod server;
pub mod storage;

//! Core provisioning logic for dapp-bk
//!
//! This crate provides:
//! - Network provisioning (one `<project>-network` per project)
//! - App container lifecycle (reuse, start, rebuild)
//! - Data container acknowledgement (declared roles only)
//! - Composer dependency installation inside the app container
//! - Best-effort host network repair
//! - The containers-names file shared between commands

mod error;
mod manager;
mod names;
pub mod network_fix;

pub use error::*;
pub use manager::*;
pub use names::*;
pub use network_fix::{CommandRunner, OsFamily, RemediationStep, StepOutput, StepReport, SystemRunner};

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

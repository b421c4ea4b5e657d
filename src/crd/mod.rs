//! Custom Resource Definitions for the hardware manager
//!
//! This module contains all CRD types:
//! - NodeAllocationRequest: request to allocate a hardware node
//! - NodeReleaseRequest: request to release an allocated node
//! - Conditions: shared status condition vocabulary

pub mod allocation;
pub mod conditions;
pub mod release;

pub use allocation::*;
pub use conditions::*;
pub use release::*;

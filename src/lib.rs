//! Fleet Node Operator
//!
//! A Kubernetes operator fulfilling hardware node allocation and release
//! requests submitted as custom resources.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Controller Runtime                      │
//! │    (watch + work dispatch, one in-flight pass per object)    │
//! ├──────────────────────────────┬──────────────────────────────┤
//! │    NodeAllocationRequest     │      NodeReleaseRequest      │
//! │         controller           │          controller          │
//! ├──────────────────────────────┴──────────────────────────────┤
//! │                    Reconciliation Engine                     │
//! │      finalizer state machine · merge-patch persistence       │
//! ├──────────────────────────────┬──────────────────────────────┤
//! │      AllocationHandler       │        ReleaseHandler        │
//! │   node id · BMC credentials  │        node hand-back        │
//! ├──────────────────────────────┴──────────────────────────────┤
//! │                    Kubernetes API Server                     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`controller`]: kube runtime wiring, metrics, startup checks
//! - [`crd`]: Custom Resource Definitions
//! - [`engine`]: generic reconciliation engine
//! - [`error`]: error types and requeue policy
//! - [`hooks`]: per-kind request handlers

pub mod controller;
pub mod crd;
pub mod engine;
pub mod error;
pub mod hooks;

// Re-export commonly used types
pub use controller::{ensure_kind_registered, run_controller, Context, ControllerMetrics};

pub use crd::{
    BmcDetails, Condition, ConditionStatus, NodeAllocationRequest, NodeAllocationRequestSpec,
    NodeAllocationRequestStatus, NodeReleaseRequest, NodeReleaseRequestSpec,
    NodeReleaseRequestStatus,
};

pub use engine::{
    Engine, FinalizerToken, KubeStore, ManagedObject, ObjectIdentity, ObjectStore, Outcome,
    DEFAULT_FINALIZER,
};

pub use error::{Error, ErrorAction, Result};

pub use hooks::{
    AllocationHandler, CredentialsStore, KubeCredentialsStore, ReleaseHandler, RequestHandler,
    RequestHandlerRef,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

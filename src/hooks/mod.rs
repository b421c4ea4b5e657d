//! Business hook contract and per-kind request handlers
//!
//! The engine drives every kind through the same narrow contract: an
//! idempotent forward-progress step and an idempotent teardown step, each
//! taking the current object snapshot and returning the full derived status.
//! Handlers never write to the store themselves; persisting the returned
//! status (and any finalizer change) is the engine's job.

use async_trait::async_trait;
use std::sync::Arc;

use crate::engine::ManagedObject;
use crate::error::Result;

pub mod allocation;
pub mod release;

pub use allocation::{AllocationHandler, CredentialsStore, KubeCredentialsStore};
pub use release::ReleaseHandler;

/// Kind-specific business logic invoked by the engine
///
/// Both operations must be safe to call repeatedly: `apply` re-runs on every
/// external change and after crashes, `cleanup` re-runs until the finalizer
/// removal is persisted. A business failure is reported as
/// [`crate::error::Error::Hook`]; it keeps the finalizer in place and is
/// surfaced through the status rather than escalating.
#[async_trait]
pub trait RequestHandler<K: ManagedObject>: Send + Sync {
    /// Move the request toward its fulfilled state and return the derived
    /// status
    async fn apply(&self, object: &K) -> Result<K::Status>;

    /// Tear down whatever `apply` built; called only after deletion has been
    /// requested
    async fn cleanup(&self, object: &K) -> Result<K::Status>;
}

pub type RequestHandlerRef<K> = Arc<dyn RequestHandler<K>>;

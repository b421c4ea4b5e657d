//! Generic reconciliation engine
//!
//! One engine instance converges one kind of managed object: it re-fetches
//! the object on every trigger, decides between claim, fulfill, and teardown
//! from the deletion timestamp and the finalizer set, invokes the kind's
//! [`RequestHandler`](crate::hooks::RequestHandler), and persists the result
//! through merge patches guarded by the snapshot's resourceVersion.
//!
//! The finalizer claim is a pass of its own: a freshly observed object first
//! gets the finalizer persisted and nothing else, so no handler ever runs on
//! an object the engine has not durably claimed. Teardown runs strictly
//! between finalizer presence and finalizer removal, which is what makes
//! cleanup crash-safe: stopping between any two writes leaves a state the
//! next pass resolves by re-running the same idempotent decision logic.

pub mod finalizer;
pub mod object;
pub mod patch;
pub mod store;

pub use finalizer::{FinalizerToken, DEFAULT_FINALIZER};
pub use object::{ManagedObject, ObjectIdentity};
pub use store::{KubeStore, ObjectStore, ObjectStoreRef};

use std::time::Duration;
use tracing::{debug, info, warn};

use crate::crd::conditions::{set_condition, Condition, ConditionStatus, CONDITION_FULFILLED};
use crate::error::{Error, Result};
use crate::hooks::RequestHandlerRef;

/// Passes re-run in place after a concurrent-write conflict before the error
/// is handed back to the dispatcher
const MAX_CONFLICT_RETRIES: usize = 3;

/// Delay before retrying a request whose handler reported a business failure
const HOOK_RETRY_DELAY: Duration = Duration::from_secs(30);

// =============================================================================
// Outcome
// =============================================================================

/// Result of a successful reconcile invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Nothing left to do until the next external change
    Done,
    /// Re-trigger after the given delay even without an external change
    RequeueAfter(Duration),
}

// =============================================================================
// Engine
// =============================================================================

/// Reconciliation engine for one managed kind
pub struct Engine<K: ManagedObject> {
    store: ObjectStoreRef<K>,
    handler: RequestHandlerRef<K>,
    finalizer: FinalizerToken,
}

impl<K: ManagedObject> Engine<K> {
    pub fn new(
        store: ObjectStoreRef<K>,
        handler: RequestHandlerRef<K>,
        finalizer: FinalizerToken,
    ) -> Self {
        Self {
            store,
            handler,
            finalizer,
        }
    }

    pub fn finalizer(&self) -> &FinalizerToken {
        &self.finalizer
    }

    /// Converge the object identified by `id` one step.
    ///
    /// The object is always re-fetched; no payload from the trigger is
    /// trusted. A conflict on any write restarts the whole pass from a fresh
    /// snapshot, since the rejected delta was computed against stale data.
    pub async fn reconcile(&self, id: &ObjectIdentity) -> Result<Outcome> {
        let mut conflicts = 0;
        loop {
            match self.reconcile_pass(id).await {
                Err(err) if err.is_conflict() && conflicts < MAX_CONFLICT_RETRIES => {
                    conflicts += 1;
                    debug!(
                        kind = K::kind_name(),
                        object = %id,
                        attempt = conflicts,
                        "concurrent write detected, re-running from a fresh snapshot"
                    );
                }
                other => return other,
            }
        }
    }

    async fn reconcile_pass(&self, id: &ObjectIdentity) -> Result<Outcome> {
        let Some(object) = self.store.get(id).await? else {
            info!(kind = K::kind_name(), object = %id, "object no longer exists");
            return Ok(Outcome::Done);
        };

        let deleting = object.is_deleting();
        let claimed = self.finalizer.is_present(object.object_meta());

        if !deleting && !claimed {
            return self.claim(id, &object).await;
        }

        if deleting {
            if !claimed {
                // Never claimed, so there is nothing to clean up; the store
                // erases the object once the remaining finalizers are gone.
                return Ok(Outcome::Done);
            }
            return self.teardown(id, &object).await;
        }

        self.fulfill(id, &object).await
    }

    /// Persist the finalizer before any handler runs. The metadata write
    /// produces the next trigger, under which the real work happens.
    async fn claim(&self, id: &ObjectIdentity, object: &K) -> Result<Outcome> {
        let mut desired = object.clone();
        self.finalizer.add(desired.object_meta_mut());
        self.push_meta(id, object, &desired).await?;
        debug!(
            kind = K::kind_name(),
            object = %id,
            finalizer = %self.finalizer,
            "claimed object"
        );
        Ok(Outcome::Done)
    }

    async fn fulfill(&self, id: &ObjectIdentity, object: &K) -> Result<Outcome> {
        let mut desired = object.clone();
        match self.handler.apply(object).await {
            Ok(status) => *desired.status_mut() = status,
            Err(Error::Hook { reason, message }) => {
                warn!(
                    kind = K::kind_name(),
                    object = %id,
                    %reason,
                    %message,
                    "request handler failed"
                );
                record_failure(desired.status_mut(), &reason, &message);
                self.push_status(id, object, &desired).await?;
                return Ok(Outcome::RequeueAfter(HOOK_RETRY_DELAY));
            }
            Err(err) => return Err(err),
        }
        self.push_status(id, object, &desired).await?;
        Ok(Outcome::Done)
    }

    /// Cleanup, status, then finalizer removal, in that order. A failure or
    /// crash at any point keeps the finalizer, so the store holds the object
    /// and the next pass retries from the last persisted step.
    async fn teardown(&self, id: &ObjectIdentity, object: &K) -> Result<Outcome> {
        let mut desired = object.clone();
        match self.handler.cleanup(object).await {
            Ok(status) => *desired.status_mut() = status,
            Err(Error::Hook { reason, message }) => {
                warn!(
                    kind = K::kind_name(),
                    object = %id,
                    %reason,
                    %message,
                    "cleanup failed, keeping finalizer"
                );
                record_failure(desired.status_mut(), &reason, &message);
                self.push_status(id, object, &desired).await?;
                return Ok(Outcome::RequeueAfter(HOOK_RETRY_DELAY));
            }
            Err(err) => return Err(err),
        }
        self.push_status(id, object, &desired).await?;

        self.finalizer.remove(desired.object_meta_mut());
        self.push_meta(id, object, &desired).await?;
        info!(
            kind = K::kind_name(),
            object = %id,
            "cleanup complete, finalizer removed"
        );
        Ok(Outcome::Done)
    }

    async fn push_meta(&self, id: &ObjectIdentity, base: &K, desired: &K) -> Result<()> {
        let Some(delta) = patch::meta_patch(base, desired)? else {
            return Ok(());
        };
        self.store.patch_meta(id, base_version(base)?, delta).await
    }

    async fn push_status(&self, id: &ObjectIdentity, base: &K, desired: &K) -> Result<()> {
        let Some(delta) = patch::status_patch(base, desired)? else {
            return Ok(());
        };
        self.store
            .patch_status(id, base_version(base)?, delta)
            .await
    }
}

fn base_version<K: ManagedObject>(base: &K) -> Result<&str> {
    base.resource_version()
        .ok_or_else(|| Error::Internal("object snapshot has no resourceVersion".into()))
}

fn record_failure<S: crate::crd::conditions::HasConditions>(
    status: &mut S,
    reason: &str,
    message: &str,
) {
    set_condition(
        status.conditions_mut(),
        Condition::new(CONDITION_FULFILLED, ConditionStatus::False, reason, message),
    );
}

// =============================================================================
// Tests
// =============================================================================

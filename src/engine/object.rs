//! Object contract between the engine and the request kinds it manages
//!
//! The engine never touches kind-specific fields. Everything it needs from a
//! managed object goes through [`ManagedObject`]: metadata for the finalizer
//! state machine, the deletion timestamp for the lifecycle decision, and the
//! status payload for persisting handler results.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{de::DeserializeOwned, Serialize};

use crate::crd::conditions::HasConditions;

// =============================================================================
// Object Identity
// =============================================================================

/// Stable identity of a managed object within one kind
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectIdentity {
    pub namespace: String,
    pub name: String,
}

impl ObjectIdentity {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for ObjectIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

// =============================================================================
// Managed Object
// =============================================================================

/// Accessors a request kind must provide to be driven by the engine
pub trait ManagedObject: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Engine-owned output payload persisted through the status channel
    type Status: Clone + Default + HasConditions + Send + Sync;

    /// Kind name used in logs and metrics labels
    fn kind_name() -> &'static str;

    fn object_meta(&self) -> &ObjectMeta;

    fn object_meta_mut(&mut self) -> &mut ObjectMeta;

    fn status(&self) -> Option<&Self::Status>;

    /// Mutable status, inserting the default payload if none is set yet
    fn status_mut(&mut self) -> &mut Self::Status;

    fn identity(&self) -> ObjectIdentity {
        let meta = self.object_meta();
        ObjectIdentity {
            namespace: meta.namespace.clone().unwrap_or_default(),
            name: meta.name.clone().unwrap_or_default(),
        }
    }

    /// Optimistic-concurrency token from the store
    fn resource_version(&self) -> Option<&str> {
        self.object_meta().resource_version.as_deref()
    }

    /// Whether an external delete request has marked this object for teardown
    fn is_deleting(&self) -> bool {
        self.object_meta().deletion_timestamp.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_display() {
        let id = ObjectIdentity::new("hw", "req-1");
        assert_eq!(id.to_string(), "hw/req-1");
    }
}

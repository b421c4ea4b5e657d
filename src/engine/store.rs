//! Object store port and its Kubernetes adapter
//!
//! The engine talks to the store through [`ObjectStore`]: typed get plus two
//! independent patch channels, each guarded by the resourceVersion of the
//! snapshot the delta was computed from. The adapter backed by the API server
//! translates HTTP 409 into [`Error::Conflict`] so the engine can re-fetch
//! and re-run, and treats a vanished object as a successful no-op write.

use async_trait::async_trait;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Patch, PatchParams};
use kube::{Api, Client};
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

use super::object::{ManagedObject, ObjectIdentity};
use crate::error::{Error, Result};

// =============================================================================
// Object Store Port
// =============================================================================

/// Typed access to one kind of managed object in the shared store
#[async_trait]
pub trait ObjectStore<K>: Send + Sync {
    /// Fetch the current version of the object, or `None` if it is gone
    async fn get(&self, id: &ObjectIdentity) -> Result<Option<K>>;

    /// Apply a merge patch to the metadata/spec channel, conditional on
    /// `base_version` still being current
    async fn patch_meta(&self, id: &ObjectIdentity, base_version: &str, patch: Value)
        -> Result<()>;

    /// Apply a merge patch to the status channel, conditional on
    /// `base_version` still being current
    async fn patch_status(
        &self,
        id: &ObjectIdentity,
        base_version: &str,
        patch: Value,
    ) -> Result<()>;
}

pub type ObjectStoreRef<K> = Arc<dyn ObjectStore<K>>;

// =============================================================================
// Kubernetes Adapter
// =============================================================================

/// [`ObjectStore`] backed by the Kubernetes API server
pub struct KubeStore<K> {
    client: Client,
    _kind: PhantomData<fn() -> K>,
}

impl<K> KubeStore<K> {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            _kind: PhantomData,
        }
    }
}

impl<K> KubeStore<K>
where
    K: ManagedObject
        + kube::Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + std::fmt::Debug,
{
    fn api(&self, id: &ObjectIdentity) -> Api<K> {
        Api::namespaced(self.client.clone(), &id.namespace)
    }
}

#[async_trait]
impl<K> ObjectStore<K> for KubeStore<K>
where
    K: ManagedObject
        + kube::Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + std::fmt::Debug,
{
    async fn get(&self, id: &ObjectIdentity) -> Result<Option<K>> {
        self.api(id)
            .get_opt(&id.name)
            .await
            .map_err(|err| store_error::<K>(err, id))
    }

    async fn patch_meta(
        &self,
        id: &ObjectIdentity,
        base_version: &str,
        patch: Value,
    ) -> Result<()> {
        let body = with_resource_version(patch, base_version);
        match self
            .api(id)
            .patch(&id.name, &PatchParams::default(), &Patch::Merge(&body))
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(response)) if response.code == 404 => {
                debug!(object = %id, "object vanished before metadata patch");
                Ok(())
            }
            Err(err) => Err(store_error::<K>(err, id)),
        }
    }

    async fn patch_status(
        &self,
        id: &ObjectIdentity,
        base_version: &str,
        patch: Value,
    ) -> Result<()> {
        let body = with_resource_version(patch, base_version);
        match self
            .api(id)
            .patch_status(&id.name, &PatchParams::default(), &Patch::Merge(&body))
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(response)) if response.code == 404 => {
                debug!(object = %id, "object vanished before status patch");
                Ok(())
            }
            Err(err) => Err(store_error::<K>(err, id)),
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Stamp the snapshot's resourceVersion into the patch body so the API server
/// rejects the write with a conflict if the object moved on
fn with_resource_version(mut patch: Value, version: &str) -> Value {
    if let Some(map) = patch.as_object_mut() {
        let meta = map
            .entry("metadata")
            .or_insert_with(|| Value::Object(Default::default()));
        if let Some(meta_map) = meta.as_object_mut() {
            meta_map.insert(
                "resourceVersion".to_string(),
                Value::String(version.to_string()),
            );
        }
    }
    patch
}

fn store_error<K: ManagedObject>(err: kube::Error, id: &ObjectIdentity) -> Error {
    match err {
        kube::Error::Api(ref response) if response.code == 409 => Error::Conflict {
            kind: K::kind_name().to_string(),
            namespace: id.namespace.clone(),
            name: id.name.clone(),
        },
        other => Error::Kube(other),
    }
}

//! Allocation request handler
//!
//! Fulfills a NodeAllocationRequest: assigns the node identifier, provisions
//! the BMC credentials secret, and publishes the BMC access details through
//! the status. Every step checks store state before acting so the handler can
//! be replayed indefinitely.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::api::{Patch, PatchParams, PostParams};
use kube::{Api, Client, Resource};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use super::RequestHandler;
use crate::crd::conditions::{set_condition, Condition};
use crate::crd::{NodeAllocationRequest, NodeAllocationRequestStatus};
use crate::engine::ManagedObject;
use crate::error::{Error, Result};

/// Suffix appended to the request name to form the credentials secret name
const BMC_SECRET_SUFFIX: &str = "-bmc";

const BMC_USERNAME: &str = "admin";

// =============================================================================
// Credentials Store
// =============================================================================

/// Persistence of BMC credentials for allocated nodes
#[async_trait]
pub trait CredentialsStore: Send + Sync {
    /// Create the credentials secret if it does not exist yet, otherwise make
    /// sure it is owned by the request. Existing credentials are never
    /// rotated by a replayed pass.
    async fn ensure(&self, namespace: &str, name: &str, owner: OwnerReference) -> Result<()>;
}

pub type CredentialsStoreRef = Arc<dyn CredentialsStore>;

/// [`CredentialsStore`] backed by Kubernetes secrets
pub struct KubeCredentialsStore {
    client: Client,
}

impl KubeCredentialsStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CredentialsStore for KubeCredentialsStore {
    async fn ensure(&self, namespace: &str, name: &str, owner: OwnerReference) -> Result<()> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        match api.get_opt(name).await? {
            Some(existing) => {
                let owned = existing
                    .metadata
                    .owner_references
                    .as_deref()
                    .unwrap_or_default()
                    .iter()
                    .any(|reference| reference.uid == owner.uid);
                if !owned {
                    let patch = serde_json::json!({"metadata": {"ownerReferences": [owner]}});
                    api.patch(name, &PatchParams::default(), &Patch::Merge(&patch))
                        .await?;
                }
            }
            None => {
                let mut string_data = BTreeMap::new();
                string_data.insert("username".to_string(), BMC_USERNAME.to_string());
                string_data.insert(
                    "password".to_string(),
                    Uuid::new_v4().simple().to_string(),
                );
                let secret = Secret {
                    metadata: ObjectMeta {
                        name: Some(name.to_string()),
                        namespace: Some(namespace.to_string()),
                        owner_references: Some(vec![owner]),
                        ..Default::default()
                    },
                    string_data: Some(string_data),
                    ..Default::default()
                };
                match api.create(&PostParams::default(), &secret).await {
                    Ok(_) => {}
                    // another pass won the creation race
                    Err(kube::Error::Api(response)) if response.code == 409 => {}
                    Err(err) => return Err(err.into()),
                }
            }
        }
        Ok(())
    }
}

// =============================================================================
// Allocation Handler
// =============================================================================

/// Business logic for NodeAllocationRequest objects
pub struct AllocationHandler {
    credentials: CredentialsStoreRef,
    bmc_address: String,
}

impl AllocationHandler {
    pub fn new(credentials: CredentialsStoreRef, bmc_address: impl Into<String>) -> Self {
        Self {
            credentials,
            bmc_address: bmc_address.into(),
        }
    }
}

#[async_trait]
impl RequestHandler<NodeAllocationRequest> for AllocationHandler {
    async fn apply(&self, object: &NodeAllocationRequest) -> Result<NodeAllocationRequestStatus> {
        let id = object.identity();
        info!(
            object = %id,
            cloud_id = %object.spec.cloud_id,
            location = %object.spec.location,
            "fulfilling allocation request"
        );

        let mut status = object.status().cloned().unwrap_or_default();

        // Assigned exactly once; the hardware manager keys later release
        // requests off this identifier.
        if status.node_id.is_empty() {
            status.node_id = Uuid::new_v4().to_string();
        }

        let secret_name = format!("{}{}", id.name, BMC_SECRET_SUFFIX);
        self.credentials
            .ensure(&id.namespace, &secret_name, owner_reference(object)?)
            .await?;
        debug!(object = %id, secret = %secret_name, "ensured BMC credentials secret");

        status.bmc.address = self.bmc_address.clone();
        status.bmc.credentials_name = secret_name;
        set_condition(&mut status.conditions, Condition::fulfilled());

        info!(
            object = %id,
            cloud_id = %object.spec.cloud_id,
            node_id = %status.node_id,
            "allocation request fulfilled"
        );
        Ok(status)
    }

    async fn cleanup(&self, object: &NodeAllocationRequest) -> Result<NodeAllocationRequestStatus> {
        let id = object.identity();
        info!(
            object = %id,
            node_id = object.node_id().unwrap_or(""),
            "releasing allocated node"
        );
        // The credentials secret is garbage-collected with the request
        // through its owner reference.
        Ok(object.status().cloned().unwrap_or_default())
    }
}

/// Owner reference tying a dependent resource to the request so the store's
/// garbage collector removes it with the parent
fn owner_reference(object: &NodeAllocationRequest) -> Result<OwnerReference> {
    let name = object
        .metadata
        .name
        .clone()
        .ok_or_else(|| Error::Internal("request has no name".into()))?;
    let uid = object
        .metadata
        .uid
        .clone()
        .ok_or_else(|| Error::Internal("request has no uid".into()))?;
    Ok(OwnerReference {
        api_version: NodeAllocationRequest::api_version(&()).into_owned(),
        kind: NodeAllocationRequest::kind(&()).into_owned(),
        name,
        uid,
        controller: None,
        block_owner_deletion: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::conditions::HasConditions;
    use crate::crd::NodeAllocationRequestSpec;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeCredentials {
        ensured: Mutex<Vec<(String, String, String)>>,
    }

    #[async_trait]
    impl CredentialsStore for FakeCredentials {
        async fn ensure(&self, namespace: &str, name: &str, owner: OwnerReference) -> Result<()> {
            self.ensured
                .lock()
                .unwrap()
                .push((namespace.to_string(), name.to_string(), owner.uid));
            Ok(())
        }
    }

    fn sample_request() -> NodeAllocationRequest {
        let mut request = NodeAllocationRequest::new(
            "req-1",
            NodeAllocationRequestSpec {
                cloud_id: "X".into(),
                location: "madrid".into(),
                extensions: BTreeMap::new(),
            },
        );
        request.metadata.namespace = Some("hw".into());
        request.metadata.uid = Some("uid-1".into());
        request
    }

    fn handler(credentials: Arc<FakeCredentials>) -> AllocationHandler {
        AllocationHandler::new(credentials, "https://bmc.example.com")
    }

    #[tokio::test]
    async fn apply_fulfills_the_request() {
        let credentials = Arc::new(FakeCredentials::default());
        let handler = handler(credentials.clone());

        let status = handler.apply(&sample_request()).await.unwrap();

        assert!(!status.node_id.is_empty());
        assert_eq!(status.bmc.address, "https://bmc.example.com");
        assert_eq!(status.bmc.credentials_name, "req-1-bmc");
        assert!(status.is_fulfilled());

        let ensured = credentials.ensured.lock().unwrap().clone();
        assert_eq!(
            ensured,
            vec![("hw".to_string(), "req-1-bmc".to_string(), "uid-1".to_string())]
        );
    }

    #[tokio::test]
    async fn node_id_is_stable_across_replays() {
        let credentials = Arc::new(FakeCredentials::default());
        let handler = handler(credentials.clone());
        let mut request = sample_request();

        let first = handler.apply(&request).await.unwrap();
        request.status = Some(first.clone());
        let second = handler.apply(&request).await.unwrap();

        assert_eq!(first.node_id, second.node_id);
        // the dependent secret is still reconciled on every pass
        assert_eq!(credentials.ensured.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn replayed_apply_is_a_fixed_point() {
        let credentials = Arc::new(FakeCredentials::default());
        let handler = handler(credentials);
        let mut request = sample_request();

        let first = handler.apply(&request).await.unwrap();
        request.status = Some(first.clone());
        let second = handler.apply(&request).await.unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn cleanup_leaves_status_untouched() {
        let credentials = Arc::new(FakeCredentials::default());
        let handler = handler(credentials.clone());
        let mut request = sample_request();
        request.status = Some(handler.apply(&request).await.unwrap());

        let status = handler.cleanup(&request).await.unwrap();

        assert_eq!(Some(status), request.status);
        assert_eq!(credentials.ensured.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_uid_is_an_error() {
        let credentials = Arc::new(FakeCredentials::default());
        let handler = handler(credentials);
        let mut request = sample_request();
        request.metadata.uid = None;

        assert!(handler.apply(&request).await.is_err());
    }
}

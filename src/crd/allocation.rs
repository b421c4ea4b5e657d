//! NodeAllocationRequest CRD
//!
//! A consumer-facing request to allocate a hardware node in a given location.
//! The spec is written once by the requester; the status is owned by the
//! engine and carries the assigned node identifier, the BMC details, and the
//! `Fulfilled` condition.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::conditions::{Condition, HasConditions};
use crate::engine::ManagedObject;

// =============================================================================
// NodeAllocationRequest CRD
// =============================================================================

/// NodeAllocationRequest asks the hardware manager to allocate a node for the
/// given cloud in the given location. The assigned node and its BMC access
/// details are published through the status once the request is fulfilled.
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "hardware.fleetops.io",
    version = "v1alpha1",
    kind = "NodeAllocationRequest",
    plural = "nodeallocationrequests",
    shortname = "nar",
    status = "NodeAllocationRequestStatus",
    printcolumn = r#"{"name": "Cloud", "type": "string", "jsonPath": ".spec.cloudId"}"#,
    printcolumn = r#"{"name": "Location", "type": "string", "jsonPath": ".spec.location"}"#,
    printcolumn = r#"{"name": "Node", "type": "string", "jsonPath": ".status.nodeId"}"#,
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#,
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct NodeAllocationRequestSpec {
    /// Identifier of the cloud the node is allocated for
    pub cloud_id: String,

    /// Location the node must be allocated in
    pub location: String,

    /// Vendor-specific extensions forwarded to the hardware manager
    #[serde(default)]
    pub extensions: BTreeMap<String, String>,
}

// =============================================================================
// Status
// =============================================================================

/// Status of a NodeAllocationRequest
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NodeAllocationRequestStatus {
    /// Identifier of the allocated node, assigned once and stable afterwards
    #[serde(default)]
    pub node_id: String,

    /// Access details of the node's baseboard management controller
    #[serde(default)]
    pub bmc: BmcDetails,

    /// Conditions
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// BMC endpoint and credentials reference for an allocated node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BmcDetails {
    /// URL of the BMC endpoint
    #[serde(default)]
    pub address: String,

    /// Name of the secret holding the BMC credentials, in the request's
    /// namespace
    #[serde(default)]
    pub credentials_name: String,
}

// =============================================================================
// Implementations
// =============================================================================

impl NodeAllocationRequest {
    /// The assigned node identifier, if one has been published
    pub fn node_id(&self) -> Option<&str> {
        self.status
            .as_ref()
            .map(|s| s.node_id.as_str())
            .filter(|id| !id.is_empty())
    }

    /// Whether the request has been fulfilled
    pub fn is_fulfilled(&self) -> bool {
        self.status
            .as_ref()
            .map(|s| s.is_fulfilled())
            .unwrap_or(false)
    }
}

impl HasConditions for NodeAllocationRequestStatus {
    fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    fn conditions_mut(&mut self) -> &mut Vec<Condition> {
        &mut self.conditions
    }
}

impl ManagedObject for NodeAllocationRequest {
    type Status = NodeAllocationRequestStatus;

    fn kind_name() -> &'static str {
        "NodeAllocationRequest"
    }

    fn object_meta(&self) -> &k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta {
        &self.metadata
    }

    fn object_meta_mut(&mut self) -> &mut k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta {
        &mut self.metadata
    }

    fn status(&self) -> Option<&Self::Status> {
        self.status.as_ref()
    }

    fn status_mut(&mut self) -> &mut Self::Status {
        self.status.get_or_insert_with(Default::default)
    }
}

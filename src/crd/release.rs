//! NodeReleaseRequest CRD
//!
//! A consumer-facing request to release a previously allocated node back to
//! the pool.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::conditions::{Condition, HasConditions};
use crate::engine::ManagedObject;

// =============================================================================
// NodeReleaseRequest CRD
// =============================================================================

/// NodeReleaseRequest asks the hardware manager to release the node that was
/// allocated under the given identifier.
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "hardware.fleetops.io",
    version = "v1alpha1",
    kind = "NodeReleaseRequest",
    plural = "nodereleaserequests",
    shortname = "nrr",
    status = "NodeReleaseRequestStatus",
    printcolumn = r#"{"name": "Cloud", "type": "string", "jsonPath": ".spec.cloudId"}"#,
    printcolumn = r#"{"name": "Node", "type": "string", "jsonPath": ".spec.nodeId"}"#,
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#,
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct NodeReleaseRequestSpec {
    /// Identifier of the cloud the node belongs to
    pub cloud_id: String,

    /// Identifier of the node to release, as assigned at allocation time
    pub node_id: String,

    /// Vendor-specific extensions forwarded to the hardware manager
    #[serde(default)]
    pub extensions: BTreeMap<String, String>,
}

// =============================================================================
// Status
// =============================================================================

/// Status of a NodeReleaseRequest
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NodeReleaseRequestStatus {
    /// Conditions
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

// =============================================================================
// Implementations
// =============================================================================

impl NodeReleaseRequest {
    /// Whether the request has been fulfilled
    pub fn is_fulfilled(&self) -> bool {
        self.status
            .as_ref()
            .map(|s| s.is_fulfilled())
            .unwrap_or(false)
    }
}

impl HasConditions for NodeReleaseRequestStatus {
    fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    fn conditions_mut(&mut self) -> &mut Vec<Condition> {
        &mut self.conditions
    }
}

impl ManagedObject for NodeReleaseRequest {
    type Status = NodeReleaseRequestStatus;

    fn kind_name() -> &'static str {
        "NodeReleaseRequest"
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::conditions::set_condition;

    #[test]
    fn test_fulfilled_tracks_condition() {
        let mut request = NodeReleaseRequest::new(
            "rel-1",
            NodeReleaseRequestSpec {
                cloud_id: "X".into(),
                node_id: "7f2c".into(),
                extensions: BTreeMap::new(),
            },
        );
        assert!(!request.is_fulfilled());

        set_condition(request.status_mut().conditions_mut(), Condition::fulfilled());
        assert!(request.is_fulfilled());
    }
}

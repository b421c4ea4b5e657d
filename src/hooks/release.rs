//! Release request handler
//!
//! Fulfills a NodeReleaseRequest by handing the node identified in the spec
//! back to the hardware manager. The request itself holds no dependent
//! resources, so teardown only has to be replay-safe, not destructive.

use async_trait::async_trait;
use tracing::info;

use super::RequestHandler;
use crate::crd::conditions::{set_condition, Condition};
use crate::crd::{NodeReleaseRequest, NodeReleaseRequestStatus};
use crate::engine::ManagedObject;
use crate::error::Result;

/// Business logic for NodeReleaseRequest objects
#[derive(Default)]
pub struct ReleaseHandler;

#[async_trait]
impl RequestHandler<NodeReleaseRequest> for ReleaseHandler {
    async fn apply(&self, object: &NodeReleaseRequest) -> Result<NodeReleaseRequestStatus> {
        let id = object.identity();
        info!(
            object = %id,
            cloud_id = %object.spec.cloud_id,
            node_id = %object.spec.node_id,
            "fulfilling release request"
        );

        let mut status = object.status().cloned().unwrap_or_default();
        set_condition(&mut status.conditions, Condition::fulfilled());

        info!(
            object = %id,
            cloud_id = %object.spec.cloud_id,
            node_id = %object.spec.node_id,
            "release request fulfilled"
        );
        Ok(status)
    }

    async fn cleanup(&self, object: &NodeReleaseRequest) -> Result<NodeReleaseRequestStatus> {
        let id = object.identity();
        info!(object = %id, "performing cleanup");
        Ok(object.status().cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::conditions::HasConditions;
    use crate::crd::NodeReleaseRequestSpec;
    use std::collections::BTreeMap;

    fn sample_request() -> NodeReleaseRequest {
        let mut request = NodeReleaseRequest::new(
            "rel-1",
            NodeReleaseRequestSpec {
                cloud_id: "X".into(),
                node_id: "7f2c".into(),
                extensions: BTreeMap::new(),
            },
        );
        request.metadata.namespace = Some("hw".into());
        request
    }

    #[tokio::test]
    async fn apply_marks_the_request_fulfilled() {
        let handler = ReleaseHandler;

        let status = handler.apply(&sample_request()).await.unwrap();

        assert!(status.is_fulfilled());
    }

    #[tokio::test]
    async fn replayed_apply_is_a_fixed_point() {
        let handler = ReleaseHandler;
        let mut request = sample_request();

        let first = handler.apply(&request).await.unwrap();
        request.status = Some(first.clone());
        let second = handler.apply(&request).await.unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn cleanup_leaves_status_untouched() {
        let handler = ReleaseHandler;
        let mut request = sample_request();
        request.status = Some(handler.apply(&request).await.unwrap());

        let status = handler.cleanup(&request).await.unwrap();

        assert_eq!(Some(status), request.status);
    }
}

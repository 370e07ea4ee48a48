//! Suspended-node filter for pod restarts

use crate::errors::ControlPlaneError;
use crate::k8s::{ControlPlane, NodeFacts};
use crate::types::{NodeSuspensionFact, SuspensionReason};
use tracing::debug;

/// Taints that mark a node as going away
pub const SUSPENSION_TAINTS: [&str; 6] = [
    "node.kubernetes.io/unschedulable",
    "node.kubernetes.io/not-ready",
    "node.kubernetes.io/unreachable",
    "aws.amazon.com/spot-instance-terminating",
    "cluster-autoscaler.kubernetes.io/scale-down-disabled",
    "node.kubernetes.io/suspend",
];

/// Annotations that mark a node as suspended unless set to "false"
pub const SUSPENSION_ANNOTATIONS: [&str; 3] = [
    "cluster-autoscaler.kubernetes.io/scale-down-disabled",
    "node.kubernetes.io/suspend",
    "node.kubernetes.io/suspended",
];

pub fn classify_node(node: &NodeFacts) -> NodeSuspensionFact {
    let reason = if node.unschedulable {
        Some(SuspensionReason::Unschedulable)
    } else if let Some(taint) = node
        .taint_keys
        .iter()
        .find(|key| SUSPENSION_TAINTS.contains(&key.as_str()))
    {
        Some(SuspensionReason::Taint(taint.clone()))
    } else {
        SUSPENSION_ANNOTATIONS
            .iter()
            .find(|key| {
                node.annotations
                    .get(**key)
                    .is_some_and(|value| !value.trim().eq_ignore_ascii_case("false"))
            })
            .map(|key| SuspensionReason::Annotation(key.to_string()))
    };

    NodeSuspensionFact {
        node_name: node.name.clone(),
        suspended: reason.is_some(),
        reason,
    }
}

/// Looks up the node a pod runs on and classifies it
pub async fn pod_node_suspension(
    control_plane: &dyn ControlPlane,
    namespace: &str,
    pod: &str,
) -> Result<NodeSuspensionFact, ControlPlaneError> {
    let facts = control_plane.get_pod(namespace, pod).await?;
    let node_name = facts.node_name.ok_or_else(|| ControlPlaneError::Api {
        operation: format!("resolve node of pod {}", pod),
        reason: "pod is not scheduled on a node".to_string(),
    })?;

    let node = control_plane.get_node(&node_name).await?;
    let fact = classify_node(&node);
    debug!(
        "Node {} of pod {} suspended: {} ({})",
        fact.node_name,
        pod,
        fact.suspended,
        fact.reason
            .as_ref()
            .map(|r| r.to_string())
            .unwrap_or_else(|| "no signal".to_string())
    );
    Ok(fact)
}

//! Rolling restart of a cluster, one pod at a time

pub mod orchestrator;
pub mod pod;
pub mod suspension;

pub use orchestrator::{failure_message, ClusterRestartOrchestrator, RunState};
pub use pod::{PodRestartCoordinator, PodRestartFailure};
pub use suspension::{classify_node, pod_node_suspension};

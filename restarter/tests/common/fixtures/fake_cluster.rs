//! In-memory cluster for testing restart runs
//!
//! Implements both the control plane and the SQL probe, so a run sees one
//! consistent world: deleting a pod brings up a replacement with a new UID,
//! and a manual decommission makes the database process exit.

use anyhow::anyhow;
use async_trait::async_trait;
use restarter::errors::ControlPlaneError;
use restarter::http::{ClusterProbe, SqlResponse};
use restarter::k8s::{BackingSpec, ControlPlane, DiscoveryResult, NodeFacts, PodFacts};
use restarter::runtime::RunHandle;
use restarter::types::{ClusterIdentity, ClusterSpec, DecommissionConfig, HealthStatus};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use super::test_data::{clusters, hooks};

struct FakeState {
    clusters: Vec<ClusterSpec>,
    backing: Option<BackingSpec>,
    pods: HashMap<String, PodFacts>,
    nodes: HashMap<String, NodeFacts>,
    health_script: VecDeque<HealthStatus>,
    default_health: HealthStatus,
    health_polls: u32,
    statements: Vec<(String, String)>,
    deleted: Vec<(String, u32)>,
    failing_statements: Vec<String>,
    stalling_statements: Vec<String>,
    never_ready: HashSet<String>,
    exit_on_decommission: bool,
    cancel_on_delete: Option<(String, Arc<RunHandle>)>,
    pause_on_delete: Option<(String, Arc<RunHandle>)>,
    generation: u32,
}

pub struct FakeCluster {
    state: Mutex<FakeState>,
}

/// A pod named like a statefulset member, running and ready on `node`
pub fn running_pod(name: &str, node: &str) -> PodFacts {
    PodFacts {
        name: name.to_string(),
        uid: Some(format!("{}-uid-0", name)),
        node_name: Some(node.to_string()),
        phase: Some("Running".to_string()),
        ready: true,
        database_restarts: 0,
        database_running: true,
    }
}

pub fn cluster_spec(pods: &[&str], replicas: i32) -> ClusterSpec {
    ClusterSpec::new(
        ClusterIdentity {
            name: clusters::NAME.to_string(),
            namespace: clusters::NAMESPACE.to_string(),
            crd_name: clusters::CRD.to_string(),
            statefulset_name: clusters::STATEFULSET.to_string(),
        },
        pods.iter().map(|p| p.to_string()).collect(),
        DecommissionConfig::default(),
        HealthStatus::Green,
        replicas,
    )
    .expect("valid test cluster")
}

impl FakeCluster {
    /// One GREEN cluster whose pods each run on `node-{i}`, behind a managed hook
    pub fn new(pods: &[&str]) -> Self {
        let pod_facts = pods
            .iter()
            .enumerate()
            .map(|(i, pod)| (pod.to_string(), running_pod(pod, &format!("node-{}", i + 1))))
            .collect();
        let nodes = (1..=pods.len())
            .map(|i| {
                let name = format!("node-{}", i);
                (
                    name.clone(),
                    NodeFacts {
                        name,
                        ..NodeFacts::default()
                    },
                )
            })
            .collect();

        Self {
            state: Mutex::new(FakeState {
                clusters: vec![cluster_spec(pods, pods.len() as i32)],
                backing: Some(BackingSpec {
                    statefulset_name: clusters::STATEFULSET.to_string(),
                    replicas: pods.len() as i32,
                    prestop_command: Some(hooks::managed()),
                }),
                pods: pod_facts,
                nodes,
                health_script: VecDeque::new(),
                default_health: HealthStatus::Green,
                health_polls: 0,
                statements: Vec::new(),
                deleted: Vec::new(),
                failing_statements: Vec::new(),
                stalling_statements: Vec::new(),
                never_ready: HashSet::new(),
                exit_on_decommission: true,
                cancel_on_delete: None,
                pause_on_delete: None,
                generation: 0,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().expect("fake cluster state poisoned")
    }

    /// The single cluster this fake was built with
    pub fn cluster(&self) -> ClusterSpec {
        self.lock().clusters[0].clone()
    }

    pub fn with_cluster(self, cluster: ClusterSpec) -> Self {
        self.lock().clusters = vec![cluster];
        self
    }

    pub fn with_prestop(self, command: Option<Vec<String>>) -> Self {
        if let Some(backing) = self.lock().backing.as_mut() {
            backing.prestop_command = command;
        }
        self
    }

    pub fn without_backing_spec(self) -> Self {
        self.lock().backing = None;
        self
    }

    /// Health answers in order; once exhausted `default` is reported forever
    pub fn with_health(self, script: &[HealthStatus], default: HealthStatus) -> Self {
        {
            let mut state = self.lock();
            state.health_script = script.iter().copied().collect();
            state.default_health = default;
        }
        self
    }

    pub fn with_node_annotation(self, node: &str, key: &str, value: &str) -> Self {
        if let Some(facts) = self.lock().nodes.get_mut(node) {
            facts.annotations.insert(key.to_string(), value.to_string());
        }
        self
    }

    pub fn with_unschedulable_node(self, node: &str) -> Self {
        if let Some(facts) = self.lock().nodes.get_mut(node) {
            facts.unschedulable = true;
        }
        self
    }

    pub fn without_node(self, node: &str) -> Self {
        self.lock().nodes.remove(node);
        self
    }

    /// Statements containing `fragment` fail
    pub fn failing_statements(self, fragment: &str) -> Self {
        self.lock().failing_statements.push(fragment.to_string());
        self
    }

    /// Statements containing `fragment` never get an answer
    pub fn stalling_statements(self, fragment: &str) -> Self {
        self.lock().stalling_statements.push(fragment.to_string());
        self
    }

    /// Replacements of `pod` never report Ready
    pub fn never_ready(self, pod: &str) -> Self {
        self.lock().never_ready.insert(pod.to_string());
        self
    }

    /// The database keeps running after `alter cluster decommission`
    pub fn process_never_exits(self) -> Self {
        self.lock().exit_on_decommission = false;
        self
    }

    /// Cancels the run through `handle` as soon as `pod` is deleted
    pub fn cancel_on_delete(&self, pod: &str, handle: Arc<RunHandle>) {
        self.lock().cancel_on_delete = Some((pod.to_string(), handle));
    }

    /// Pauses the run through `handle` as soon as `pod` is deleted
    pub fn pause_on_delete(&self, pod: &str, handle: Arc<RunHandle>) {
        self.lock().pause_on_delete = Some((pod.to_string(), handle));
    }

    pub fn deleted(&self) -> Vec<(String, u32)> {
        self.lock().deleted.clone()
    }

    pub fn deleted_pods(&self) -> Vec<String> {
        self.lock().deleted.iter().map(|(pod, _)| pod.clone()).collect()
    }

    pub fn statements(&self) -> Vec<(String, String)> {
        self.lock().statements.clone()
    }

    pub fn statements_containing(&self, fragment: &str) -> Vec<(String, String)> {
        self.lock()
            .statements
            .iter()
            .filter(|(_, stmt)| stmt.contains(fragment))
            .cloned()
            .collect()
    }

    pub fn health_polls(&self) -> u32 {
        self.lock().health_polls
    }

    pub fn pod(&self, name: &str) -> Option<PodFacts> {
        self.lock().pods.get(name).cloned()
    }
}

#[async_trait]
impl ControlPlane for FakeCluster {
    async fn discover_clusters(&self, names: &[String]) -> Result<DiscoveryResult, ControlPlaneError> {
        let state = self.lock();
        let clusters = state
            .clusters
            .iter()
            .filter(|c| names.is_empty() || names.iter().any(|n| n == c.name()))
            .cloned()
            .collect();
        Ok(DiscoveryResult {
            clusters,
            errors: Vec::new(),
        })
    }

    async fn backing_spec(&self, cluster: &ClusterSpec) -> Result<BackingSpec, ControlPlaneError> {
        self.lock()
            .backing
            .clone()
            .ok_or_else(|| ControlPlaneError::NotFound {
                kind: "StatefulSet".to_string(),
                name: cluster.identity().statefulset_name.clone(),
            })
    }

    async fn get_pod(&self, _namespace: &str, pod: &str) -> Result<PodFacts, ControlPlaneError> {
        self.lock()
            .pods
            .get(pod)
            .cloned()
            .ok_or_else(|| ControlPlaneError::NotFound {
                kind: "Pod".to_string(),
                name: pod.to_string(),
            })
    }

    async fn delete_pod(
        &self,
        _namespace: &str,
        pod: &str,
        grace_period_secs: u32,
    ) -> Result<(), ControlPlaneError> {
        let mut state = self.lock();
        let Some(current) = state.pods.get(pod).cloned() else {
            return Err(ControlPlaneError::NotFound {
                kind: "Pod".to_string(),
                name: pod.to_string(),
            });
        };

        state.generation += 1;
        let ready = !state.never_ready.contains(pod);
        let replacement = PodFacts {
            uid: Some(format!("{}-uid-{}", pod, state.generation)),
            ready,
            database_restarts: 0,
            database_running: true,
            ..current
        };
        state.pods.insert(pod.to_string(), replacement);
        state.deleted.push((pod.to_string(), grace_period_secs));

        if let Some((target, handle)) = &state.cancel_on_delete {
            if target == pod {
                handle.cancel("operator abort");
            }
        }
        if let Some((target, handle)) = &state.pause_on_delete {
            if target == pod {
                handle.pause();
            }
        }
        Ok(())
    }

    async fn get_node(&self, node: &str) -> Result<NodeFacts, ControlPlaneError> {
        self.lock()
            .nodes
            .get(node)
            .cloned()
            .ok_or_else(|| ControlPlaneError::NotFound {
                kind: "Node".to_string(),
                name: node.to_string(),
            })
    }
}

#[async_trait]
impl ClusterProbe for FakeCluster {
    async fn cluster_health(&self, _cluster: &ClusterSpec) -> anyhow::Result<HealthStatus> {
        let mut state = self.lock();
        state.health_polls += 1;
        let default = state.default_health;
        Ok(state.health_script.pop_front().unwrap_or(default))
    }

    async fn execute(&self, _cluster: &ClusterSpec, pod: &str, statement: &str) -> anyhow::Result<SqlResponse> {
        let stalled = {
            let mut state = self.lock();
            state.statements.push((pod.to_string(), statement.to_string()));
            state.stalling_statements.iter().any(|f| statement.contains(f.as_str()))
        };
        if stalled {
            std::future::pending::<()>().await;
        }

        let mut state = self.lock();
        if state.failing_statements.iter().any(|f| statement.contains(f.as_str())) {
            return Err(anyhow!("SQLActionException[statement rejected]"));
        }

        if statement.starts_with("alter cluster decommission") && state.exit_on_decommission {
            if let Some(facts) = state.pods.get_mut(pod) {
                facts.database_restarts += 1;
            }
        }

        Ok(SqlResponse {
            rowcount: 1,
            ..SqlResponse::default()
        })
    }
}

/// Node annotations map for building node facts by hand
pub fn annotations(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

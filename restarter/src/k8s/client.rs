// File: restarter/src/k8s/client.rs
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{Node, Pod};
use kube::api::{Api, DeleteParams};
use kube::config::KubeConfigOptions;
use kube::{Client, Config, ResourceExt};
use tracing::{debug, info};

use super::discovery::{self, DiscoveryResult};
use super::{BackingSpec, ControlPlane, NodeFacts, PodFacts};
use crate::constants::decommission::DATABASE_CONTAINER;
use crate::errors::ControlPlaneError;
use crate::types::ClusterSpec;

pub struct KubeControlPlane {
    client: Client,
}

impl KubeControlPlane {
    /// Connects with the named kubeconfig context, or the default configuration
    pub async fn connect(context: Option<&str>) -> Result<Self> {
        let client = match context {
            Some(context) => {
                let options = KubeConfigOptions {
                    context: Some(context.to_string()),
                    ..KubeConfigOptions::default()
                };
                let config = Config::from_kubeconfig(&options)
                    .await
                    .map_err(|e| anyhow!("Failed to load kubeconfig context {}: {}", context, e))?;
                Client::try_from(config)
                    .map_err(|e| anyhow!("Failed to create Kubernetes client: {}", e))?
            }
            None => Client::try_default()
                .await
                .map_err(|e| anyhow!("Failed to create Kubernetes client: {}", e))?,
        };

        info!("Kubernetes client initialized (context: {})", context.unwrap_or("default"));
        Ok(Self { client })
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    pub(super) fn client(&self) -> Client {
        self.client.clone()
    }
}

/// Maps 404 to `NotFound`, everything else to `Api`
pub(super) fn map_kube_error(err: kube::Error, kind: &str, name: &str, operation: &str) -> ControlPlaneError {
    match &err {
        kube::Error::Api(ae) if ae.code == 404 => ControlPlaneError::NotFound {
            kind: kind.to_string(),
            name: name.to_string(),
        },
        _ => ControlPlaneError::Api {
            operation: format!("{} {} {}", operation, kind, name),
            reason: err.to_string(),
        },
    }
}

pub fn pod_facts(pod: &Pod) -> PodFacts {
    let status = pod.status.as_ref();

    let ready = status
        .and_then(|s| s.conditions.as_ref())
        .map(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == "Ready" && c.status == "True")
        })
        .unwrap_or(false);

    let database = status
        .and_then(|s| s.container_statuses.as_ref())
        .and_then(|statuses| statuses.iter().find(|c| c.name == DATABASE_CONTAINER));

    PodFacts {
        name: pod.name_any(),
        uid: pod.metadata.uid.clone(),
        node_name: pod.spec.as_ref().and_then(|s| s.node_name.clone()),
        phase: status.and_then(|s| s.phase.clone()),
        ready,
        database_restarts: database.map(|c| c.restart_count).unwrap_or(0),
        database_running: database
            .and_then(|c| c.state.as_ref())
            .map(|state| state.running.is_some())
            .unwrap_or(false),
    }
}

pub fn node_facts(node: &Node) -> NodeFacts {
    NodeFacts {
        name: node.name_any(),
        unschedulable: node
            .spec
            .as_ref()
            .and_then(|s| s.unschedulable)
            .unwrap_or(false),
        taint_keys: node
            .spec
            .as_ref()
            .and_then(|s| s.taints.as_ref())
            .map(|taints| taints.iter().map(|t| t.key.clone()).collect())
            .unwrap_or_default(),
        annotations: node.annotations().clone(),
    }
}

#[async_trait]
impl ControlPlane for KubeControlPlane {
    async fn discover_clusters(&self, names: &[String]) -> Result<DiscoveryResult, ControlPlaneError> {
        discovery::discover(self, names).await
    }

    async fn backing_spec(&self, cluster: &ClusterSpec) -> Result<BackingSpec, ControlPlaneError> {
        let identity = cluster.identity();
        let api: Api<StatefulSet> = Api::namespaced(self.client(), &identity.namespace);
        let sts = api
            .get(&identity.statefulset_name)
            .await
            .map_err(|e| map_kube_error(e, "StatefulSet", &identity.statefulset_name, "read"))?;
        Ok(discovery::backing_spec_from(&sts))
    }

    async fn get_pod(&self, namespace: &str, pod: &str) -> Result<PodFacts, ControlPlaneError> {
        let api: Api<Pod> = Api::namespaced(self.client(), namespace);
        let found = api
            .get(pod)
            .await
            .map_err(|e| map_kube_error(e, "Pod", pod, "read"))?;
        Ok(pod_facts(&found))
    }

    async fn delete_pod(
        &self,
        namespace: &str,
        pod: &str,
        grace_period_secs: u32,
    ) -> Result<(), ControlPlaneError> {
        let api: Api<Pod> = Api::namespaced(self.client(), namespace);
        let params = DeleteParams {
            grace_period_seconds: Some(grace_period_secs),
            ..DeleteParams::default()
        };

        debug!("Deleting pod {}/{} with grace period {}s", namespace, pod, grace_period_secs);
        api.delete(pod, &params)
            .await
            .map_err(|e| map_kube_error(e, "Pod", pod, "delete"))?;
        Ok(())
    }

    async fn get_node(&self, node: &str) -> Result<NodeFacts, ControlPlaneError> {
        let api: Api<Node> = Api::all(self.client());
        let found = api
            .get(node)
            .await
            .map_err(|e| map_kube_error(e, "Node", node, "read"))?;
        Ok(node_facts(&found))
    }
}

//! Discovery of CrateDB clusters from their custom resources

use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, ListParams};
use kube::core::{DynamicObject, GroupVersionKind};
use kube::discovery::ApiResource;
use kube::ResourceExt;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use super::client::{map_kube_error, KubeControlPlane};
use super::BackingSpec;
use crate::constants::{crd, decommission::DATABASE_CONTAINER};
use crate::decommission::detect::analyze_hook;
use crate::errors::ControlPlaneError;
use crate::types::{
    ClusterIdentity, ClusterSpec, DecommissionConfig, HealthStatus, MinAvailability,
};

#[derive(Debug, Default)]
pub struct DiscoveryResult {
    pub clusters: Vec<ClusterSpec>,
    /// Per-resource problems; they do not stop discovery of other clusters
    pub errors: Vec<String>,
}

pub fn crd_resource() -> ApiResource {
    let gvk = GroupVersionKind::gvk(crd::GROUP, crd::VERSION, crd::KIND);
    ApiResource::from_gvk_with_plural(&gvk, crd::PLURAL)
}

/// `spec.cluster.name`, falling back to the resource name
pub fn cluster_name_of(obj: &DynamicObject) -> String {
    obj.data
        .pointer("/spec/cluster/name")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| obj.name_any())
}

/// Health from `status.crateDBStatus.health`, then `status.health`
pub fn health_of(obj: &DynamicObject) -> HealthStatus {
    obj.data
        .pointer("/status/crateDBStatus/health")
        .or_else(|| obj.data.pointer("/status/health"))
        .and_then(Value::as_str)
        .map(HealthStatus::parse)
        .unwrap_or(HealthStatus::Unknown)
}

pub fn statefulset_candidates(crd_name: &str, cluster_name: &str) -> Vec<String> {
    let mut candidates = vec![
        format!("crate-data-hot-{}", crd_name),
        format!("crate-{}", crd_name),
        crd_name.to_string(),
        format!("crate-{}", cluster_name),
        format!("crate-data-hot-{}", cluster_name),
    ];
    let mut seen = std::collections::HashSet::new();
    candidates.retain(|c| seen.insert(c.clone()));
    candidates
}

pub fn pod_selectors(crd_name: &str, cluster_name: &str, statefulset: &str) -> Vec<String> {
    vec![
        format!("app=crate,crate-cluster={}", crd_name),
        format!("app=crate,crate-cluster={}", cluster_name),
        format!("app=crate,statefulset={}", statefulset),
    ]
}

pub fn backing_spec_from(sts: &StatefulSet) -> BackingSpec {
    let spec = sts.spec.as_ref();
    let prestop_command = spec
        .and_then(|s| s.template.spec.as_ref())
        .and_then(|pod| pod.containers.iter().find(|c| c.name == DATABASE_CONTAINER))
        .and_then(|c| c.lifecycle.as_ref())
        .and_then(|l| l.pre_stop.as_ref())
        .and_then(|h| h.exec.as_ref())
        .and_then(|e| e.command.clone());

    BackingSpec {
        statefulset_name: sts.name_any(),
        replicas: spec.and_then(|s| s.replicas).unwrap_or(0),
        prestop_command,
    }
}

fn owned_by_statefulset(pod: &Pod, statefulset: &str) -> bool {
    pod.owner_references()
        .iter()
        .any(|o| o.kind == "StatefulSet" && o.name == statefulset)
}

/// Sorts pods by their ordinal suffix so restarts go 0, 1, 2, ...
fn sort_by_ordinal(pods: &mut [String]) {
    pods.sort_by_key(|name| {
        let ordinal = name
            .rsplit('-')
            .next()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(u32::MAX);
        (ordinal, name.clone())
    });
}

pub(super) async fn discover(
    control_plane: &KubeControlPlane,
    names: &[String],
) -> Result<DiscoveryResult, ControlPlaneError> {
    let api: Api<DynamicObject> = Api::all_with(control_plane.client(), &crd_resource());
    let resources = api.list(&ListParams::default()).await.map_err(|e| match &e {
        kube::Error::Api(ae) if ae.code == 404 => ControlPlaneError::NotFound {
            kind: "CustomResourceDefinition".to_string(),
            name: format!("{}.{}", crd::PLURAL, crd::GROUP),
        },
        kube::Error::Api(ae) if ae.code == 401 => ControlPlaneError::Api {
            operation: "list CrateDB resources".to_string(),
            reason: "authentication failed, check Kubernetes credentials".to_string(),
        },
        _ => ControlPlaneError::Api {
            operation: "list CrateDB resources".to_string(),
            reason: e.to_string(),
        },
    })?;

    let mut result = DiscoveryResult::default();

    for obj in resources {
        let crd_name = obj.name_any();
        let cluster_name = cluster_name_of(&obj);

        if !names.is_empty() && !names.contains(&cluster_name) && !names.contains(&crd_name) {
            debug!("Skipping cluster {} (not selected)", cluster_name);
            continue;
        }

        match build_cluster(control_plane, &obj, &crd_name, &cluster_name).await {
            Ok(cluster) => {
                info!(
                    "Discovered cluster {} in {} with {} pod(s), health {}",
                    cluster.name(),
                    cluster.namespace(),
                    cluster.pods().len(),
                    cluster.health()
                );
                result.clusters.push(cluster);
            }
            Err(e) => {
                let message = format!("Error processing CrateDB {}: {}", crd_name, e);
                error!("{}", message);
                result.errors.push(message);
            }
        }
    }

    for name in names {
        if !result.clusters.iter().any(|c| c.name() == name || c.identity().crd_name == *name) {
            warn!("Requested cluster {} was not found", name);
        }
    }

    info!("Found {} CrateDB cluster(s)", result.clusters.len());
    Ok(result)
}

async fn build_cluster(
    control_plane: &KubeControlPlane,
    obj: &DynamicObject,
    crd_name: &str,
    cluster_name: &str,
) -> Result<ClusterSpec, ControlPlaneError> {
    let namespace = obj.namespace().ok_or_else(|| ControlPlaneError::Api {
        operation: format!("read CrateDB {}", crd_name),
        reason: "resource has no namespace".to_string(),
    })?;

    let sts_api: Api<StatefulSet> = Api::namespaced(control_plane.client(), &namespace);
    let mut statefulset = None;
    for candidate in statefulset_candidates(crd_name, cluster_name) {
        match sts_api.get_opt(&candidate).await {
            Ok(Some(sts)) => {
                statefulset = Some(sts);
                break;
            }
            Ok(None) => continue,
            Err(e) => return Err(map_kube_error(e, "StatefulSet", &candidate, "read")),
        }
    }
    let statefulset = statefulset.ok_or_else(|| ControlPlaneError::NotFound {
        kind: "StatefulSet".to_string(),
        name: format!("for cluster {}", cluster_name),
    })?;

    let backing = backing_spec_from(&statefulset);
    let hook = analyze_hook(backing.prestop_command.as_deref());
    let pods = find_pods(control_plane, &namespace, crd_name, cluster_name, &backing.statefulset_name).await?;

    let decommission = DecommissionConfig::new(
        hook.has_managed_hook,
        hook.hook_timeout_secs,
        MinAvailability::Primaries,
    )
    .map_err(|e| ControlPlaneError::Api {
        operation: format!("build cluster {}", cluster_name),
        reason: e.to_string(),
    })?;

    ClusterSpec::new(
        ClusterIdentity {
            name: cluster_name.to_string(),
            namespace,
            crd_name: crd_name.to_string(),
            statefulset_name: backing.statefulset_name,
        },
        pods,
        decommission,
        health_of(obj),
        backing.replicas,
    )
    .map_err(|e| ControlPlaneError::Api {
        operation: format!("build cluster {}", cluster_name),
        reason: e.to_string(),
    })
}

async fn find_pods(
    control_plane: &KubeControlPlane,
    namespace: &str,
    crd_name: &str,
    cluster_name: &str,
    statefulset: &str,
) -> Result<Vec<String>, ControlPlaneError> {
    let api: Api<Pod> = Api::namespaced(control_plane.client(), namespace);

    for selector in pod_selectors(crd_name, cluster_name, statefulset) {
        match api.list(&ListParams::default().labels(&selector)).await {
            Ok(list) if !list.items.is_empty() => {
                let mut pods: Vec<String> = list.items.iter().map(|p| p.name_any()).collect();
                sort_by_ordinal(&mut pods);
                return Ok(pods);
            }
            Ok(_) => continue,
            Err(e) => {
                debug!("Pod selector {} failed in {}: {}", selector, namespace, e);
                continue;
            }
        }
    }

    // Fall back to owner references
    let list = api
        .list(&ListParams::default())
        .await
        .map_err(|e| map_kube_error(e, "Pod", namespace, "list"))?;
    let mut pods: Vec<String> = list
        .items
        .iter()
        .filter(|p| owned_by_statefulset(p, statefulset))
        .map(|p| p.name_any())
        .collect();
    sort_by_ordinal(&mut pods);
    Ok(pods)
}

//! Kubernetes client for podwatch

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ContainerState, Pod};
use kube::Api;
use kube::api::{ListParams, LogParams};

use crate::credentials::ScopedCredentials;
use crate::error::K8sError;
use podwatch_types::{ContainerStatusInfo, PodInfo, PodPhase};

/// Cluster operations needed by a monitoring run.
///
/// Credentials are passed on every call so that concurrent tasks never
/// share a client or a kubeconfig.
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// List all pods in a namespace, in the order the API returns them
    async fn list_pods(
        &self,
        credentials: &ScopedCredentials,
        namespace: &str,
    ) -> Result<Vec<PodInfo>, K8sError>;

    /// Read the last `tail_lines` lines of a pod's logs, prefixed with timestamps
    async fn read_logs(
        &self,
        credentials: &ScopedCredentials,
        namespace: &str,
        pod: &str,
        container: Option<&str>,
        tail_lines: i64,
    ) -> Result<String, K8sError>;
}

/// [`ClusterApi`] backed by the Kubernetes API server
#[derive(Clone, Debug, Default)]
pub struct KubeClusterApi;

impl KubeClusterApi {
    pub fn new() -> Self {
        Self
    }

    /// Convert a k8s Pod to PodInfo
    fn pod_to_info(pod: Pod, namespace: &str) -> PodInfo {
        let name = pod.metadata.name.unwrap_or_default();
        let mut info = PodInfo::new(name, namespace.to_string());

        if let Some(spec) = pod.spec {
            info.containers = spec.containers.into_iter().map(|c| c.name).collect();
        }

        if let Some(status) = pod.status {
            info.phase = status
                .phase
                .as_deref()
                .map(PodPhase::from)
                .unwrap_or(PodPhase::Unknown);

            if let Some(container_statuses) = status.container_statuses {
                info.container_statuses = container_statuses
                    .into_iter()
                    .map(|cs| {
                        let mut container = ContainerStatusInfo::new(cs.name);
                        container.ready = cs.ready;
                        container.restart_count = cs.restart_count;
                        container.state = describe_state(cs.state.as_ref());
                        container
                    })
                    .collect();
            }
        }

        info
    }
}

#[async_trait]
impl ClusterApi for KubeClusterApi {
    async fn list_pods(
        &self,
        credentials: &ScopedCredentials,
        namespace: &str,
    ) -> Result<Vec<PodInfo>, K8sError> {
        let client = credentials.client().await?;
        let pods: Api<Pod> = Api::namespaced(client, namespace);

        let list = pods
            .list(&ListParams::default())
            .await
            .map_err(|e| K8sError::ClusterUnreachable {
                namespace: namespace.to_string(),
                reason: e.to_string(),
            })?;

        Ok(list
            .items
            .into_iter()
            .map(|pod| Self::pod_to_info(pod, namespace))
            .collect())
    }

    async fn read_logs(
        &self,
        credentials: &ScopedCredentials,
        namespace: &str,
        pod: &str,
        container: Option<&str>,
        tail_lines: i64,
    ) -> Result<String, K8sError> {
        let client = credentials.client().await?;
        let pods: Api<Pod> = Api::namespaced(client, namespace);

        let params = LogParams {
            container: container.map(str::to_string),
            tail_lines: Some(tail_lines),
            timestamps: true,
            ..Default::default()
        };

        pods.logs(pod, &params)
            .await
            .map_err(|e| K8sError::LogRead {
                pod: pod.to_string(),
                reason: e.to_string(),
            })
    }
}

/// Describe a container state in one short phrase
fn describe_state(state: Option<&ContainerState>) -> String {
    let Some(state) = state else {
        return "unknown".to_string();
    };

    if let Some(waiting) = &state.waiting {
        return match &waiting.reason {
            Some(reason) => format!("waiting: {}", reason),
            None => "waiting".to_string(),
        };
    }

    if let Some(terminated) = &state.terminated {
        let reason = terminated.reason.as_deref().unwrap_or("Terminated");
        return format!("terminated: {} (exit {})", reason, terminated.exit_code);
    }

    if state.running.is_some() {
        return "running".to_string();
    }

    "unknown".to_string()
}

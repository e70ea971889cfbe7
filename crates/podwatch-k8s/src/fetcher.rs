use std::sync::Arc;

use futures::{StreamExt, stream};
use tracing::{debug, warn};

use crate::client::ClusterApi;
use crate::credentials::ScopedCredentials;
use crate::error::K8sError;
use podwatch_types::{PodInfo, PodLogSnapshot, PodScan};

/// Number of log lines requested per container
pub const DEFAULT_TAIL_LINES: i64 = 1000;

/// Pods read in parallel within one task
pub const DEFAULT_FETCH_CONCURRENCY: usize = 4;

/// Lists pods in a namespace and reads the tail of each pod's logs
#[derive(Clone)]
pub struct PodLogFetcher {
    api: Arc<dyn ClusterApi>,
    tail_lines: i64,
    concurrency: usize,
}

impl PodLogFetcher {
    pub fn new(api: Arc<dyn ClusterApi>) -> Self {
        Self {
            api,
            tail_lines: DEFAULT_TAIL_LINES,
            concurrency: DEFAULT_FETCH_CONCURRENCY,
        }
    }

    pub fn with_tail_lines(mut self, tail_lines: i64) -> Self {
        self.tail_lines = tail_lines;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Fetch every pod in `namespace`.
    ///
    /// Fails only if the pod listing fails. A failed log read is recorded on
    /// that pod's [`PodScan`] and the remaining pods are still read. Output
    /// follows the listing order.
    pub async fn fetch(
        &self,
        credentials: &ScopedCredentials,
        namespace: &str,
    ) -> Result<Vec<PodScan>, K8sError> {
        let pods = self
            .api
            .list_pods(credentials, namespace)
            .await
            .map_err(|e| match e {
                e @ K8sError::ClusterUnreachable { .. } => e,
                other => K8sError::ClusterUnreachable {
                    namespace: namespace.to_string(),
                    reason: other.to_string(),
                },
            })?;

        debug!(namespace, pod_count = pods.len(), "Listed pods");

        let scans: Vec<PodScan> = stream::iter(pods)
            .map(|pod| self.fetch_pod(credentials, pod))
            .buffered(self.concurrency)
            .collect()
            .await;

        Ok(scans)
    }

    async fn fetch_pod(&self, credentials: &ScopedCredentials, pod: PodInfo) -> PodScan {
        // Single-container pods don't need the container named
        let containers: Vec<Option<&str>> = if pod.containers.len() > 1 {
            pod.containers.iter().map(|c| Some(c.as_str())).collect()
        } else {
            vec![None]
        };

        let mut raw_lines = Vec::new();
        let mut container_ranges = Vec::new();
        let mut errors = Vec::new();

        for container in containers {
            match self
                .api
                .read_logs(
                    credentials,
                    &pod.namespace,
                    &pod.name,
                    container,
                    self.tail_lines,
                )
                .await
            {
                Ok(text) => {
                    let start = raw_lines.len();
                    raw_lines.extend(text.lines().map(str::to_string));
                    container_ranges.push(start..raw_lines.len());
                }
                Err(e) => {
                    warn!(
                        pod = %pod.name,
                        container = container.unwrap_or("default"),
                        error = %e,
                        "Failed to read pod logs"
                    );
                    errors.push(e.to_string());
                }
            }
        }

        let fetch_error = (!errors.is_empty()).then(|| errors.join("; "));

        PodScan {
            namespace: pod.namespace,
            snapshot: PodLogSnapshot {
                pod_name: pod.name,
                status_phase: pod.phase,
                container_statuses: pod.container_statuses,
                raw_lines,
                container_ranges,
            },
            fetch_error,
        }
    }
}

//! Monitoring run pipeline
//!
//! A tick is validated synchronously, admitted to the [`TaskRegistry`], and
//! then scanned in the background: provision credentials, fetch pod logs,
//! extract error windows, build the report, and post it to the caller.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::Semaphore;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use podwatch_k8s::{ClusterApi, ClusterCredentials, CredentialsError, PodLogFetcher};
use podwatch_logs::ReportAggregator;
use podwatch_notify::NotificationDispatcher;
use podwatch_types::{MonitorRequest, NotificationPayload, TaskStatus};

use crate::config::Config;
use crate::tasks::TaskRegistry;

/// Runs monitoring passes in the background and tracks them by task id
#[derive(Clone)]
pub struct Monitor {
    fetcher: PodLogFetcher,
    aggregator: ReportAggregator,
    dispatcher: NotificationDispatcher,
    registry: TaskRegistry,

    /// Admission limit on concurrently executing runs
    permits: Arc<Semaphore>,

    credentials_dir: PathBuf,
}

impl Monitor {
    pub fn new(
        api: Arc<dyn ClusterApi>,
        dispatcher: NotificationDispatcher,
        registry: TaskRegistry,
        config: &Config,
    ) -> Self {
        let fetcher = PodLogFetcher::new(api)
            .with_tail_lines(config.tail_lines)
            .with_concurrency(config.fetch_concurrency);

        Self {
            fetcher,
            aggregator: ReportAggregator::default(),
            dispatcher,
            registry,
            permits: Arc::new(Semaphore::new(config.max_concurrent_tasks)),
            credentials_dir: config.credentials_dir(),
        }
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    /// Stop admitting runs. Runs still waiting for a slot fail; running ones finish.
    pub fn close(&self) {
        self.permits.close();
        info!("Monitor closed to new runs");
    }

    /// Validate a tick and schedule its run.
    ///
    /// Returns immediately with the new task id; invalid settings are
    /// rejected before any task is created.
    pub fn submit(&self, request: MonitorRequest) -> Result<Uuid, CredentialsError> {
        let credentials = ClusterCredentials::from_settings(&request.settings_map())?;
        let task_id = self.registry.accept();

        info!(
            %task_id,
            namespace = %credentials.namespace,
            channel_id = %request.channel_id,
            "Tick accepted"
        );

        let monitor = self.clone();
        let run = tokio::spawn(
            async move { monitor.run(task_id, request, credentials).await }
                .instrument(info_span!("monitor", %task_id)),
        );

        // A panicking run must still reach a terminal state
        let registry = self.registry.clone();
        tokio::spawn(async move {
            if let Err(e) = run.await {
                error!(%task_id, error = %e, "Monitoring run aborted");
                registry.finish(
                    task_id,
                    TaskStatus::Failed,
                    format!("Monitoring run aborted: {}", e),
                );
            }
        });

        Ok(task_id)
    }

    async fn run(self, task_id: Uuid, request: MonitorRequest, credentials: ClusterCredentials) {
        let Ok(_permit) = self.permits.clone().acquire_owned().await else {
            self.registry.finish(
                task_id,
                TaskStatus::Failed,
                "Monitor is shutting down".to_string(),
            );
            return;
        };

        self.registry.mark_running(task_id);
        debug!("Monitoring run started");

        let (payload, scan_error) = match self.scan(&request, &credentials).await {
            Ok(payload) => (payload, None),
            Err(e) => {
                warn!(error = %format!("{:#}", e), "Monitoring run failed");
                let message = format!("Monitoring run failed: {:#}", e);
                (
                    NotificationPayload::failure(message.clone(), request.channel_id.clone()),
                    Some(message),
                )
            }
        };

        let delivery = self.dispatcher.dispatch(&request.return_url, &payload).await;
        if let Err(e) = &delivery {
            error!(error = %e, "Failed to deliver notification");
        }

        let (status, message) = match (scan_error, delivery) {
            (Some(message), _) => (TaskStatus::Failed, message),
            (None, Err(e)) => (
                TaskStatus::Failed,
                format!("Notification delivery failed: {}", e),
            ),
            (None, Ok(())) => (TaskStatus::Succeeded, payload.message),
        };

        info!(status = ?status, "Monitoring run finished");
        self.registry.finish(task_id, status, message);
    }

    /// Scan the namespace with credentials scoped to this run.
    ///
    /// The credential file is removed when this returns, on every path.
    async fn scan(
        &self,
        request: &MonitorRequest,
        credentials: &ClusterCredentials,
    ) -> Result<NotificationPayload> {
        let scoped = credentials
            .provision(&self.credentials_dir)
            .context("Failed to provision cluster credentials")?;
        debug!(path = %scoped.path().display(), "Provisioned credential file");

        let scans = self.fetcher.fetch(&scoped, &credentials.namespace).await?;
        let payload = self
            .aggregator
            .aggregate(&credentials.namespace, &request.channel_id, scans);

        Ok(payload)
    }
}

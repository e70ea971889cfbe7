use tracing::debug;

use crate::extractor::ErrorExtractor;
use podwatch_types::{NotificationPayload, PodReport, PodScan, ReportStatus};

/// Folds per-pod scans into the notification sent back to the caller
#[derive(Clone, Debug, Default)]
pub struct ReportAggregator {
    extractor: ErrorExtractor,
}

impl ReportAggregator {
    pub fn new(extractor: ErrorExtractor) -> Self {
        Self { extractor }
    }

    /// Reports for pods with error windows or a fetch failure, in scan order
    pub fn pod_reports(&self, scans: Vec<PodScan>) -> Vec<PodReport> {
        scans
            .into_iter()
            .filter_map(|scan| {
                let snapshot = scan.snapshot;
                // Windows never span two containers
                let error_windows: Vec<_> = snapshot
                    .container_lines()
                    .flat_map(|lines| self.extractor.extract(&snapshot.pod_name, lines))
                    .collect();

                if error_windows.is_empty() && scan.fetch_error.is_none() {
                    return None;
                }

                debug!(
                    pod = %snapshot.pod_name,
                    windows = error_windows.len(),
                    fetch_failed = scan.fetch_error.is_some(),
                    "Pod has errors"
                );

                Some(PodReport {
                    pod_name: snapshot.pod_name,
                    namespace: scan.namespace,
                    error_windows,
                    status_phase: snapshot.status_phase,
                    container_statuses: snapshot.container_statuses,
                    fetch_error: scan.fetch_error,
                })
            })
            .collect()
    }

    /// Build the notification payload for a completed scan
    pub fn aggregate(
        &self,
        namespace: &str,
        channel_id: &str,
        scans: Vec<PodScan>,
    ) -> NotificationPayload {
        let reports = self.pod_reports(scans);

        if reports.is_empty() {
            return NotificationPayload::new(
                ReportStatus::Success,
                format!("No errors detected in namespace '{}'", namespace),
                None,
                channel_id.to_string(),
            );
        }

        let count = reports.len();
        let message = format!(
            "Errors detected in {} pod{} in namespace '{}'",
            count,
            if count == 1 { "" } else { "s" },
            namespace
        );

        NotificationPayload::new(
            ReportStatus::Error,
            message,
            Some(reports),
            channel_id.to_string(),
        )
    }
}

//! Shared types for podwatch
//!
//! This crate contains data structures used across multiple podwatch crates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ops::Range;
use uuid::Uuid;

// ============================================================================
// Request Types
// ============================================================================

/// A single integration setting as delivered by the tick caller
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Setting {
    pub label: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default: String,
}

/// Body of a tick trigger
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MonitorRequest {
    pub channel_id: String,
    pub return_url: String,
    #[serde(default)]
    pub settings: Vec<Setting>,
}

impl MonitorRequest {
    /// Flatten settings into label -> value. Later duplicates win.
    pub fn settings_map(&self) -> HashMap<String, String> {
        self.settings
            .iter()
            .map(|s| (s.label.clone(), s.default.clone()))
            .collect()
    }
}

// ============================================================================
// Kubernetes Resource Types
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    #[default]
    Unknown,
}

impl From<&str> for PodPhase {
    fn from(s: &str) -> Self {
        match s {
            "Pending" => Self::Pending,
            "Running" => Self::Running,
            "Succeeded" => Self::Succeeded,
            "Failed" => Self::Failed,
            _ => Self::Unknown,
        }
    }
}

/// Status of one container as reported by the pod
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerStatusInfo {
    pub name: String,
    pub ready: bool,
    pub restart_count: i32,
    /// Human readable state, e.g. `running` or `waiting: CrashLoopBackOff`
    pub state: String,
}

impl ContainerStatusInfo {
    pub fn new(name: String) -> Self {
        Self {
            name,
            ready: false,
            restart_count: 0,
            state: "unknown".to_string(),
        }
    }
}

/// Pod information as seen in a namespace listing
#[derive(Clone, Debug)]
pub struct PodInfo {
    pub name: String,
    pub namespace: String,
    pub phase: PodPhase,
    /// Container names in pod spec order
    pub containers: Vec<String>,
    pub container_statuses: Vec<ContainerStatusInfo>,
}

impl PodInfo {
    pub fn new(name: String, namespace: String) -> Self {
        Self {
            name,
            namespace,
            phase: PodPhase::Unknown,
            containers: Vec::new(),
            container_statuses: Vec::new(),
        }
    }
}

/// Logs and status of a pod captured at fetch time
#[derive(Clone, Debug)]
pub struct PodLogSnapshot {
    pub pod_name: String,
    pub status_phase: PodPhase,
    pub container_statuses: Vec<ContainerStatusInfo>,
    pub raw_lines: Vec<String>,
    /// Span of `raw_lines` read from each container, in read order.
    /// Empty means all lines came from a single stream.
    pub container_ranges: Vec<Range<usize>>,
}

impl PodLogSnapshot {
    /// Log lines grouped by the container they were read from
    pub fn container_lines(&self) -> impl Iterator<Item = &[String]> {
        let whole = self
            .container_ranges
            .is_empty()
            .then(|| 0..self.raw_lines.len());

        self.container_ranges
            .iter()
            .cloned()
            .chain(whole)
            .filter_map(|range| self.raw_lines.get(range))
    }
}

/// Result of fetching one pod. `fetch_error` is set when any log read failed.
#[derive(Clone, Debug)]
pub struct PodScan {
    pub namespace: String,
    pub snapshot: PodLogSnapshot,
    pub fetch_error: Option<String>,
}

// ============================================================================
// Report Types
// ============================================================================

/// Excerpt of log lines around a single keyword match
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorWindow {
    pub pod_name: String,
    /// Timestamp of the matching line, if it carried one
    pub matched_at: Option<DateTime<Utc>>,
    /// Context lines followed by the separator line
    pub lines: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodReport {
    pub pod_name: String,
    pub namespace: String,
    pub error_windows: Vec<ErrorWindow>,
    pub status_phase: PodPhase,
    pub container_statuses: Vec<ContainerStatusInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fetch_error: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Success,
    Error,
}

/// Body posted to the caller's return URL
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub status: ReportStatus,
    pub message: String,
    pub details: Option<Vec<PodReport>>,
    pub channel_id: String,
    pub username: String,
    pub event_name: String,
}

impl NotificationPayload {
    pub const USERNAME: &'static str = "K8s Health Monitor";
    pub const EVENT_NAME: &'static str = "K8s Error Report";

    pub fn new(
        status: ReportStatus,
        message: String,
        details: Option<Vec<PodReport>>,
        channel_id: String,
    ) -> Self {
        Self {
            status,
            message,
            details,
            channel_id,
            username: Self::USERNAME.to_string(),
            event_name: Self::EVENT_NAME.to_string(),
        }
    }

    /// Error notification for a run that never produced a report
    pub fn failure(message: String, channel_id: String) -> Self {
        Self::new(ReportStatus::Error, message, None, channel_id)
    }
}

// ============================================================================
// Task Types
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Accepted,
    Running,
    Succeeded,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// Whether moving from `self` to `next` is a legal transition
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (Self::Accepted, Self::Running)
                | (Self::Accepted, Self::Failed)
                | (Self::Running, Self::Succeeded)
                | (Self::Running, Self::Failed)
        )
    }
}

/// One asynchronous monitoring run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MonitoringTask {
    pub task_id: Uuid,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Outcome summary once terminal
    pub message: Option<String>,
}

impl MonitoringTask {
    pub fn new(task_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            task_id,
            status: TaskStatus::Accepted,
            created_at: now,
            updated_at: now,
            finished_at: None,
            message: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(lines: &[&str], container_ranges: Vec<Range<usize>>) -> PodLogSnapshot {
        PodLogSnapshot {
            pod_name: "api".to_string(),
            status_phase: PodPhase::Running,
            container_statuses: Vec::new(),
            raw_lines: lines.iter().map(|s| s.to_string()).collect(),
            container_ranges,
        }
    }

    #[test]
    fn test_container_lines_split_by_range() {
        let snap = snapshot(&["a1", "a2", "b1"], vec![0..2, 2..2, 2..3]);
        let groups: Vec<&[String]> = snap.container_lines().collect();
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0], ["a1", "a2"]);
        assert!(groups[1].is_empty());
        assert_eq!(groups[2], ["b1"]);

        let single = snapshot(&["x", "y"], Vec::new());
        let groups: Vec<&[String]> = single.container_lines().collect();
        assert_eq!(groups, vec![&["x".to_string(), "y".to_string()][..]]);
    }

    #[test]
    fn test_settings_later_duplicates_win() {
        let request: MonitorRequest = serde_json::from_str(
            r#"{
                "channel_id": "c1",
                "return_url": "http://localhost/hook",
                "settings": [
                    {"label": "namespace", "type": "text", "required": true, "default": "default"},
                    {"label": "namespace", "type": "text", "required": true, "default": "payments"}
                ]
            }"#,
        )
        .unwrap();

        let map = request.settings_map();
        assert_eq!(map.len(), 1);
        assert_eq!(map["namespace"], "payments");
    }

    #[test]
    fn test_task_transitions() {
        assert!(TaskStatus::Accepted.can_transition_to(TaskStatus::Running));
        assert!(TaskStatus::Running.can_transition_to(TaskStatus::Succeeded));
        assert!(!TaskStatus::Succeeded.can_transition_to(TaskStatus::Running));
        assert!(!TaskStatus::Accepted.can_transition_to(TaskStatus::Succeeded));
        assert!(TaskStatus::Failed.is_terminal());
    }

    #[test]
    fn test_payload_serializes_lowercase_status() {
        let payload = NotificationPayload::new(
            ReportStatus::Success,
            "No errors detected".to_string(),
            None,
            "c1".to_string(),
        );
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["status"], "success");
        assert!(json["details"].is_null());
        assert_eq!(json["username"], "K8s Health Monitor");
    }
}

//! Kubernetes access for podwatch
//!
//! This crate provisions per-task cluster credentials and fetches pod
//! listings and logs. Every cluster call takes its credentials explicitly.

mod client;
mod credentials;
mod error;
mod fetcher;

pub use client::{ClusterApi, KubeClusterApi};
pub use credentials::{ClusterCredentials, ScopedCredentials, settings};
pub use error::{CredentialsError, K8sError};
pub use fetcher::{DEFAULT_FETCH_CONCURRENCY, DEFAULT_TAIL_LINES, PodLogFetcher};

// Re-export types that are used in our public API
pub use podwatch_types::{ContainerStatusInfo, PodInfo, PodLogSnapshot, PodPhase, PodScan};

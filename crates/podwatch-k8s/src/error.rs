use kube::config::KubeconfigError;
use thiserror::Error;

/// Errors raised while turning request settings into a credential file
#[derive(Debug, Error)]
pub enum CredentialsError {
    #[error("missing required settings: {}", fields.join(", "))]
    MissingSettings { fields: Vec<String> },

    #[error("ca_cert is not valid base64: {0}")]
    InvalidCaCert(#[from] base64::DecodeError),

    #[error("rendered kubeconfig is invalid: {0}")]
    Kubeconfig(#[from] KubeconfigError),

    #[error("failed to write credential file: {0}")]
    Io(#[from] std::io::Error),
}

impl CredentialsError {
    /// Names of the absent settings, empty for other variants
    pub fn missing_fields(&self) -> &[String] {
        match self {
            Self::MissingSettings { fields } => fields,
            _ => &[],
        }
    }
}

/// Errors raised by cluster calls
#[derive(Debug, Error)]
pub enum K8sError {
    #[error("failed to load credential file: {0}")]
    Credentials(#[from] KubeconfigError),

    #[error("failed to build cluster client: {0}")]
    Client(#[from] kube::Error),

    #[error("cluster unreachable while listing pods in '{namespace}': {reason}")]
    ClusterUnreachable { namespace: String, reason: String },

    #[error("failed to read logs for pod '{pod}': {reason}")]
    LogRead { pod: String, reason: String },
}

//! Per-task cluster credentials
//!
//! Settings from a tick are validated into [`ClusterCredentials`], which are
//! then rendered into a kubeconfig written to a uniquely named file. The file
//! lives exactly as long as the [`ScopedCredentials`] handle that owns it.

use std::collections::HashMap;
use std::fmt;
use std::io::{self, Write};
use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use kube::config::{KubeConfigOptions, Kubeconfig};
use tempfile::NamedTempFile;
use tokio::sync::OnceCell;

use crate::error::{CredentialsError, K8sError};

/// Setting labels understood by the provisioner
pub mod settings {
    pub const CLUSTER_NAME: &str = "cluster_name";
    pub const API_SERVER: &str = "api_server";
    pub const API_SERVER_PORT: &str = "api_server_port";
    pub const CA_CERT: &str = "ca_cert";
    pub const SERVICE_ACCOUNT_TOKEN: &str = "service_account_token";
    pub const NAMESPACE: &str = "namespace";
    pub const USER_NAME: &str = "user_name";
    pub const CONTEXT_NAME: &str = "context_name";
}

/// Required labels, in the order they are reported when missing
const REQUIRED_SETTINGS: [&str; 5] = [
    settings::CLUSTER_NAME,
    settings::API_SERVER,
    settings::CA_CERT,
    settings::SERVICE_ACCOUNT_TOKEN,
    settings::NAMESPACE,
];

const DEFAULT_API_SERVER_PORT: &str = "6443";
const DEFAULT_USER_NAME: &str = "podwatch";
const FILE_PREFIX: &str = "podwatch-kubeconfig-";

/// Validated cluster access settings for one task
#[derive(Clone, PartialEq, Eq)]
pub struct ClusterCredentials {
    pub server_url: String,
    pub ca_cert: String,
    token: String,
    pub cluster_name: String,
    pub user_name: String,
    pub context_name: String,
    pub namespace: String,
}

impl ClusterCredentials {
    /// Build credentials from flattened tick settings.
    ///
    /// Every absent required field is reported, not just the first one.
    pub fn from_settings(values: &HashMap<String, String>) -> Result<Self, CredentialsError> {
        let value = |label: &str| {
            values
                .get(label)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
        };

        let missing: Vec<String> = REQUIRED_SETTINGS
            .into_iter()
            .filter(|label| value(*label).is_none())
            .map(|label| label.to_string())
            .collect();

        if !missing.is_empty() {
            return Err(CredentialsError::MissingSettings { fields: missing });
        }

        let required = |label: &str| value(label).unwrap_or_default().to_string();

        // Pasted bundles are often wrapped
        let ca_cert: String = required(settings::CA_CERT)
            .split_whitespace()
            .collect();
        STANDARD.decode(&ca_cert)?;

        let cluster_name = required(settings::CLUSTER_NAME);
        let context_name = value(settings::CONTEXT_NAME)
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}-podwatch", cluster_name));

        Ok(Self {
            server_url: server_url(
                value(settings::API_SERVER).unwrap_or_default(),
                value(settings::API_SERVER_PORT),
            ),
            ca_cert,
            token: required(settings::SERVICE_ACCOUNT_TOKEN),
            cluster_name,
            user_name: value(settings::USER_NAME)
                .unwrap_or(DEFAULT_USER_NAME)
                .to_string(),
            context_name,
            namespace: required(settings::NAMESPACE),
        })
    }

    /// Render the kubeconfig document for these credentials
    pub fn render_kubeconfig(&self) -> String {
        format!(
            "apiVersion: v1
kind: Config
clusters:
- name: {cluster}
  cluster:
    server: {server}
    certificate-authority-data: {ca}
users:
- name: {user}
  user:
    token: {token}
contexts:
- name: {context}
  context:
    cluster: {cluster}
    user: {user}
    namespace: {namespace}
current-context: {context}
",
            cluster = quote(&self.cluster_name),
            server = quote(&self.server_url),
            ca = quote(&self.ca_cert),
            user = quote(&self.user_name),
            token = quote(&self.token),
            context = quote(&self.context_name),
            namespace = quote(&self.namespace),
        )
    }

    /// Write the kubeconfig to a new uniquely named file under `dir`
    pub fn provision(&self, dir: &Path) -> Result<ScopedCredentials, CredentialsError> {
        self.provision_with(dir, |file, document| {
            file.write_all(document)?;
            file.as_file().sync_all()
        })
    }

    fn provision_with<F>(
        &self,
        dir: &Path,
        write: F,
    ) -> Result<ScopedCredentials, CredentialsError>
    where
        F: FnOnce(&mut NamedTempFile, &[u8]) -> io::Result<()>,
    {
        let document = self.render_kubeconfig();
        Kubeconfig::from_yaml(&document)?;

        let mut file = tempfile::Builder::new()
            .prefix(FILE_PREFIX)
            .suffix(".yaml")
            .tempfile_in(dir)?;

        // The handle owns the path from here on; an early return removes it
        write(&mut file, document.as_bytes())?;

        Ok(ScopedCredentials {
            file,
            context_name: self.context_name.clone(),
            namespace: self.namespace.clone(),
            client: OnceCell::new(),
        })
    }
}

impl fmt::Debug for ClusterCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterCredentials")
            .field("server_url", &self.server_url)
            .field("cluster_name", &self.cluster_name)
            .field("user_name", &self.user_name)
            .field("context_name", &self.context_name)
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

/// Handle to a task's credential file. Dropping it deletes the file.
pub struct ScopedCredentials {
    file: NamedTempFile,
    context_name: String,
    namespace: String,
    client: OnceCell<kube::Client>,
}

impl ScopedCredentials {
    /// Path of the credential file
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn context_name(&self) -> &str {
        &self.context_name
    }

    /// Client bound to this task's credential file, built on first use
    pub async fn client(&self) -> Result<kube::Client, K8sError> {
        let client = self
            .client
            .get_or_try_init(|| async {
                let kubeconfig = Kubeconfig::read_from(self.file.path())?;
                let config = kube::Config::from_custom_kubeconfig(
                    kubeconfig,
                    &KubeConfigOptions {
                        context: Some(self.context_name.clone()),
                        ..Default::default()
                    },
                )
                .await?;
                Ok::<_, K8sError>(kube::Client::try_from(config)?)
            })
            .await?;

        Ok(client.clone())
    }
}

impl fmt::Debug for ScopedCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedCredentials")
            .field("path", &self.file.path())
            .field("context_name", &self.context_name)
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

/// Normalize the API server setting into a URL
fn server_url(address: &str, port: Option<&str>) -> String {
    if address.starts_with("https://") || address.starts_with("http://") {
        return address.trim_end_matches('/').to_string();
    }

    let has_port = address
        .rsplit_once(':')
        .is_some_and(|(_, p)| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()));

    if has_port {
        format!("https://{}", address)
    } else {
        format!(
            "https://{}:{}",
            address,
            port.unwrap_or(DEFAULT_API_SERVER_PORT)
        )
    }
}

/// Quote a value as a double-quoted YAML scalar (JSON strings are valid YAML)
fn quote(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

#[cfg(test)]
pub(crate) fn test_credentials(dir: &Path) -> ScopedCredentials {
    let values = valid_settings();
    ClusterCredentials::from_settings(&values)
        .unwrap()
        .provision(dir)
        .unwrap()
}

#[cfg(test)]
pub(crate) fn valid_settings() -> HashMap<String, String> {
    [
        (settings::CLUSTER_NAME, "prod"),
        (settings::API_SERVER, "10.0.0.1"),
        (settings::CA_CERT, "Y2VydGlmaWNhdGU="),
        (settings::SERVICE_ACCOUNT_TOKEN, "secret-token"),
        (settings::NAMESPACE, "default"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_are_all_named() {
        let mut values = valid_settings();
        values.remove(settings::SERVICE_ACCOUNT_TOKEN);
        values.insert(settings::CA_CERT.to_string(), "   ".to_string());

        let err = ClusterCredentials::from_settings(&values).unwrap_err();
        assert_eq!(
            err.missing_fields(),
            &["ca_cert".to_string(), "service_account_token".to_string()]
        );
        assert_eq!(
            err.to_string(),
            "missing required settings: ca_cert, service_account_token"
        );
    }

    #[test]
    fn test_invalid_ca_cert_rejected() {
        let mut values = valid_settings();
        values.insert(settings::CA_CERT.to_string(), "not base64!".to_string());

        let err = ClusterCredentials::from_settings(&values).unwrap_err();
        assert!(matches!(err, CredentialsError::InvalidCaCert(_)));
    }

    #[test]
    fn test_server_url_normalization() {
        assert_eq!(server_url("10.0.0.1", None), "https://10.0.0.1:6443");
        assert_eq!(server_url("10.0.0.1", Some("443")), "https://10.0.0.1:443");
        assert_eq!(server_url("10.0.0.1:8443", Some("443")), "https://10.0.0.1:8443");
        assert_eq!(
            server_url("https://k8s.example.com/", None),
            "https://k8s.example.com"
        );
    }

    #[test]
    fn test_defaults_for_optional_names() {
        let creds = ClusterCredentials::from_settings(&valid_settings()).unwrap();
        assert_eq!(creds.user_name, "podwatch");
        assert_eq!(creds.context_name, "prod-podwatch");
    }

    #[test]
    fn test_debug_redacts_token() {
        let creds = ClusterCredentials::from_settings(&valid_settings()).unwrap();
        let debug = format!("{:?}", creds);
        assert!(!debug.contains("secret-token"));
    }

    #[test]
    fn test_rendered_kubeconfig_parses() {
        let mut values = valid_settings();
        values.insert(settings::NAMESPACE.to_string(), "team: \"a\"".to_string());
        let creds = ClusterCredentials::from_settings(&values).unwrap();

        let kubeconfig = Kubeconfig::from_yaml(&creds.render_kubeconfig()).unwrap();
        assert_eq!(kubeconfig.current_context.as_deref(), Some("prod-podwatch"));
        let context = kubeconfig.contexts[0].context.as_ref().unwrap();
        assert_eq!(context.namespace.as_deref(), Some("team: \"a\""));
        let cluster = kubeconfig.clusters[0].cluster.as_ref().unwrap();
        assert_eq!(cluster.server.as_deref(), Some("https://10.0.0.1:6443"));
    }

    #[test]
    fn test_provision_writes_unique_files_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let creds = ClusterCredentials::from_settings(&valid_settings()).unwrap();

        let first = creds.provision(dir.path()).unwrap();
        let second = creds.provision(dir.path()).unwrap();
        assert_ne!(first.path(), second.path());
        assert!(first.path().starts_with(dir.path()));

        let content = std::fs::read_to_string(first.path()).unwrap();
        assert!(content.contains("secret-token"));

        let (first_path, second_path) = (first.path().to_owned(), second.path().to_owned());
        drop(first);
        assert!(!first_path.exists());
        assert!(second_path.exists());
        drop(second);
        assert!(!second_path.exists());
    }

    #[test]
    fn test_failed_write_removes_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let creds = ClusterCredentials::from_settings(&valid_settings()).unwrap();
        let mut partial = None;

        let err = creds
            .provision_with(dir.path(), |file, document| {
                file.write_all(&document[..10])?;
                partial = Some(file.path().to_owned());
                Err(io::Error::other("disk full"))
            })
            .unwrap_err();

        assert!(matches!(err, CredentialsError::Io(_)));
        let partial = partial.unwrap();
        assert!(partial.starts_with(dir.path()));
        assert!(!partial.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_provision_into_missing_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        let creds = ClusterCredentials::from_settings(&valid_settings()).unwrap();

        let err = creds.provision(&dir.path().join("absent")).unwrap_err();
        assert!(matches!(err, CredentialsError::Io(_)));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}

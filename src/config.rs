//! Service configuration
//!
//! Built-in defaults, overridden by an optional TOML file, overridden by
//! command line flags or their `PODWATCH_*` environment variables.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use serde::Deserialize;

use podwatch_k8s::{DEFAULT_FETCH_CONCURRENCY, DEFAULT_TAIL_LINES};

/// Podwatch - scans Kubernetes pod logs for errors and reports them to a webhook
#[derive(Parser, Debug, Default)]
#[command(name = "podwatch")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to a TOML config file
    #[arg(long, env = "PODWATCH_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Address the HTTP server listens on
    #[arg(long, env = "PODWATCH_LISTEN")]
    pub listen: Option<SocketAddr>,

    /// Timeout for the outbound notification, in seconds
    #[arg(long, env = "PODWATCH_NOTIFY_TIMEOUT_SECS")]
    pub notify_timeout_secs: Option<u64>,

    /// Monitoring runs allowed to execute at once
    #[arg(long, env = "PODWATCH_MAX_CONCURRENT_TASKS")]
    pub max_concurrent_tasks: Option<usize>,

    /// Number of log lines fetched per container
    #[arg(long, env = "PODWATCH_TAIL_LINES")]
    pub tail_lines: Option<i64>,

    /// Directory for per-task credential files (defaults to the system temp dir)
    #[arg(long, env = "PODWATCH_CREDENTIALS_DIR", value_name = "DIR")]
    pub credentials_dir: Option<PathBuf>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub listen: SocketAddr,
    pub notify_timeout_secs: u64,
    pub max_concurrent_tasks: usize,
    /// Pods read in parallel within one run
    pub fetch_concurrency: usize,
    pub tail_lines: i64,
    /// How long a finished task stays queryable if nobody reads it
    pub task_retention_secs: u64,
    pub credentials_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 8000)),
            notify_timeout_secs: 30,
            max_concurrent_tasks: 16,
            fetch_concurrency: DEFAULT_FETCH_CONCURRENCY,
            tail_lines: DEFAULT_TAIL_LINES,
            task_retention_secs: 300,
            credentials_dir: None,
        }
    }
}

impl Config {
    /// Resolve the effective configuration for `args`
    pub fn load(args: &Args) -> Result<Self> {
        let mut config = match &args.config {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        if let Some(listen) = args.listen {
            config.listen = listen;
        }
        if let Some(secs) = args.notify_timeout_secs {
            config.notify_timeout_secs = secs;
        }
        if let Some(max) = args.max_concurrent_tasks {
            config.max_concurrent_tasks = max;
        }
        if let Some(lines) = args.tail_lines {
            config.tail_lines = lines;
        }
        if let Some(dir) = &args.credentials_dir {
            config.credentials_dir = Some(dir.clone());
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.notify_timeout_secs == 0 {
            bail!("notify_timeout_secs must be greater than zero");
        }
        if self.max_concurrent_tasks == 0 {
            bail!("max_concurrent_tasks must be greater than zero");
        }
        if self.fetch_concurrency == 0 {
            bail!("fetch_concurrency must be greater than zero");
        }
        if self.tail_lines <= 0 {
            bail!("tail_lines must be greater than zero");
        }
        Ok(())
    }

    pub fn notify_timeout(&self) -> Duration {
        Duration::from_secs(self.notify_timeout_secs)
    }

    pub fn task_retention(&self) -> Duration {
        Duration::from_secs(self.task_retention_secs)
    }

    /// Where credential files are written; never the working directory
    pub fn credentials_dir(&self) -> PathBuf {
        self.credentials_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }
}

//! Endpoint list loaders.

use std::path::PathBuf;

use anyhow::Context;
use async_trait::async_trait;

/// Loads the endpoints currently considered live.
#[async_trait]
pub trait MembershipLoader: Send + Sync {
    /// Load the endpoint list.
    ///
    /// `Ok(None)` means no data is available and the membership should stay as it is;
    /// `Ok(Some(vec![]))` means there are currently no backends.
    async fn load(&self) -> anyhow::Result<Option<Vec<String>>>;
}

/// A fixed endpoint list.
#[derive(Debug, Clone, Default)]
pub struct StaticLoader {
    endpoints: Vec<String>,
}

impl StaticLoader {
    /// Always report `endpoints`.
    pub fn new(endpoints: Vec<String>) -> Self {
        Self { endpoints }
    }
}

#[async_trait]
impl MembershipLoader for StaticLoader {
    async fn load(&self) -> anyhow::Result<Option<Vec<String>>> {
        Ok(Some(self.endpoints.clone()))
    }
}

/// Re-reads an endpoint list file on every load.
///
/// One endpoint per line; blank lines and `#` comments are ignored. See
/// [`expand_port_template`] for `host:*` entries.
#[derive(Debug, Clone)]
pub struct FileLoader {
    path: PathBuf,
    remote_port: Option<u16>,
}

impl FileLoader {
    /// Load from `path`, expanding `*` ports with `remote_port`.
    pub fn new(path: impl Into<PathBuf>, remote_port: Option<u16>) -> Self {
        Self {
            path: path.into(),
            remote_port,
        }
    }
}

#[async_trait]
impl MembershipLoader for FileLoader {
    async fn load(&self) -> anyhow::Result<Option<Vec<String>>> {
        let contents = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("failed to read endpoints from {}", self.path.display()))?;
        Ok(Some(parse_endpoint_list(&contents, self.remote_port)))
    }
}

/// Parse an endpoint list file.
pub fn parse_endpoint_list(contents: &str, remote_port: Option<u16>) -> Vec<String> {
    contents
        .lines()
        .map(|line| line.split_once('#').map_or(line, |(entry, _)| entry).trim())
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| expand_port_template(entry, remote_port))
        .collect()
}

/// Resolve a `host:*` entry to `host:<remote_port>`.
///
/// Entries with a `*` port advertise every port of the host; without a remote port to
/// forward to they are dropped. Other entries are returned unchanged.
pub fn expand_port_template(entry: &str, remote_port: Option<u16>) -> Option<String> {
    match entry.strip_suffix(":*") {
        Some(host) => remote_port.map(|port| format!("{host}:{port}")),
        None => Some(entry.to_string()),
    }
}

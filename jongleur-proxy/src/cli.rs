//! Command-line interface.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use jongleur_proxy::membership::{expand_port_template, FileLoader, MembershipLoader, StaticLoader};
use jongleur_proxy::{ceph_response_patcher, ListenAddr, ProxyConfig, Result};

/// Jongleur - round-robin TCP load balancing proxy
#[derive(Parser, Debug)]
#[command(name = "jongleur", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Proxy modes.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the load balancing proxy
    Proxy(ProxyArgs),
    /// Run the proxy in front of Ceph monitors, advertising the proxy as the monitor
    Ceph(ProxyArgs),
}

impl Command {
    /// Subcommand name, used to print its help on usage errors.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Proxy(_) => "proxy",
            Self::Ceph(_) => "ceph",
        }
    }

    /// Arguments shared by every mode.
    pub fn args(&self) -> &ProxyArgs {
        match self {
            Self::Proxy(args) | Self::Ceph(args) => args,
        }
    }

    /// Build the proxy configuration for this mode.
    pub fn config(&self) -> Result<ProxyConfig> {
        let config = self.args().config()?;
        match self {
            Self::Proxy(_) => Ok(config),
            Self::Ceph(_) => {
                let patcher = ceph_response_patcher(&config.listen)?;
                Ok(config.with_response_patcher(patcher))
            }
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ProxyArgs {
    /// Listen address in form "[<network>@]address"; network can be "tcp", "tcp4", "tcp6"
    /// or "unix"; default network is "tcp"
    #[arg(long)]
    pub listen: String,

    /// Service instances list synchronization period in seconds
    #[arg(long, default_value_t = 10)]
    pub period: u64,

    /// Enable verbose per-connection output
    #[arg(long)]
    pub verbose: bool,

    /// Backend endpoint "<host>:<port>"; repeat for every instance
    #[arg(
        long = "endpoint",
        value_name = "ADDR",
        required_unless_present = "endpoints_file",
        conflicts_with = "endpoints_file"
    )]
    pub endpoints: Vec<String>,

    /// File listing one endpoint per line, re-read on every synchronization
    #[arg(long, value_name = "PATH")]
    pub endpoints_file: Option<PathBuf>,

    /// Remote port used for endpoints advertised as "<host>:*"; such endpoints are ignored
    /// when not set
    #[arg(long)]
    pub remote_port: Option<u16>,
}

impl ProxyArgs {
    /// Build the base configuration.
    pub fn config(&self) -> Result<ProxyConfig> {
        let listen: ListenAddr = self.listen.parse()?;
        let config = ProxyConfig::new(listen, Duration::from_secs(self.period))
            .with_verbose(self.verbose);
        config.validate()?;
        Ok(config)
    }

    /// The membership loader selected by the arguments.
    pub fn loader(&self) -> Arc<dyn MembershipLoader> {
        match &self.endpoints_file {
            Some(path) => Arc::new(FileLoader::new(path, self.remote_port)),
            None => Arc::new(StaticLoader::new(
                self.endpoints
                    .iter()
                    .filter_map(|entry| expand_port_template(entry, self.remote_port))
                    .collect(),
            )),
        }
    }
}

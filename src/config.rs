// CLASSIFICATION: COMMUNITY
// Filename: config.rs v0.1
// Author: Lukas Bower
// Date Modified: 2027-09-02

//! Runtime configuration for a DSM peer.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Lowest port an unprivileged peer may use.
pub const MIN_PORT: u16 = 1024;

/// Environment variable consulted when no peer host is given on the command line.
pub const PEER_HOST_ENV: &str = "COHDSM_PEER_HOST";

const DEFAULT_PEER_HOST: &str = "127.0.0.1";

/// How first-touch page population is served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FaultMode {
    /// Intercept missing-page faults with userfaultfd and install zero pages.
    #[default]
    Userfaultfd,
    /// Leave zero fill to the kernel's anonymous memory handling.
    Kernel,
}

impl fmt::Display for FaultMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultMode::Userfaultfd => f.write_str("userfaultfd"),
            FaultMode::Kernel => f.write_str("kernel"),
        }
    }
}

impl FromStr for FaultMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "userfaultfd" | "uffd" => Ok(FaultMode::Userfaultfd),
            "kernel" => Ok(FaultMode::Kernel),
            other => Err(ConfigError::UnknownFaultMode(other.to_string())),
        }
    }
}

/// Errors produced while validating a [`DsmConfig`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("port {0} is privileged; use a port between 1024 and 65535")]
    PrivilegedPort(u16),
    #[error("listen and peer ports must differ (both {0})")]
    SamePort(u16),
    #[error("page count must be greater than 0")]
    ZeroPages,
    #[error("unknown fault mode {0:?}")]
    UnknownFaultMode(String),
}

/// Settings for one peer process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DsmConfig {
    /// Port this peer listens on.
    pub listen_port: u16,
    /// Port the other peer listens on.
    pub peer_port: u16,
    /// Host the other peer runs on.
    pub peer_host: String,
    /// Pages to allocate when this peer ends up as initiator.
    /// `None` means ask the operator.
    pub pages: Option<usize>,
    /// Page population strategy.
    pub fault_mode: FaultMode,
}

impl DsmConfig {
    /// Build a config for the given port pair, taking the peer host from
    /// `COHDSM_PEER_HOST` when it is set.
    pub fn new(listen_port: u16, peer_port: u16) -> Self {
        Self {
            listen_port,
            peer_port,
            peer_host: std::env::var(PEER_HOST_ENV)
                .unwrap_or_else(|_| DEFAULT_PEER_HOST.to_string()),
            pages: None,
            fault_mode: FaultMode::default(),
        }
    }

    /// Check port and page-count constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for port in [self.listen_port, self.peer_port] {
            if port < MIN_PORT {
                return Err(ConfigError::PrivilegedPort(port));
            }
        }
        if self.listen_port == self.peer_port {
            return Err(ConfigError::SamePort(self.listen_port));
        }
        if self.pages == Some(0) {
            return Err(ConfigError::ZeroPages);
        }
        Ok(())
    }
}

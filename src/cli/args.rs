// CLASSIFICATION: COMMUNITY
// Filename: args.rs v0.2
// Author: Lukas Bower
// Date Modified: 2027-09-02

use clap::Parser;

use crate::config::{DsmConfig, FaultMode};

/// Command line for one DSM peer.
#[derive(Parser, Debug)]
#[command(
    name = "cohdsm",
    about = "Two-peer distributed shared memory with MSI page coherence",
    version = "0.1"
)]
pub struct Cli {
    /// Port this peer listens on.
    pub listen_port: u16,
    /// Port the other peer listens on.
    pub peer_port: u16,
    /// Host the other peer runs on [env: COHDSM_PEER_HOST, default 127.0.0.1].
    #[arg(long, value_name = "HOST")]
    pub peer_host: Option<String>,
    /// Pages to allocate if this peer becomes the initiator. Prompted for when absent.
    #[arg(long, value_name = "N")]
    pub pages: Option<usize>,
    /// How first-touch pages are populated.
    #[arg(long, value_name = "MODE", default_value_t = FaultMode::Userfaultfd)]
    pub fault_mode: FaultMode,
}

impl Cli {
    /// Runtime configuration described by these arguments.
    pub fn config(&self) -> DsmConfig {
        let mut config = DsmConfig::new(self.listen_port, self.peer_port);
        if let Some(host) = &self.peer_host {
            config.peer_host = host.clone();
        }
        config.pages = self.pages;
        config.fault_mode = self.fault_mode;
        config
    }
}

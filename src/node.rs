// CLASSIFICATION: COMMUNITY
// Filename: node.rs v0.1
// Author: Lukas Bower
// Date Modified: 2027-09-02

//! Process context for one DSM peer.
//!
//! A [`Node`] owns everything a running peer needs: the elected role, the
//! shared region, the coherence engine and the background workers that
//! serve inbound messages and page faults. Worker failures are reported on
//! a channel instead of aborting, so the binary decides how to exit.

use std::sync::atomic::Ordering;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;

use log::{error, info};

use crate::coherence::CoherenceEngine;
use crate::config::{ConfigError, DsmConfig, FaultMode};
use crate::error::{DsmError, DsmResult};
use crate::memory::{self, FaultCounter, FaultEngine, Region};
use crate::net::{ChannelReader, ChannelWriter, Rendezvous, Role};

/// A running peer.
pub struct Node {
    role: Role,
    engine: Arc<CoherenceEngine>,
    faults: Option<FaultCounter>,
    failures: Option<Receiver<DsmError>>,
}

impl Node {
    /// Validate `config`, meet the peer, share the region and start the
    /// workers. `ask_pages` is only called when this peer becomes the
    /// initiator and `config.pages` is unset.
    pub fn bootstrap<F>(config: &DsmConfig, ask_pages: F) -> DsmResult<Self>
    where
        F: FnOnce() -> DsmResult<usize>,
    {
        config.validate()?;
        let rendezvous = Rendezvous::establish(config)?;
        Self::start(rendezvous, config, ask_pages)
    }

    /// Start a peer over an already established rendezvous.
    pub fn start<F>(rendezvous: Rendezvous, config: &DsmConfig, ask_pages: F) -> DsmResult<Self>
    where
        F: FnOnce() -> DsmResult<usize>,
    {
        let role = rendezvous.role();
        let (mut reader, writer) = rendezvous.into_channel(memory::page_size());
        let region = share_region(role, config, ask_pages, &mut reader, &writer)?;
        let region = Arc::new(region);

        let (report, failures) = mpsc::channel();
        let faults = match config.fault_mode {
            FaultMode::Userfaultfd => {
                let engine = FaultEngine::register(&region)?;
                let resolved = engine.resolved();
                spawn_worker("fault-engine", report.clone(), move || engine.run())?;
                Some(resolved)
            }
            FaultMode::Kernel => None,
        };

        let engine = Arc::new(CoherenceEngine::new(
            Arc::clone(&region),
            Arc::new(writer),
            role,
        ));
        let serving = Arc::clone(&engine);
        spawn_worker("dsm-receiver", report, move || serving.serve(&mut reader))?;

        info!(
            "{role} ready: {} pages of {} bytes, fault mode {}",
            region.page_count(),
            region.page_size(),
            config.fault_mode
        );
        Ok(Self {
            role,
            engine,
            faults,
            failures: Some(failures),
        })
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn engine(&self) -> &Arc<CoherenceEngine> {
        &self.engine
    }

    /// Faults resolved so far, or `None` when the kernel populates pages.
    pub fn faults_resolved(&self) -> Option<u64> {
        self.faults
            .as_ref()
            .map(|counter| counter.load(Ordering::Relaxed))
    }

    /// Hand over the worker failure channel. Returns `None` after the first
    /// call.
    pub fn take_failures(&mut self) -> Option<Receiver<DsmError>> {
        self.failures.take()
    }
}

fn share_region<F>(
    role: Role,
    config: &DsmConfig,
    ask_pages: F,
    reader: &mut ChannelReader,
    writer: &ChannelWriter,
) -> DsmResult<Region>
where
    F: FnOnce() -> DsmResult<usize>,
{
    match role {
        Role::Initiator => {
            let pages = match config.pages {
                Some(pages) => pages,
                None => ask_pages()?,
            };
            if pages == 0 {
                return Err(ConfigError::ZeroPages.into());
            }
            let region = Region::allocate(pages)?;
            writer.send_descriptor(&region.descriptor())?;
            Ok(region)
        }
        Role::Responder => {
            let descriptor = reader.recv_descriptor()?;
            Ok(Region::map_at(&descriptor)?)
        }
    }
}

fn spawn_worker<F, E>(name: &str, report: Sender<DsmError>, work: F) -> DsmResult<()>
where
    F: FnOnce() -> Result<(), E> + Send + 'static,
    E: Into<DsmError>,
{
    let label = name.to_string();
    thread::Builder::new().name(label.clone()).spawn(move || {
        if let Err(err) = work() {
            let err = err.into();
            error!("{label} stopped: {err}");
            // The receiving side may already be gone during shutdown.
            let _ = report.send(err);
        }
    })?;
    Ok(())
}

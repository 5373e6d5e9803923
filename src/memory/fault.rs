// CLASSIFICATION: COMMUNITY
// Filename: fault.rs v0.1
// Author: Lukas Bower
// Date Modified: 2027-09-02

//! First-touch page population through userfaultfd.
//!
//! The engine registers the whole region in missing-page mode and serves
//! each fault with a zero page covering the faulting page. It never looks at
//! coherence state; it only guarantees the page exists.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::{debug, info};
use thiserror::Error;

use crate::memory::region::Region;

/// Errors raised by the fault engine. All are fatal.
#[derive(Debug, Error)]
pub enum FaultError {
    #[cfg(target_os = "linux")]
    #[error("userfaultfd setup failed: {0}")]
    Setup(#[source] userfaultfd::Error),
    #[cfg(target_os = "linux")]
    #[error("reading fault notification failed: {0}")]
    Read(#[source] userfaultfd::Error),
    #[cfg(target_os = "linux")]
    #[error("installing zero page at {address:#x} failed: {source}")]
    Zeropage {
        address: usize,
        source: userfaultfd::Error,
    },
    #[error("unexpected fault notification: {0}")]
    UnexpectedEvent(String),
    #[error("fault at {0:#x} lies outside the registered region")]
    OutsideRegion(usize),
    #[error("userfaultfd is not available on this platform")]
    Unsupported,
}

/// Number of faults the engine has resolved, shared with observers.
pub type FaultCounter = Arc<AtomicU64>;

#[cfg(target_os = "linux")]
pub use linux::FaultEngine;

#[cfg(not(target_os = "linux"))]
pub use unsupported::FaultEngine;

#[cfg(target_os = "linux")]
mod linux {
    use super::*;

    use libc::c_void;
    use userfaultfd::{Event, Uffd, UffdBuilder};

    /// Missing-page handler for one region.
    #[derive(Debug)]
    pub struct FaultEngine {
        uffd: Uffd,
        start: usize,
        length: usize,
        page_size: usize,
        resolved: FaultCounter,
    }

    impl FaultEngine {
        /// Create a userfaultfd and register `region` with it.
        pub fn register(region: &Region) -> Result<Self, FaultError> {
            let uffd = UffdBuilder::new()
                .close_on_exec(true)
                .non_blocking(false)
                .user_mode_only(true)
                .create()
                .map_err(FaultError::Setup)?;
            uffd.register(region.base_address() as *mut c_void, region.len())
                .map_err(FaultError::Setup)?;
            info!(
                "registered {} bytes at {:#x} for missing-page faults",
                region.len(),
                region.base_address()
            );
            Ok(Self {
                uffd,
                start: region.base_address(),
                length: region.len(),
                page_size: region.page_size(),
                resolved: Arc::new(AtomicU64::new(0)),
            })
        }

        /// Counter of resolved faults.
        pub fn resolved(&self) -> FaultCounter {
            Arc::clone(&self.resolved)
        }

        /// Serve faults until an error occurs.
        pub fn run(self) -> Result<(), FaultError> {
            loop {
                match self.uffd.read_event().map_err(FaultError::Read)? {
                    Some(Event::Pagefault { addr, .. }) => self.resolve(addr as usize)?,
                    Some(other) => return Err(FaultError::UnexpectedEvent(format!("{other:?}"))),
                    None => continue,
                }
            }
        }

        fn resolve(&self, address: usize) -> Result<(), FaultError> {
            if address < self.start || address >= self.start + self.length {
                return Err(FaultError::OutsideRegion(address));
            }
            let page_start = address & !(self.page_size - 1);
            debug!("page fault at {address:#x}; zero-filling {page_start:#x}");
            // SAFETY: the page lies inside the registered range and is
            // currently missing; the kernel rejects already-present pages.
            let result = unsafe {
                self.uffd
                    .zeropage(page_start as *mut c_void, self.page_size, true)
            };
            match result {
                Ok(_) => {}
                // Two threads faulting on the same page: the first fill
                // won, so only the waiters need waking.
                Err(userfaultfd::Error::ZeropageFailed(errno)) if errno as i32 == libc::EEXIST => {
                    self.uffd
                        .wake(page_start as *mut c_void, self.page_size)
                        .map_err(|source| FaultError::Zeropage {
                            address: page_start,
                            source,
                        })?;
                }
                Err(source) => {
                    return Err(FaultError::Zeropage {
                        address: page_start,
                        source,
                    })
                }
            }
            self.resolved.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
    }
}

#[cfg(not(target_os = "linux"))]
mod unsupported {
    use super::*;

    /// Placeholder engine for platforms without userfaultfd.
    #[derive(Debug)]
    pub struct FaultEngine;

    impl FaultEngine {
        pub fn register(_region: &Region) -> Result<Self, FaultError> {
            Err(FaultError::Unsupported)
        }

        pub fn resolved(&self) -> FaultCounter {
            Arc::new(AtomicU64::new(0))
        }

        pub fn run(self) -> Result<(), FaultError> {
            Err(FaultError::Unsupported)
        }
    }
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::*;
    use std::thread;

    fn engine_for(region: &Region) -> Option<FaultEngine> {
        match FaultEngine::register(region) {
            Ok(engine) => Some(engine),
            Err(err) => {
                eprintln!("skipping userfaultfd test: {err}");
                None
            }
        }
    }

    #[test]
    fn first_touch_is_zero_filled() {
        let region = Region::allocate(2).unwrap();
        let Some(engine) = engine_for(&region) else {
            return;
        };
        let resolved = engine.resolved();
        thread::spawn(move || engine.run());

        assert!(region.read_page(0).unwrap().iter().all(|b| *b == 0));
        region.write_page(1, b"virgin").unwrap();
        assert_eq!(&region.read_page(1).unwrap()[..6], b"virgin");
        assert!(resolved.load(Ordering::Relaxed) >= 2);
    }

    #[test]
    fn discarded_page_faults_again() {
        let region = Region::allocate(1).unwrap();
        let Some(engine) = engine_for(&region) else {
            return;
        };
        let resolved = engine.resolved();
        thread::spawn(move || engine.run());

        region.write_page(0, b"stale").unwrap();
        let before = resolved.load(Ordering::Relaxed);
        region.discard_page(0).unwrap();
        assert!(region.read_page(0).unwrap().iter().all(|b| *b == 0));
        assert!(resolved.load(Ordering::Relaxed) > before);
    }
}

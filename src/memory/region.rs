// CLASSIFICATION: COMMUNITY
// Filename: region.rs v0.1
// Author: Lukas Bower
// Date Modified: 2027-09-02

//! Page-aligned shared region backed by private anonymous memory.
//!
//! The initiator lets the kernel pick an address; the responder asks for the
//! exact address carried in the [`RegionDescriptor`] so that both processes
//! see the region at the same virtual address. Page contents are accessed
//! only through raw copies; callers order those copies by completing the
//! page's coherence transition first.

use std::io;
use std::ptr::{self, NonNull};

use libc::{c_int, c_void};
use log::{debug, info};
use thiserror::Error;

/// Encoded descriptor size: address then length, both u64 little-endian.
pub const DESCRIPTOR_LEN: usize = 16;

#[cfg(target_os = "linux")]
const FIXED_ADDRESS_FLAG: c_int = libc::MAP_FIXED_NOREPLACE;
#[cfg(not(target_os = "linux"))]
const FIXED_ADDRESS_FLAG: c_int = 0;

/// Errors raised while mapping or touching the region. All are fatal.
#[derive(Debug, Error)]
pub enum RegionError {
    #[error("region must span at least one page")]
    Empty,
    #[error("{pages} pages do not fit in the address space")]
    TooLarge { pages: usize },
    #[error("region length {length} is not a multiple of the {page_size}-byte page size")]
    Misaligned { length: usize, page_size: usize },
    #[error("mmap of {length} bytes failed: {source}")]
    Map { length: usize, source: io::Error },
    #[error("kernel placed the region at {actual:#x} instead of {requested:#x}")]
    AddressMismatch { requested: usize, actual: usize },
    #[error("page {page} is outside the {pages}-page region")]
    PageOutOfRange { page: usize, pages: usize },
    #[error("discarding page {page} failed: {source}")]
    Discard { page: usize, source: io::Error },
}

/// Platform page size in bytes.
pub fn page_size() -> usize {
    // SAFETY: sysconf has no memory-safety preconditions.
    let raw = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    usize::try_from(raw).ok().filter(|size| *size > 0).unwrap_or(4096)
}

/// Address and length of the region as sent from initiator to responder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionDescriptor {
    pub address: usize,
    pub length: usize,
}

impl RegionDescriptor {
    #[must_use]
    pub fn encode(&self) -> [u8; DESCRIPTOR_LEN] {
        let mut out = [0u8; DESCRIPTOR_LEN];
        out[..8].copy_from_slice(&(self.address as u64).to_le_bytes());
        out[8..].copy_from_slice(&(self.length as u64).to_le_bytes());
        out
    }

    #[must_use]
    pub fn decode(bytes: &[u8; DESCRIPTOR_LEN]) -> Self {
        let mut address = [0u8; 8];
        let mut length = [0u8; 8];
        address.copy_from_slice(&bytes[..8]);
        length.copy_from_slice(&bytes[8..]);
        Self {
            address: u64::from_le_bytes(address) as usize,
            length: u64::from_le_bytes(length) as usize,
        }
    }
}

/// A mapped shared region. Unmapped on drop.
#[derive(Debug)]
pub struct Region {
    base: NonNull<u8>,
    length: usize,
    page_size: usize,
}

// SAFETY: the region is a plain block of process memory. Every access goes
// through raw copies bounded by `length`, never through Rust references.
unsafe impl Send for Region {}
unsafe impl Sync for Region {}

impl Region {
    /// Map a fresh region of `pages` pages wherever the kernel likes.
    pub fn allocate(pages: usize) -> Result<Self, RegionError> {
        if pages == 0 {
            return Err(RegionError::Empty);
        }
        let page_size = page_size();
        let length = pages
            .checked_mul(page_size)
            .ok_or(RegionError::TooLarge { pages })?;
        let region = Self::map(ptr::null_mut(), length, 0, page_size)?;
        info!(
            "allocated {pages} pages at {:#x} ({length} bytes)",
            region.base_address()
        );
        Ok(region)
    }

    /// Map a region at exactly the address named by `descriptor`.
    pub fn map_at(descriptor: &RegionDescriptor) -> Result<Self, RegionError> {
        let page_size = page_size();
        if descriptor.length == 0 {
            return Err(RegionError::Empty);
        }
        if descriptor.length % page_size != 0 {
            return Err(RegionError::Misaligned {
                length: descriptor.length,
                page_size,
            });
        }
        let region = Self::map(
            descriptor.address as *mut c_void,
            descriptor.length,
            FIXED_ADDRESS_FLAG,
            page_size,
        )?;
        if region.base_address() != descriptor.address {
            // Dropping `region` unmaps the misplaced mapping.
            return Err(RegionError::AddressMismatch {
                requested: descriptor.address,
                actual: region.base_address(),
            });
        }
        info!(
            "mapped {} pages at {:#x}",
            region.page_count(),
            descriptor.address
        );
        Ok(region)
    }

    fn map(
        hint: *mut c_void,
        length: usize,
        extra_flags: c_int,
        page_size: usize,
    ) -> Result<Self, RegionError> {
        // SAFETY: anonymous private mapping; no file descriptor or existing
        // memory is involved. MAP_FIXED_NOREPLACE never clobbers a mapping.
        let addr = unsafe {
            libc::mmap(
                hint,
                length,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | extra_flags,
                -1,
                0,
            )
        };
        if addr == libc::MAP_FAILED {
            return Err(RegionError::Map {
                length,
                source: io::Error::last_os_error(),
            });
        }
        let base = NonNull::new(addr.cast::<u8>()).ok_or(RegionError::Map {
            length,
            source: io::Error::from(io::ErrorKind::AddrNotAvailable),
        })?;
        Ok(Self {
            base,
            length,
            page_size,
        })
    }

    /// Descriptor to hand to the responder.
    pub fn descriptor(&self) -> RegionDescriptor {
        RegionDescriptor {
            address: self.base_address(),
            length: self.length,
        }
    }

    pub fn base_address(&self) -> usize {
        self.base.as_ptr() as usize
    }

    pub fn len(&self) -> usize {
        self.length
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn page_count(&self) -> usize {
        self.length / self.page_size
    }

    /// Copy out a whole page.
    pub fn read_page(&self, page: usize) -> Result<Vec<u8>, RegionError> {
        let start = self.page_ptr(page)?;
        let mut out = vec![0u8; self.page_size];
        // SAFETY: `start` points at a mapped page of `page_size` bytes.
        unsafe { ptr::copy_nonoverlapping(start, out.as_mut_ptr(), self.page_size) };
        Ok(out)
    }

    /// Overwrite a whole page: `bytes` is truncated to one page and the
    /// remainder is zero-filled.
    pub fn write_page(&self, page: usize, bytes: &[u8]) -> Result<(), RegionError> {
        let start = self.page_ptr(page)?;
        let len = bytes.len().min(self.page_size);
        // SAFETY: both ranges lie inside the mapped page and do not overlap
        // caller memory.
        unsafe {
            ptr::copy_nonoverlapping(bytes.as_ptr(), start, len);
            ptr::write_bytes(start.add(len), 0, self.page_size - len);
        }
        Ok(())
    }

    /// Drop the physical copy of a page. The next touch sees a zero page.
    pub fn discard_page(&self, page: usize) -> Result<(), RegionError> {
        let start = self.page_ptr(page)?;
        // SAFETY: the range is one whole page inside our own mapping.
        let rc = unsafe { libc::madvise(start.cast::<c_void>(), self.page_size, libc::MADV_DONTNEED) };
        if rc != 0 {
            return Err(RegionError::Discard {
                page,
                source: io::Error::last_os_error(),
            });
        }
        debug!("discarded page {page}");
        Ok(())
    }

    fn page_ptr(&self, page: usize) -> Result<*mut u8, RegionError> {
        let pages = self.page_count();
        if page >= pages {
            return Err(RegionError::PageOutOfRange { page, pages });
        }
        // SAFETY: page < page_count keeps the offset inside the mapping.
        Ok(unsafe { self.base.as_ptr().add(page * self.page_size) })
    }
}

impl Drop for Region {
    fn drop(&mut self) {
        // SAFETY: `base`/`length` describe a mapping this value created.
        unsafe {
            libc::munmap(self.base.as_ptr().cast::<c_void>(), self.length);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_layout() {
        let descriptor = RegionDescriptor {
            address: 0x1234_5000,
            length: 3 * 4096,
        };
        let raw = descriptor.encode();
        assert_eq!(&raw[..8], &0x1234_5000u64.to_le_bytes());
        assert_eq!(&raw[8..], &(3u64 * 4096).to_le_bytes());
        assert_eq!(RegionDescriptor::decode(&raw), descriptor);
    }

    #[test]
    fn fresh_pages_read_as_zero() {
        let region = Region::allocate(2).unwrap();
        assert_eq!(region.page_count(), 2);
        assert_eq!(region.len(), 2 * region.page_size());
        assert!(region.read_page(1).unwrap().iter().all(|b| *b == 0));
    }

    #[test]
    fn write_pads_and_discard_zeroes() {
        let region = Region::allocate(1).unwrap();
        region.write_page(0, &vec![0xAA; region.page_size()]).unwrap();
        region.write_page(0, b"hi").unwrap();
        let page = region.read_page(0).unwrap();
        assert_eq!(&page[..2], b"hi");
        assert!(page[2..].iter().all(|b| *b == 0));

        region.discard_page(0).unwrap();
        assert!(region.read_page(0).unwrap().iter().all(|b| *b == 0));
    }

    #[test]
    fn out_of_range_pages_are_rejected() {
        let region = Region::allocate(1).unwrap();
        assert!(matches!(
            region.read_page(1),
            Err(RegionError::PageOutOfRange { page: 1, pages: 1 })
        ));
    }

    #[test]
    fn zero_pages_rejected() {
        assert!(matches!(Region::allocate(0), Err(RegionError::Empty)));
    }

    #[test]
    fn oversized_page_count_rejected() {
        let pages = usize::MAX / 2;
        assert!(matches!(
            Region::allocate(pages),
            Err(RegionError::TooLarge { pages: p }) if p == pages
        ));
    }
}

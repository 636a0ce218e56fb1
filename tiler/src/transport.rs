//! The narrow contract to the kernel driver collaborator, kept deliberately
//! out of this crate's scope. `KernelChannel` is the injected interface;
//! `SimChannel` is a userspace stand-in used by tests and the CLI harness in
//! lieu of the real TILER device node.
//!
//! Implementors do not need their own internal locking — `TilerManager`
//! holds a single global mutex for the whole duration of every public
//! operation, so at most one RPC is ever in flight from this crate.

use crate::config::TilerConfig;
use crate::types::{PhysAddr, PixelFormat, SsPtr};
use std::collections::HashMap;

/// A descriptor for one block of a composite (possibly multi-block)
/// allocation request.
#[derive(Debug, Clone, Copy)]
pub struct AllocDescriptor {
    pub pixel_format: PixelFormat,
    pub width: u32,
    pub height: u32,
    pub stride: u32,
}

/// What the kernel handed back for one block of a composite allocation.
#[derive(Debug, Clone, Copy)]
pub struct AllocGrant {
    pub ptr: SsPtr,
    pub reserved: PhysAddr,
    pub stride: u32,
}

/// The security-zone field is accepted, stored and forwarded verbatim; it
/// has no defined semantics in this crate — interpreting it is entirely up
/// to the kernel driver collaborator on the other end of the channel.
pub type SecurityZone = u16;

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum KernelError {
    #[error("driver refused the request: {0}")]
    Refused(String),
    #[error("pointer is not known to the driver")]
    UnknownPointer,
    #[error("container is out of space")]
    OutOfSpace,
}

/// The driver's four core RPCs, plus an aperture query used to resolve a
/// container's native stride and a best-effort virtual-to-physical
/// fallback for pointers this crate never allocated.
pub trait KernelChannel: Send {
    /// Allocates one or more contiguous tiled sub-blocks in a single
    /// composite request (the multi-block case) or a single tiled block
    /// (the ordinary case).
    fn alloc_2d(
        &mut self,
        descriptors: &[AllocDescriptor],
        sec_zone: SecurityZone,
    ) -> Result<Vec<AllocGrant>, KernelError>;

    fn alloc_1d(&mut self, length: u64, sec_zone: SecurityZone) -> Result<AllocGrant, KernelError>;

    /// Maps an externally supplied page list into a page-mode container
    /// region. `physical_pages` are page-aligned physical addresses in
    /// order, obtained by the caller via the injected [`crate::page::PageSource`].
    fn map_1d(&mut self, physical_pages: &[u64], length: u64) -> Result<AllocGrant, KernelError>;

    fn free(&mut self, ptr: SsPtr) -> Result<(), KernelError>;

    fn unmap(&mut self, ptr: SsPtr) -> Result<(), KernelError>;

    /// Range layout of the TILER apertures in physical space, used to
    /// resolve the native stride for a given pixel format. Returned as
    /// `(format, start, end_exclusive)` triples; `format == None` describes
    /// the page-mode aperture.
    fn apertures(&self) -> Vec<(Option<PixelFormat>, u64, u64)>;

    /// Best-effort virtual-to-physical translation for a pointer this crate
    /// never allocated, delegated entirely to the driver; returning 0 is a
    /// valid "unknown" answer.
    fn host_virt_to_phys(&self, _ptr: SsPtr) -> PhysAddr {
        PhysAddr::NULL
    }
}

/// A deterministic bump-pointer simulation of the TILER container, used by
/// the CLI harness and the test suite. Every allocation is placed past the
/// previous one in both system space and tile-container (physical) space,
/// so no two live grants ever overlap.
pub struct SimChannel {
    cfg: TilerConfig,
    next_sys: u64,
    next_phys: u64,
    live: HashMap<usize, u64>,
    /// Physical ranges handed out so far, tagged by the view they were
    /// placed under; `None` means page mode. Freed ranges are left in place
    /// since the simulator never reclaims tile-container space, so a stale
    /// entry can never be mistaken for a different live format.
    apertures: Vec<(Option<PixelFormat>, u64, u64)>,
}

impl SimChannel {
    pub fn new(cfg: TilerConfig) -> Self {
        SimChannel {
            cfg,
            // Start above 0 so SsPtr::NULL/PhysAddr::NULL are never handed out.
            next_sys: cfg.page_size as u64,
            next_phys: cfg.page_size as u64,
            live: HashMap::new(),
            apertures: Vec::new(),
        }
    }

    fn place(&mut self, size: u64, format: Option<PixelFormat>) -> (SsPtr, PhysAddr) {
        let page = self.cfg.page_size as u64;
        let aligned = size.div_ceil(page) * page;
        let ptr = SsPtr(self.next_sys as usize);
        let phys = self.next_phys;
        self.next_sys += aligned;
        self.next_phys += aligned;
        self.live.insert(ptr.0, aligned);
        self.apertures.push((format, phys, phys + aligned));
        (ptr, PhysAddr(phys))
    }
}

impl KernelChannel for SimChannel {
    fn alloc_2d(
        &mut self,
        descriptors: &[AllocDescriptor],
        _sec_zone: SecurityZone,
    ) -> Result<Vec<AllocGrant>, KernelError> {
        if descriptors.is_empty() {
            return Err(KernelError::Refused("empty descriptor list".into()));
        }
        let mut grants = Vec::with_capacity(descriptors.len());
        for d in descriptors {
            let size = d.stride as u64 * d.height as u64;
            let (ptr, reserved) = self.place(size, Some(d.pixel_format));
            grants.push(AllocGrant {
                ptr,
                reserved,
                stride: d.stride,
            });
        }
        Ok(grants)
    }

    fn alloc_1d(&mut self, length: u64, _sec_zone: SecurityZone) -> Result<AllocGrant, KernelError> {
        let (ptr, reserved) = self.place(length, None);
        Ok(AllocGrant {
            ptr,
            reserved,
            stride: self.cfg.page_size,
        })
    }

    fn map_1d(&mut self, physical_pages: &[u64], length: u64) -> Result<AllocGrant, KernelError> {
        if physical_pages.is_empty() {
            return Err(KernelError::Refused("empty page list".into()));
        }
        // The reservation handle identifies this mapping's slot in the
        // TILER container's PAT, not the client's own page-frame numbers
        // (those were only needed to program the PAT); it lands in the
        // page-mode aperture exactly like a 1D allocation grant.
        let (ptr, reserved) = self.place(length, None);
        Ok(AllocGrant {
            ptr,
            reserved,
            stride: self.cfg.page_size,
        })
    }

    fn free(&mut self, ptr: SsPtr) -> Result<(), KernelError> {
        self.live.remove(&ptr.0).map(|_| ()).ok_or(KernelError::UnknownPointer)
    }

    fn unmap(&mut self, ptr: SsPtr) -> Result<(), KernelError> {
        self.free(ptr)
    }

    fn apertures(&self) -> Vec<(Option<PixelFormat>, u64, u64)> {
        self.apertures.clone()
    }
}

//! Core data model: pixel formats, the request/response `MemBlock` record,
//! and the internal per-buffer bookkeeping the registry keeps.

use std::fmt;

/// One of {PAGE (1D linear), P8, P16, P32 (tiled)}.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Page,
    P8,
    P16,
    P32,
}

impl PixelFormat {
    pub fn is_tiled(self) -> bool {
        !matches!(self, PixelFormat::Page)
    }
}

/// Opaque system-space pointer. Its numeric value is the registry key; it is
/// never dereferenced by this crate — the value only becomes a real address
/// once a client maps it themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SsPtr(pub(crate) usize);

impl SsPtr {
    pub const NULL: SsPtr = SsPtr(0);

    /// Builds a handle from a raw numeric value, for collaborators (the CLI
    /// harness, OS-specific glue) that only have a plain address in hand.
    pub fn from_addr(addr: usize) -> SsPtr {
        SsPtr(addr)
    }

    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Raw numeric value, for clients that need to hand it to other system
    /// APIs (e.g. to compute an offset into a `mmap`ed region).
    pub fn addr(self) -> usize {
        self.0
    }

    pub(crate) fn offset(self, bytes: usize) -> SsPtr {
        SsPtr(self.0 + bytes)
    }
}

impl fmt::Display for SsPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Opaque physical reservation handle returned by the kernel driver, used
/// only for translation queries and never dereferenced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PhysAddr(pub(crate) u64);

impl PhysAddr {
    pub const NULL: PhysAddr = PhysAddr(0);

    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    pub fn addr(self) -> u64 {
        self.0
    }

    pub(crate) fn offset(self, bytes: u64) -> PhysAddr {
        PhysAddr(self.0 + bytes)
    }
}

/// Tiler-space (33-bit) address, produced only by [`crate::manager::TilerManager::to_tiler_space`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TilerSpacePtr(pub(crate) u64);

impl TilerSpacePtr {
    pub fn addr(self) -> u64 {
        self.0
    }
}

/// A single request/response block: the caller fills in the geometry
/// fields and the allocator fills in the rest on success.
#[derive(Debug, Clone, Copy)]
pub struct MemBlock {
    pub pixel_format: PixelFormat,
    /// Pixels, only meaningful for tiled formats.
    pub width: u32,
    /// Pixels, only meaningful for tiled formats.
    pub height: u32,
    /// Bytes, only meaningful for `PAGE`.
    pub length: u64,
    /// Bytes; 0 means "let the allocator pick one". On success, overwritten
    /// with the kernel-authoritative stride.
    pub stride: u32,
    /// Output for alloc, input for map: the system-space pointer. `None`
    /// until a successful call fills it in; cleared back to `None` on any
    /// failure.
    pub ptr: Option<SsPtr>,
    /// Output only: the opaque physical reservation, never dereferenced.
    pub reserved: Option<PhysAddr>,
}

impl MemBlock {
    pub fn page(length: u64) -> Self {
        MemBlock {
            pixel_format: PixelFormat::Page,
            width: 0,
            height: 0,
            length,
            stride: 0,
            ptr: None,
            reserved: None,
        }
    }

    pub fn tiled(pixel_format: PixelFormat, width: u32, height: u32) -> Self {
        debug_assert!(pixel_format.is_tiled());
        MemBlock {
            pixel_format,
            width,
            height,
            length: 0,
            stride: 0,
            ptr: None,
            reserved: None,
        }
    }

    pub fn with_stride(mut self, stride: u32) -> Self {
        self.stride = stride;
        self
    }
}

/// Result of a successful sub-block allocation/mapping: the geometry
/// merged with what the kernel actually handed back.
#[derive(Debug, Clone, Copy)]
pub struct SubBlock {
    pub block: MemBlock,
    pub ptr: SsPtr,
    pub reserved: PhysAddr,
    /// Stride as reported by the kernel; authoritative over `block.stride`.
    pub stride: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferKind {
    Alloc1D,
    Alloc2D,
    Map1D,
}

/// One live buffer group.
#[derive(Debug, Clone)]
pub struct BufferRecord {
    pub kind: BufferKind,
    /// Sub-block 0's ptr is always `head()`; further sub-blocks are the
    /// NV12-style luma/chroma group members. Only the head identifies the
    /// group to clients — the other entries exist so Free/UnMap can reject
    /// them by identity rather than silently tearing down half a buffer.
    pub blocks: Vec<SubBlock>,
    /// For `Map1D`, the client-owned pointer the mapping was derived from,
    /// kept only for diagnostics — never written to.
    pub source_ptr: Option<SsPtr>,
}

impl BufferRecord {
    pub fn head(&self) -> SsPtr {
        self.blocks[0].ptr
    }

    pub fn sub_block_ptrs(&self) -> impl Iterator<Item = SsPtr> + '_ {
        self.blocks.iter().skip(1).map(|b| b.ptr)
    }

    /// Finds the sub-block whose system-space range contains `p`, used to
    /// resolve a virtual-to-physical translation. `p` need not be a
    /// sub-block's own `ptr` — any address within its span resolves, since
    /// a client may legitimately ask about an offset partway into a buffer.
    pub fn find_in_range(&self, p: SsPtr) -> Option<&SubBlock> {
        self.blocks
            .iter()
            .find(|b| p.0 >= b.ptr.0 && p.0 < b.ptr.0 + b.size_bytes() as usize)
    }
}

impl SubBlock {
    /// Span of this sub-block in system space, in bytes.
    pub fn size_bytes(&self) -> u64 {
        match self.block.pixel_format {
            PixelFormat::Page => self.block.length,
            _ => self.stride as u64 * self.block.height as u64,
        }
    }
}

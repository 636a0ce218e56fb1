//! The allocator/mapper and query/translate public contract. `TilerManager`
//! owns a single mutex guarding the kernel channel and buffer registry
//! together so that "kernel says success" and "registry records it" are
//! always atomic with respect to every other public operation.

use crate::config::TilerConfig;
use crate::error::{IdentityError, TilerError, ValidationError};
use crate::geometry::{self, view_stride};
use crate::page::PageSource;
use crate::registry::BufferRegistry;
use crate::space::{self, Mirroring, RefCorner, Rotation};
use crate::transport::{AllocDescriptor, KernelChannel, KernelError, SecurityZone};
use crate::types::{BufferKind, BufferRecord, MemBlock, PhysAddr, PixelFormat, SsPtr, SubBlock, TilerSpacePtr};
use std::sync::Mutex;

struct Inner {
    registry: BufferRegistry,
    channel: Box<dyn KernelChannel>,
}

/// The public entry point. One instance per process talks to one kernel
/// channel; every method acquires the same internal mutex for its entire
/// duration, giving total ordering across threads.
pub struct TilerManager {
    cfg: TilerConfig,
    inner: Mutex<Inner>,
}

impl TilerManager {
    /// Opens the device channel (`tilerInit` in the original API) and
    /// starts an empty registry.
    pub fn init(cfg: TilerConfig, channel: Box<dyn KernelChannel>) -> Self {
        tracing::debug!(page_size = cfg.page_size, "tiler manager initialized");
        TilerManager {
            cfg,
            inner: Mutex::new(Inner {
                registry: BufferRegistry::new(),
                channel,
            }),
        }
    }

    pub fn config(&self) -> TilerConfig {
        self.cfg
    }

    /// Closes the device channel (`tilerDeinit`), after checking the
    /// registry is empty. Returns the number of buffers that leaked, if
    /// any.
    pub fn shutdown(self) -> usize {
        let leaked = self.inner.lock().unwrap().registry.len();
        if leaked > 0 {
            tracing::warn!(leaked, "tiler manager shut down with live buffers");
        } else {
            tracing::debug!("tiler manager shut down cleanly");
        }
        leaked
    }

    // ---- Allocator/Mapper --------------------------------------------------

    /// `Alloc(blocks[1..N], sec_zone)`. On success every `block.ptr` /
    /// `block.reserved` (and `.stride` for tiled blocks) is filled in and
    /// `Ok(head_ptr)` is returned. On any failure no kernel or registry
    /// state is left behind and every `block.ptr` is cleared.
    pub fn alloc(&self, blocks: &mut [MemBlock], sec_zone: SecurityZone) -> Result<SsPtr, TilerError> {
        if blocks.is_empty() {
            return Err(ValidationError::EmptyBlockList.into());
        }
        for block in blocks.iter_mut() {
            geometry::validate_block(block, &self.cfg)?;
            geometry::canonicalize(block, &self.cfg);
        }

        let mut guard = self.inner.lock().unwrap();
        let head = if blocks.len() == 1 && blocks[0].pixel_format == PixelFormat::Page {
            self.alloc_1d(&mut guard, blocks)?
        } else if blocks.len() == 1 {
            self.alloc_2d_single(&mut guard, blocks)?
        } else {
            self.alloc_2d_composite(&mut guard, blocks, sec_zone)?
        };
        tracing::debug!(?head, blocks = blocks.len(), "alloc succeeded");
        Ok(head)
    }

    fn alloc_1d(&self, guard: &mut Inner, blocks: &mut [MemBlock]) -> Result<SsPtr, TilerError> {
        let grant = guard
            .channel
            .alloc_1d(blocks[0].length, 0)
            .map_err(|e| kernel_err(e))?;
        let sub = SubBlock {
            block: blocks[0],
            ptr: grant.ptr,
            reserved: grant.reserved,
            stride: grant.stride,
        };
        let record = BufferRecord {
            kind: BufferKind::Alloc1D,
            blocks: vec![sub],
            source_ptr: None,
        };
        self.commit(guard, record, blocks, &[grant.ptr])
    }

    fn alloc_2d_single(&self, guard: &mut Inner, blocks: &mut [MemBlock]) -> Result<SsPtr, TilerError> {
        let d = AllocDescriptor {
            pixel_format: blocks[0].pixel_format,
            width: blocks[0].width,
            height: blocks[0].height,
            stride: blocks[0].stride,
        };
        let mut grants = guard.channel.alloc_2d(&[d], 0).map_err(kernel_err)?;
        let grant = grants.remove(0);
        let sub = SubBlock {
            block: blocks[0],
            ptr: grant.ptr,
            reserved: grant.reserved,
            stride: grant.stride,
        };
        let record = BufferRecord {
            kind: BufferKind::Alloc2D,
            blocks: vec![sub],
            source_ptr: None,
        };
        self.commit(guard, record, blocks, &[grant.ptr])
    }

    /// N>=2: every block must be tiled and they pack contiguously in system
    /// space (the NV12-style luma/chroma case).
    fn alloc_2d_composite(
        &self,
        guard: &mut Inner,
        blocks: &mut [MemBlock],
        sec_zone: SecurityZone,
    ) -> Result<SsPtr, TilerError> {
        if blocks.iter().any(|b| !b.pixel_format.is_tiled()) {
            return Err(ValidationError::MultiBlockPageNotSupported.into());
        }
        let descriptors: Vec<AllocDescriptor> = blocks
            .iter()
            .map(|b| AllocDescriptor {
                pixel_format: b.pixel_format,
                width: b.width,
                height: b.height,
                stride: b.stride,
            })
            .collect();
        let grants = guard.channel.alloc_2d(&descriptors, sec_zone).map_err(kernel_err)?;

        let mut subs = Vec::with_capacity(blocks.len());
        for (block, grant) in blocks.iter().zip(grants.iter()) {
            subs.push(SubBlock {
                block: *block,
                ptr: grant.ptr,
                reserved: grant.reserved,
                stride: grant.stride,
            });
        }
        let ptrs: Vec<SsPtr> = subs.iter().map(|s| s.ptr).collect();
        let record = BufferRecord {
            kind: BufferKind::Alloc2D,
            blocks: subs,
            source_ptr: None,
        };
        self.commit(guard, record, blocks, &ptrs)
    }

    /// Shared tail of every alloc path: write geometry back into the
    /// caller's blocks, insert into the registry, and roll back every
    /// kernel grant already made if insertion fails.
    fn commit(
        &self,
        guard: &mut Inner,
        record: BufferRecord,
        blocks: &mut [MemBlock],
        granted_ptrs: &[SsPtr],
    ) -> Result<SsPtr, TilerError> {
        let head = record.head();
        for (block, sub) in blocks.iter_mut().zip(record.blocks.iter()) {
            block.stride = sub.stride;
            block.ptr = Some(sub.ptr);
            block.reserved = Some(sub.reserved);
        }
        match guard.registry.insert(record) {
            Ok(()) => Ok(head),
            Err(msg) => {
                for ptr in granted_ptrs {
                    let _ = guard.channel.free(*ptr);
                }
                for block in blocks.iter_mut() {
                    block.stride = 0;
                    block.ptr = None;
                    block.reserved = None;
                }
                Err(TilerError::Registry(msg.to_string()))
            }
        }
    }

    /// `Map(block, 1)`. Only single-block `PAGE` is permitted. `block.ptr`
    /// is the client's page-aligned input pointer on entry; on success it
    /// is overwritten with the new tiler-container mapping, distinct from
    /// the client's original pointer, which remains valid and owned by the
    /// client. The page list is derived from `source` via the injected
    /// [`PageSource`] and never retained past this call.
    pub fn map<P: PageSource>(&self, block: &mut MemBlock, source: &P) -> Result<SsPtr, TilerError> {
        if block.pixel_format != PixelFormat::Page {
            return Err(ValidationError::MapRequiresSinglePageBlock.into());
        }
        let client_ptr = block.ptr.ok_or(ValidationError::UnalignedMapPointer)?;
        if client_ptr.is_null() || client_ptr.addr() % self.cfg.page_size as usize != 0 {
            return Err(ValidationError::UnalignedMapPointer.into());
        }
        if block.length == 0 || block.length % self.cfg.page_size as u64 != 0 {
            return Err(ValidationError::MapLengthNotPageMultiple.into());
        }

        let pages = source.collect_physical();
        if pages.is_empty() {
            return Err(ValidationError::MapLengthNotPageMultiple.into());
        }

        let mut guard = self.inner.lock().unwrap();
        let grant = guard.channel.map_1d(&pages, block.length).map_err(kernel_err)?;
        let sub = SubBlock {
            block: *block,
            ptr: grant.ptr,
            reserved: grant.reserved,
            stride: grant.stride,
        };
        let record = BufferRecord {
            kind: BufferKind::Map1D,
            blocks: vec![sub],
            source_ptr: Some(client_ptr),
        };
        let ptrs = [grant.ptr];
        let head = self.commit(&mut guard, record, std::slice::from_mut(block), &ptrs)?;
        tracing::debug!(?head, "map succeeded");
        Ok(head)
    }

    /// `Free(ptr)`. Fails without side effects if `ptr` is unknown, a
    /// sub-block, or heads a `Map1D` buffer.
    pub fn free(&self, ptr: SsPtr) -> Result<(), TilerError> {
        self.teardown(ptr, "free")
    }

    /// `UnMap(ptr)`. Symmetrical to `free`, but requires `Map1D`.
    pub fn unmap(&self, ptr: SsPtr) -> Result<(), TilerError> {
        self.teardown(ptr, "unmap")
    }

    /// Shared teardown for `free`/`unmap`: each rejects the buffers the
    /// other is responsible for.
    fn teardown(&self, ptr: SsPtr, op: &'static str) -> Result<(), TilerError> {
        if ptr.is_null() {
            return Err(IdentityError::NullPointer.into());
        }
        let mut guard = self.inner.lock().unwrap();
        if guard.registry.is_sub_block(ptr) {
            return Err(IdentityError::SubBlock.into());
        }
        let Some(record) = guard.registry.lookup(ptr) else {
            return Err(IdentityError::Unknown.into());
        };
        let is_map = record.kind == BufferKind::Map1D;
        let wrong_kind = (op == "free" && is_map) || (op == "unmap" && !is_map);
        if wrong_kind {
            return Err(IdentityError::WrongKind.into());
        }

        // Kernel frees never fail for a ptr this registry still knows about:
        // the driver guarantees failures only occur for already-unknown
        // pointers. Still remove the record regardless, to avoid a stranded
        // entry.
        let record = guard.registry.remove(ptr).expect("looked up above");
        let mut first_err = None;
        for sub in &record.blocks {
            let result = if is_map {
                guard.channel.unmap(sub.ptr)
            } else {
                guard.channel.free(sub.ptr)
            };
            if let Err(e) = result {
                first_err.get_or_insert(e);
            }
        }
        tracing::debug!(?ptr, op, "buffer released");
        match first_err {
            Some(e) => Err(kernel_err(e)),
            None => Ok(()),
        }
    }

    /// Resizes an existing 1D buffer in place (`tilerRealloc` behavior): the
    /// TILER container has no in-place grow, so this frees the old
    /// reservation and allocates a new one of `new_length`, preserving the
    /// identifier's *meaning* but not its numeric value — callers must use
    /// the returned pointer.
    pub fn realloc_1d(&self, ptr: SsPtr, new_length: u64) -> Result<SsPtr, TilerError> {
        self.free(ptr)?;
        let mut block = MemBlock::page(new_length);
        self.alloc(std::slice::from_mut(&mut block), 0)
    }

    /// Resizes an existing 2D buffer in place, same pixel format and
    /// security zone (supplemental `tilerRealloc`).
    pub fn realloc_2d(&self, ptr: SsPtr, new_width: u32, new_height: u32) -> Result<SsPtr, TilerError> {
        let fmt = {
            let guard = self.inner.lock().unwrap();
            let record = guard.registry.lookup(ptr).ok_or(IdentityError::Unknown)?;
            if record.kind != BufferKind::Alloc2D || record.blocks.len() != 1 {
                return Err(IdentityError::WrongKind.into());
            }
            record.blocks[0].block.pixel_format
        };
        self.free(ptr)?;
        let mut block = MemBlock::tiled(fmt, new_width, new_height);
        self.alloc(std::slice::from_mut(&mut block), 0)
    }

    // ---- Query/Translate -----------------------------------------------

    pub fn is_mapped(&self, ptr: SsPtr) -> bool {
        if ptr.is_null() {
            return false;
        }
        self.inner.lock().unwrap().registry.lookup(ptr).is_some()
    }

    pub fn is_1d_block(&self, ptr: SsPtr) -> bool {
        if ptr.is_null() {
            return false;
        }
        matches!(
            self.inner.lock().unwrap().registry.lookup(ptr).map(|r| r.kind),
            Some(BufferKind::Alloc1D) | Some(BufferKind::Map1D)
        )
    }

    pub fn is_2d_block(&self, ptr: SsPtr) -> bool {
        if ptr.is_null() {
            return false;
        }
        matches!(
            self.inner.lock().unwrap().registry.lookup(ptr).map(|r| r.kind),
            Some(BufferKind::Alloc2D)
        )
    }

    /// `GetStride(p)`: registered -> sub-block 0's stride; unregistered but
    /// non-null -> `page_size` (a compatibility rule for pointers this
    /// crate never allocated); null -> 0.
    pub fn get_stride(&self, ptr: SsPtr) -> u32 {
        if ptr.is_null() {
            return 0;
        }
        match self.inner.lock().unwrap().registry.lookup(ptr) {
            Some(record) => record.blocks[0].stride,
            None => self.cfg.page_size,
        }
    }

    /// `VirtToPhys(p)`: total over every pointer value. Registered pointers
    /// (including arbitrary intra-buffer offsets) resolve via the owning
    /// sub-block's reservation; unregistered non-null pointers fall back to
    /// the kernel channel's best-effort translation.
    pub fn virt_to_phys(&self, ptr: SsPtr) -> PhysAddr {
        if ptr.is_null() {
            return PhysAddr::NULL;
        }
        let guard = self.inner.lock().unwrap();
        match guard.registry.find_containing(ptr) {
            Some((_record, sub)) => sub.reserved.offset((ptr.addr() - sub.ptr.addr()) as u64),
            None => guard.channel.host_virt_to_phys(ptr),
        }
    }

    /// `TilerMem_GetStride(physical)`: the view-stride constant for
    /// whichever TILER aperture `physical` falls into, or 0 if it falls
    /// outside every aperture.
    pub fn tiler_mem_get_stride(&self, physical: PhysAddr) -> u32 {
        if physical.is_null() {
            return 0;
        }
        let guard = self.inner.lock().unwrap();
        for (format, start, end) in guard.channel.apertures() {
            if physical.addr() >= start && physical.addr() < end {
                return match format {
                    Some(fmt) => view_stride(fmt, &self.cfg),
                    None => self.cfg.page_size,
                };
            }
        }
        0
    }

    /// Converts a system-space pointer to tiler space under the given
    /// orientation (supplemental `convertToTilerSpace`).
    pub fn to_tiler_space(&self, ptr: SsPtr, rotation: Rotation, mirroring: Mirroring) -> Option<TilerSpacePtr> {
        space::to_tiler_space(ptr, rotation, mirroring)
    }

    /// The reference corner a tiler-space address was produced with
    /// (supplemental `tilerGetRefCorner`). Total like the other queries:
    /// an address built outside this crate is interpreted as identity
    /// orientation.
    pub fn ref_corner(&self, rotation: Rotation, mirroring: Mirroring) -> RefCorner {
        space::ref_corner_for(rotation, mirroring)
    }

    /// Internal self-test hook: runs `f` once per live buffer. Used by the
    /// CLI harness's `self-test` subcommand and by the stress test to audit
    /// for leaks at teardown.
    pub fn for_each_live(&self, f: impl FnMut(&BufferRecord)) {
        self.inner.lock().unwrap().registry.for_each(f);
    }

    pub fn live_count(&self) -> usize {
        self.inner.lock().unwrap().registry.len()
    }
}

fn kernel_err(e: KernelError) -> TilerError {
    TilerError::Kernel(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::VecPageSource;
    use crate::transport::SimChannel;

    fn manager() -> TilerManager {
        let cfg = TilerConfig::default();
        TilerManager::init(cfg, Box::new(SimChannel::new(cfg)))
    }

    #[test]
    fn alloc_1d_then_free() {
        let m = manager();
        let mut blocks = [MemBlock::page(4096)];
        let ptr = m.alloc(&mut blocks, 0).unwrap();
        assert_eq!(blocks[0].ptr, Some(ptr));
        assert_eq!(m.get_stride(ptr), 4096);
        assert!(m.is_1d_block(ptr));
        assert!(!m.is_2d_block(ptr));
        assert_eq!(m.free(ptr), Ok(()));
        assert!(!m.is_mapped(ptr));
    }

    #[test]
    fn double_free_rejected() {
        let m = manager();
        let mut blocks = [MemBlock::page(4096)];
        let ptr = m.alloc(&mut blocks, 0).unwrap();
        m.free(ptr).unwrap();
        assert!(m.free(ptr).is_err());
    }

    #[test]
    fn cross_kind_rejected() {
        let m = manager();
        let mut blocks = [MemBlock::page(4096)];
        let ptr = m.alloc(&mut blocks, 0).unwrap();
        assert!(m.unmap(ptr).is_err());
        assert!(m.is_mapped(ptr));
        m.free(ptr).unwrap();

        let mut map_block = MemBlock::page(4096);
        map_block.ptr = Some(SsPtr(0x20000));
        let source = VecPageSource(vec![0x9000]);
        let mptr = m.map(&mut map_block, &source).unwrap();
        assert!(m.free(mptr).is_err());
        assert!(m.is_mapped(mptr));
        m.unmap(mptr).unwrap();
    }

    #[test]
    fn nv12_composite_and_subblock_rejection() {
        let m = manager();
        let mut blocks = [
            MemBlock::tiled(PixelFormat::P8, 640, 480),
            MemBlock::tiled(PixelFormat::P16, 320, 240),
        ];
        let head = m.alloc(&mut blocks, 0).unwrap();
        let chroma_ptr = blocks[1].ptr.unwrap();
        assert!(m.is_2d_block(head));
        assert!(m.free(chroma_ptr).is_err());
        assert_eq!(m.free(head), Ok(()));
        assert!(m.free(chroma_ptr).is_err());
    }
}

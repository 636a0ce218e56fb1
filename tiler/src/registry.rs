//! Process-wide table of live buffers, keyed by the group-head pointer,
//! plus a secondary set of known sub-block pointers used only to reject
//! `Free`/`UnMap` calls that target one of them instead of a group head.
//!
//! Not independently locked: every method here is only ever called from
//! inside `TilerManager`'s single mutex guard, which is what keeps
//! "the kernel granted this" and "the registry now knows about it" atomic
//! with respect to every other thread.

use crate::types::{BufferRecord, SsPtr};
use std::collections::{HashMap, HashSet};

#[derive(Default)]
pub struct BufferRegistry {
    records: HashMap<SsPtr, BufferRecord>,
    sub_block_ptrs: HashSet<SsPtr>,
}

impl BufferRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a newly granted buffer. Returns an error only on the
    /// impossible-in-practice case of an already-live head pointer, which
    /// the caller treats as registry exhaustion and rolls back the kernel
    /// reservation for.
    pub fn insert(&mut self, record: BufferRecord) -> Result<(), &'static str> {
        let head = record.head();
        if self.records.contains_key(&head) {
            return Err("duplicate buffer head pointer");
        }
        for sub in record.sub_block_ptrs() {
            self.sub_block_ptrs.insert(sub);
        }
        self.records.insert(head, record);
        Ok(())
    }

    pub fn lookup(&self, ptr: SsPtr) -> Option<&BufferRecord> {
        self.records.get(&ptr)
    }

    pub fn is_sub_block(&self, ptr: SsPtr) -> bool {
        self.sub_block_ptrs.contains(&ptr)
    }

    /// Removes the group headed by `ptr`. Returns `None` if `ptr` is
    /// unknown or identifies a sub-block rather than a group head.
    pub fn remove(&mut self, ptr: SsPtr) -> Option<BufferRecord> {
        let record = self.records.remove(&ptr)?;
        for sub in record.sub_block_ptrs() {
            self.sub_block_ptrs.remove(&sub);
        }
        Some(record)
    }

    pub fn for_each(&self, mut f: impl FnMut(&BufferRecord)) {
        for record in self.records.values() {
            f(record);
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Finds the live buffer (if any) whose address range contains `p`,
    /// and the sub-block within it covering `p`. Resolves arbitrary
    /// intra-buffer offsets for address translation, not just group head
    /// pointers.
    pub fn find_containing(&self, p: SsPtr) -> Option<(&BufferRecord, &crate::types::SubBlock)> {
        self.records
            .values()
            .find_map(|record| record.find_in_range(p).map(|sub| (record, sub)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BufferKind, MemBlock, PhysAddr, PixelFormat, SubBlock};

    fn leaf(ptr: usize, len: u64) -> BufferRecord {
        BufferRecord {
            kind: BufferKind::Alloc1D,
            blocks: vec![SubBlock {
                block: MemBlock::page(len),
                ptr: SsPtr(ptr),
                reserved: PhysAddr(ptr as u64),
                stride: 4096,
            }],
            source_ptr: None,
        }
    }

    fn nv12(head: usize, chroma: usize) -> BufferRecord {
        BufferRecord {
            kind: BufferKind::Alloc2D,
            blocks: vec![
                SubBlock {
                    block: MemBlock::tiled(PixelFormat::P8, 640, 480),
                    ptr: SsPtr(head),
                    reserved: PhysAddr(head as u64),
                    stride: 16384,
                },
                SubBlock {
                    block: MemBlock::tiled(PixelFormat::P16, 320, 240),
                    ptr: SsPtr(chroma),
                    reserved: PhysAddr(chroma as u64),
                    stride: 32768,
                },
            ],
            source_ptr: None,
        }
    }

    #[test]
    fn insert_lookup_remove_roundtrip() {
        let mut reg = BufferRegistry::new();
        reg.insert(leaf(0x1000, 4096)).unwrap();
        assert!(reg.lookup(SsPtr(0x1000)).is_some());
        assert!(reg.remove(SsPtr(0x1000)).is_some());
        assert!(reg.lookup(SsPtr(0x1000)).is_none());
        assert!(reg.is_empty());
    }

    #[test]
    fn sub_block_ptr_is_not_a_group_head() {
        let mut reg = BufferRegistry::new();
        reg.insert(nv12(0x1000, 0x8000)).unwrap();
        assert!(reg.lookup(SsPtr(0x8000)).is_none());
        assert!(reg.is_sub_block(SsPtr(0x8000)));
        assert!(reg.remove(SsPtr(0x8000)).is_none());
        assert!(reg.remove(SsPtr(0x1000)).is_some());
        assert!(!reg.is_sub_block(SsPtr(0x8000)));
    }

    #[test]
    fn find_containing_resolves_intra_buffer_offset() {
        let mut reg = BufferRegistry::new();
        reg.insert(nv12(0x1000, 0x1000 + 16384 * 480)).unwrap();
        let chroma_ptr = 0x1000 + 16384 * 480;
        let (_rec, sub) = reg.find_containing(SsPtr(chroma_ptr + 100)).unwrap();
        assert_eq!(sub.ptr, SsPtr(chroma_ptr));
    }
}

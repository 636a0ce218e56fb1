//! End-to-end scenarios exercising the public API the way a real client
//! would: one call sequence per buffer kind, against the in-memory
//! simulator.

use tiler::page::VecPageSource;
use tiler::transport::SimChannel;
use tiler::{MemBlock, PixelFormat, SsPtr, TilerConfig, TilerManager};

fn manager() -> TilerManager {
    let cfg = TilerConfig::default();
    TilerManager::init(cfg, Box::new(SimChannel::new(cfg)))
}

#[test]
fn page_mode_alloc_then_free() {
    let m = manager();
    let mut blocks = [MemBlock::page(4096)];
    let ptr = m.alloc(&mut blocks, 0).unwrap();
    assert_eq!(blocks[0].stride, 4096);
    assert!(blocks[0].ptr.is_some());
    assert!(blocks[0].reserved.is_some());
    assert!(m.is_1d_block(ptr));
    assert_eq!(m.get_stride(ptr), 4096);
    assert!(m.virt_to_phys(ptr).addr() > 0);
    m.free(ptr).unwrap();
    assert!(!m.is_mapped(ptr));
    assert_eq!(m.live_count(), 0);
}

#[test]
fn p16_tiled_alloc_uses_configured_view_stride() {
    let cfg = TilerConfig::default();
    let m = TilerManager::init(cfg, Box::new(SimChannel::new(cfg)));
    let mut blocks = [MemBlock::tiled(PixelFormat::P16, 176, 144)];
    let ptr = m.alloc(&mut blocks, 0).unwrap();
    assert_eq!(blocks[0].stride, cfg.strides.s16);
    assert!(m.is_2d_block(ptr));

    let phys = m.virt_to_phys(ptr);
    assert_eq!(m.tiler_mem_get_stride(phys), cfg.strides.s16);
    m.free(ptr).unwrap();
}

#[test]
fn nv12_composite_alloc_and_subblock_rejection() {
    let m = manager();
    let mut blocks = [
        MemBlock::tiled(PixelFormat::P8, 640, 480),
        MemBlock::tiled(PixelFormat::P16, 320, 240),
    ];
    let head = m.alloc(&mut blocks, 0).unwrap();
    let luma = blocks[0].ptr.unwrap();
    let chroma = blocks[1].ptr.unwrap();
    assert_eq!(head, luma);
    assert_eq!(
        chroma.addr(),
        luma.addr() + blocks[0].stride as usize * blocks[0].height as usize,
        "chroma plane must follow the luma plane contiguously"
    );

    assert!(m.free(chroma).is_err(), "sub-blocks cannot be freed independently");
    assert!(m.is_mapped(head));
    m.free(head).unwrap();
    assert!(!m.is_mapped(head));
    assert!(!m.is_mapped(chroma));
}

#[test]
fn map_then_unmap_page_list() {
    let m = manager();
    let mut block = MemBlock::page(3 * 4096);
    block.ptr = Some(SsPtr::from_addr(4096));
    let source = VecPageSource(vec![0x10000, 0x11000, 0x12000]);
    let ptr = m.map(&mut block, &source).unwrap();
    assert!(m.is_1d_block(ptr));
    assert!(m.unmap(ptr).is_ok());
    assert!(m.free(ptr).is_err(), "a torn-down mapping is no longer known");
}

#[test]
fn validation_rejects_malformed_requests() {
    let m = manager();

    let mut zero_len = [MemBlock::page(0)];
    assert!(m.alloc(&mut zero_len, 0).is_err());

    let mut zero_dim = [MemBlock::tiled(PixelFormat::P8, 0, 64)];
    assert!(m.alloc(&mut zero_dim, 0).is_err());

    let mut mixed_kind = [
        MemBlock::page(4096),
        MemBlock::tiled(PixelFormat::P8, 64, 64),
    ];
    assert!(
        m.alloc(&mut mixed_kind, 0).is_err(),
        "multi-block alloc requires every block to be tiled"
    );

    let mut empty: [MemBlock; 0] = [];
    assert!(m.alloc(&mut empty, 0).is_err());
}

#[test]
fn double_free_and_cross_kind_rejected() {
    let m = manager();
    let mut blocks = [MemBlock::page(4096)];
    let ptr = m.alloc(&mut blocks, 0).unwrap();
    assert!(m.unmap(ptr).is_err(), "unmap must reject an Alloc1D buffer");
    m.free(ptr).unwrap();
    assert!(m.free(ptr).is_err(), "double free must be rejected");
}

#[test]
fn realloc_preserves_kind_and_grows_capacity() {
    let m = manager();
    let mut blocks = [MemBlock::page(4096)];
    let ptr = m.alloc(&mut blocks, 0).unwrap();
    let new_ptr = m.realloc_1d(ptr, 16384).unwrap();
    assert!(m.is_1d_block(new_ptr));
    assert_eq!(m.get_stride(new_ptr), 4096);
    m.free(new_ptr).unwrap();

    let mut tiled_blocks = [MemBlock::tiled(PixelFormat::P32, 64, 64)];
    let tiled_ptr = m.alloc(&mut tiled_blocks, 0).unwrap();
    let grown = m.realloc_2d(tiled_ptr, 128, 128).unwrap();
    assert!(m.is_2d_block(grown));
    m.free(grown).unwrap();
}

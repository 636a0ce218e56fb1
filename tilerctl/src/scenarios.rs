//! The end-to-end scenario battery driven by `tilerctl self-test`, one
//! manager instance per scenario so a failure partway through one case
//! never contaminates the next.

use tiler::page::VecPageSource;
use tiler::transport::SimChannel;
use tiler::{MemBlock, PixelFormat, SsPtr, TilerConfig, TilerManager};

fn manager(cfg: TilerConfig) -> TilerManager {
    TilerManager::init(cfg, Box::new(SimChannel::new(cfg)))
}

pub fn run(cfg: TilerConfig) -> Result<Vec<String>, String> {
    let mut ok = Vec::new();

    page_alloc(cfg)?;
    ok.push("page alloc round-trip".into());

    tiled_alloc(cfg, PixelFormat::P16, 176, 144)?;
    ok.push("P16 tiled alloc round-trip".into());

    nv12_composite(cfg)?;
    ok.push("NV12 composite alloc round-trip".into());

    map_unmap(cfg)?;
    ok.push("map/unmap round-trip".into());

    rejects_bad_geometry(cfg)?;
    ok.push("validation rejects malformed geometry".into());

    rejects_double_free(cfg)?;
    ok.push("double free is rejected".into());

    Ok(ok)
}

fn page_alloc(cfg: TilerConfig) -> Result<(), String> {
    let m = manager(cfg);
    let mut blocks = [MemBlock::page(4096)];
    let ptr = m.alloc(&mut blocks, 0).map_err(|e| e.to_string())?;
    if m.get_stride(ptr) != cfg.page_size {
        return Err(format!("page alloc stride {} != page size {}", m.get_stride(ptr), cfg.page_size));
    }
    m.free(ptr).map_err(|e| e.to_string())
}

fn tiled_alloc(cfg: TilerConfig, fmt: PixelFormat, width: u32, height: u32) -> Result<(), String> {
    let m = manager(cfg);
    let mut blocks = [MemBlock::tiled(fmt, width, height)];
    let ptr = m.alloc(&mut blocks, 0).map_err(|e| e.to_string())?;
    if !m.is_2d_block(ptr) {
        return Err("tiled alloc did not register as a 2D block".into());
    }
    m.free(ptr).map_err(|e| e.to_string())
}

fn nv12_composite(cfg: TilerConfig) -> Result<(), String> {
    let m = manager(cfg);
    let mut blocks = [
        MemBlock::tiled(PixelFormat::P8, 640, 480),
        MemBlock::tiled(PixelFormat::P16, 320, 240),
    ];
    let head = m.alloc(&mut blocks, 0).map_err(|e| e.to_string())?;
    let chroma = blocks[1].ptr.ok_or("chroma sub-block missing its ptr")?;
    if m.free(chroma).is_ok() {
        return Err("freeing a sub-block should have been rejected".into());
    }
    m.free(head).map_err(|e| e.to_string())
}

fn map_unmap(cfg: TilerConfig) -> Result<(), String> {
    let m = manager(cfg);
    let mut block = MemBlock::page(4096);
    block.ptr = Some(SsPtr::from_addr(cfg.page_size as usize));
    let source = VecPageSource(vec![0x9000]);
    let ptr = m.map(&mut block, &source).map_err(|e| e.to_string())?;
    if m.free(ptr).is_ok() {
        return Err("free() should have rejected a mapped buffer".into());
    }
    m.unmap(ptr).map_err(|e| e.to_string())
}

fn rejects_bad_geometry(cfg: TilerConfig) -> Result<(), String> {
    let m = manager(cfg);
    let mut blocks = [MemBlock::tiled(PixelFormat::P16, 0, 64)];
    match m.alloc(&mut blocks, 0) {
        Ok(_) => Err("zero-width alloc should have been rejected".into()),
        Err(_) => Ok(()),
    }
}

fn rejects_double_free(cfg: TilerConfig) -> Result<(), String> {
    let m = manager(cfg);
    let mut blocks = [MemBlock::page(4096)];
    let ptr = m.alloc(&mut blocks, 0).map_err(|e| e.to_string())?;
    m.free(ptr).map_err(|e| e.to_string())?;
    match m.free(ptr) {
        Ok(()) => Err("double free should have been rejected".into()),
        Err(_) => Ok(()),
    }
}

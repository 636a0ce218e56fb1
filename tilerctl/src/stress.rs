//! Randomized allocate/free/map churn over a small slot pool, the CLI
//! analogue of the original `star_test` battery: cycle a fixed number of
//! slots through every buffer kind and confirm the registry is empty once
//! everything still held has been torn down.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tiler::page::VecPageSource;
use tiler::transport::SimChannel;
use tiler::{MemBlock, PixelFormat, SsPtr, TilerConfig, TilerManager};

pub struct Outcome {
    pub leaked: usize,
}

#[derive(Clone, Copy)]
enum Slot {
    Empty,
    Alloc(SsPtr),
    Mapped(SsPtr),
}

pub fn run(cfg: TilerConfig, ops: usize, slots: usize, seed: u64) -> Outcome {
    let manager = TilerManager::init(cfg, Box::new(SimChannel::new(cfg)));
    let mut rng = StdRng::seed_from_u64(seed);
    let mut pool = vec![Slot::Empty; slots.max(1)];

    for _ in 0..ops {
        let idx = rng.gen_range(0..pool.len());
        pool[idx] = match pool[idx] {
            Slot::Empty => fill(&manager, &mut rng, cfg),
            Slot::Alloc(ptr) => {
                if manager.free(ptr).is_ok() {
                    Slot::Empty
                } else {
                    Slot::Alloc(ptr)
                }
            }
            Slot::Mapped(ptr) => {
                if manager.unmap(ptr).is_ok() {
                    Slot::Empty
                } else {
                    Slot::Mapped(ptr)
                }
            }
        };
    }

    let mut leaked = 0;
    for slot in pool {
        let torn_down = match slot {
            Slot::Empty => true,
            Slot::Alloc(ptr) => manager.free(ptr).is_ok(),
            Slot::Mapped(ptr) => manager.unmap(ptr).is_ok(),
        };
        if !torn_down {
            leaked += 1;
        }
    }
    leaked += manager.shutdown();
    Outcome { leaked }
}

fn fill(manager: &TilerManager, rng: &mut StdRng, cfg: TilerConfig) -> Slot {
    match rng.gen_range(0..6) {
        0 => {
            let mut blocks = [MemBlock::page(4096 * rng.gen_range(1..=8))];
            alloc_slot(manager, &mut blocks)
        }
        1 => alloc_tiled(manager, rng, PixelFormat::P8),
        2 => alloc_tiled(manager, rng, PixelFormat::P16),
        3 => alloc_tiled(manager, rng, PixelFormat::P32),
        4 => {
            let w = (rng.gen_range(16..=640)) & !1;
            let h = (rng.gen_range(16..=480)) & !1;
            let mut blocks = [
                MemBlock::tiled(PixelFormat::P8, w, h),
                MemBlock::tiled(PixelFormat::P16, w / 2, h / 2),
            ];
            alloc_slot(manager, &mut blocks)
        }
        _ => {
            let mut block = MemBlock::page(cfg.page_size as u64);
            block.ptr = Some(SsPtr::from_addr(cfg.page_size as usize));
            let source = VecPageSource(vec![cfg.page_size as u64 * 2]);
            match manager.map(&mut block, &source) {
                Ok(ptr) => Slot::Mapped(ptr),
                Err(_) => Slot::Empty,
            }
        }
    }
}

fn alloc_tiled(manager: &TilerManager, rng: &mut StdRng, fmt: PixelFormat) -> Slot {
    let width = rng.gen_range(16..=1920);
    let height = rng.gen_range(16..=1080);
    let mut blocks = [MemBlock::tiled(fmt, width, height)];
    alloc_slot(manager, &mut blocks)
}

fn alloc_slot(manager: &TilerManager, blocks: &mut [MemBlock]) -> Slot {
    match manager.alloc(blocks, 0) {
        Ok(ptr) => Slot::Alloc(ptr),
        Err(_) => Slot::Empty,
    }
}

//! Address-space allocator and mapper for a tiled-memory (DMM/TILER)
//! hardware unit.
//!
//! The TILER is an address-remapping engine that exposes a large physical
//! tile container as several virtual views, one per pixel element size (8,
//! 16, 32 bit) plus a linear page-mode view. This crate carves that
//! container into rectangles and page runs, tracks reservations so no tile
//! is ever shared by two live buffers, and translates between
//! system-space and tiler-space addresses.
//!
//! The kernel driver that actually programs the TILER's PAT is a
//! collaborator, not part of this crate: it is reached only through the
//! [`transport::KernelChannel`] trait. [`transport::SimChannel`] is a
//! userspace stand-in used by tests and the `tilerctl` CLI harness.
//!
//! ```
//! use tiler::{TilerConfig, TilerManager, MemBlock};
//! use tiler::transport::SimChannel;
//!
//! let cfg = TilerConfig::default();
//! let tiler = TilerManager::init(cfg, Box::new(SimChannel::new(cfg)));
//!
//! let mut block = MemBlock::page(4096);
//! let ptr = tiler.alloc(std::slice::from_mut(&mut block), 0).unwrap();
//! assert_eq!(tiler.get_stride(ptr), 4096);
//! assert!(tiler.is_1d_block(ptr));
//! tiler.free(ptr).unwrap();
//! ```

pub mod config;
pub mod error;
pub mod geometry;
pub mod manager;
pub mod page;
pub mod registry;
pub mod space;
pub mod transport;
pub mod types;

pub use config::TilerConfig;
pub use error::TilerError;
pub use manager::TilerManager;
pub use page::PageSource;
pub use types::{BufferKind, MemBlock, PhysAddr, PixelFormat, SsPtr, TilerSpacePtr};

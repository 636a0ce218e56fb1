//! Pure functions: bytes-per-pixel, stride rounding, pixel-format and
//! parameter validation, page alignment. No locking, no I/O — callers
//! combine these with kernel RPCs and registry state, never the reverse.

use crate::config::TilerConfig;
use crate::error::ValidationError;
use crate::types::{MemBlock, PixelFormat};

/// Bytes per pixel for a tiled format; 0 for `PAGE`, which has no pixel
/// element and is addressed purely in bytes.
pub fn bpp(fmt: PixelFormat) -> u32 {
    match fmt {
        PixelFormat::Page => 0,
        PixelFormat::P8 => 1,
        PixelFormat::P16 => 2,
        PixelFormat::P32 => 4,
    }
}

/// Rounds `width_bytes` up to the next multiple of `page_size`.
pub fn def_stride(width_bytes: u64, page_size: u32) -> u32 {
    let page = page_size as u64;
    let rounded = width_bytes.div_ceil(page) * page;
    rounded.min(u32::MAX as u64) as u32
}

/// The TILER container's fixed view stride for `fmt` — the hardware reads
/// every tile of a given pixel element size through the same stride,
/// regardless of the buffer's own declared width.
pub fn view_stride(fmt: PixelFormat, cfg: &TilerConfig) -> u32 {
    match fmt {
        PixelFormat::Page => cfg.page_size,
        PixelFormat::P8 => cfg.strides.s8,
        PixelFormat::P16 => cfg.strides.s16,
        PixelFormat::P32 => cfg.strides.s32,
    }
}

fn is_page_multiple(value: u32, page_size: u32) -> bool {
    value > 0 && value % page_size == 0
}

/// Validates a single block's declared geometry. Does not consult the
/// kernel or registry — a block that fails here was never sent to either.
pub fn validate_block(block: &MemBlock, cfg: &TilerConfig) -> Result<(), ValidationError> {
    match block.pixel_format {
        PixelFormat::Page => {
            if block.length == 0 {
                return Err(ValidationError::ZeroLength);
            }
            if block.stride != 0 && !is_page_multiple(block.stride, cfg.page_size) {
                return Err(ValidationError::StrideNotPageMultiple);
            }
            Ok(())
        }
        tiled => {
            if block.width == 0 || block.height == 0 {
                return Err(ValidationError::ZeroDimension);
            }
            if block.stride != 0 {
                let min_stride = block.width as u64 * bpp(tiled) as u64;
                if (block.stride as u64) < min_stride {
                    return Err(ValidationError::StrideTooSmall);
                }
                if !is_page_multiple(block.stride, cfg.page_size) {
                    return Err(ValidationError::StrideNotPageMultiple);
                }
            }
            Ok(())
        }
    }
}

/// Fills a zero stride with its implicit value. Leaves an explicit stride
/// untouched — the caller has already validated it against the minimum.
pub fn canonicalize(block: &mut MemBlock, cfg: &TilerConfig) {
    if block.stride != 0 {
        return;
    }
    block.stride = match block.pixel_format {
        PixelFormat::Page => cfg.page_size,
        tiled => def_stride(block.width as u64 * bpp(tiled) as u64, cfg.page_size),
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> TilerConfig {
        TilerConfig::default()
    }

    #[test]
    fn bpp_values() {
        assert_eq!(bpp(PixelFormat::Page), 0);
        assert_eq!(bpp(PixelFormat::P8), 1);
        assert_eq!(bpp(PixelFormat::P16), 2);
        assert_eq!(bpp(PixelFormat::P32), 4);
    }

    #[test]
    fn def_stride_rounds_up_to_page() {
        assert_eq!(def_stride(1, 4096), 4096);
        assert_eq!(def_stride(4096, 4096), 4096);
        assert_eq!(def_stride(4097, 4096), 8192);
        assert_eq!(def_stride(0, 4096), 0);
    }

    #[test]
    fn validate_page_block() {
        let c = cfg();
        assert!(validate_block(&MemBlock::page(4096), &c).is_ok());
        assert_eq!(
            validate_block(&MemBlock::page(0), &c),
            Err(ValidationError::ZeroLength)
        );
        let bad_stride = MemBlock::page(4096).with_stride(100);
        assert_eq!(
            validate_block(&bad_stride, &c),
            Err(ValidationError::StrideNotPageMultiple)
        );
    }

    #[test]
    fn validate_tiled_block() {
        let c = cfg();
        assert!(validate_block(&MemBlock::tiled(PixelFormat::P16, 176, 144), &c).is_ok());
        assert_eq!(
            validate_block(&MemBlock::tiled(PixelFormat::P8, 0, 16), &c),
            Err(ValidationError::ZeroDimension)
        );
        // width=4095, stride=4095: stride not a page multiple AND smaller than width*bpp.
        let bad = MemBlock::tiled(PixelFormat::P8, 4095, 16).with_stride(4095);
        assert!(validate_block(&bad, &c).is_err());
    }

    #[test]
    fn canonicalize_fills_zero_stride() {
        let c = cfg();
        let mut block = MemBlock::tiled(PixelFormat::P16, 176, 144);
        canonicalize(&mut block, &c);
        assert_eq!(block.stride, def_stride(176 * 2, c.page_size));
        assert!(block.stride >= 176 * 2);
        assert_eq!(block.stride % c.page_size, 0);
    }
}

//! Deployment-time constants: page size and the per-view stride triple.
//!
//! Neither value is knowable by the allocator itself — both are properties
//! of the silicon the TILER container is wired to, and come from the
//! kernel driver at init time or from a configuration file shipped
//! alongside the client. This module only holds the numbers and a thin
//! loader; it never picks defaults on its own initiative beyond the
//! documented reference-hardware values.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Stride, in bytes, of the TILER container view for each pixel format.
///
/// On reference hardware these are 16 KiB, 32 KiB and 32 KiB for the 8/16/32
/// bit views respectively; real silicon varies, so callers targeting a
/// different part must load the correct triple via [`TilerConfig::from_toml`]
/// or construct one directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewStrides {
    pub s8: u32,
    pub s16: u32,
    pub s32: u32,
}

/// Page size plus the view-stride triple for one TILER instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TilerConfig {
    pub page_size: u32,
    pub strides: ViewStrides,
}

impl Default for TilerConfig {
    /// Reference-hardware defaults: 4 KiB pages, S8=16 KiB, S16=S32=32 KiB.
    fn default() -> Self {
        TilerConfig {
            page_size: 4096,
            strides: ViewStrides {
                s8: 16 * 1024,
                s16: 32 * 1024,
                s32: 32 * 1024,
            },
        }
    }
}

impl TilerConfig {
    /// Loads page size and view strides from a TOML file.
    ///
    /// ```toml
    /// page_size = 4096
    /// [strides]
    /// s8 = 16384
    /// s16 = 32768
    /// s32 = 32768
    /// ```
    pub fn from_toml(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let cfg: TilerConfig = toml::from_str(&text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size == 0 || !self.page_size.is_power_of_two() {
            return Err(ConfigError::BadPageSize(self.page_size));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("page size {0} is not a positive power of two")]
    BadPageSize(u32),
}

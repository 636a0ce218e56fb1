//! Error taxonomy: validation, registry, kernel and identity failures.
//! Every fallible public operation returns a `Result<_, TilerError>` and
//! leaves no partial state behind; queries are total and never produce
//! one of these.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum TilerError {
    /// Request failed Geometry Library validation; no kernel or registry
    /// state was touched.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// The kernel call succeeded but the registry could not record it
    /// (out-of-memory in the registry); the kernel reservation has already
    /// been rolled back by the time this is returned.
    #[error("registry insertion failed: {0}")]
    Registry(String),

    /// The kernel driver refused or failed the RPC. Any sub-blocks already
    /// granted for this call have been freed before this is returned.
    #[error("kernel request failed: {0}")]
    Kernel(String),

    /// Free/UnMap targeted a pointer that is unknown, a sub-block, null, or
    /// of the wrong kind for the operation.
    #[error("identity error: {0}")]
    Identity(#[from] IdentityError),
}

#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum ValidationError {
    #[error("page-mode length must be > 0")]
    ZeroLength,
    #[error("width and height must both be > 0")]
    ZeroDimension,
    #[error("stride must be a positive multiple of the page size")]
    StrideNotPageMultiple,
    #[error("stride must be >= width * bytes-per-pixel")]
    StrideTooSmall,
    #[error("multi-block allocation requires every block to be tiled (PAGE not allowed)")]
    MultiBlockPageNotSupported,
    #[error("multi-block allocation requires at least one block")]
    EmptyBlockList,
    #[error("Map only supports a single PAGE block")]
    MapRequiresSinglePageBlock,
    #[error("mapped pointer must be page-aligned")]
    UnalignedMapPointer,
    #[error("mapped length must be a positive multiple of the page size")]
    MapLengthNotPageMultiple,
}

#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum IdentityError {
    #[error("pointer is null")]
    NullPointer,
    #[error("pointer is not a known buffer")]
    Unknown,
    #[error("pointer identifies a sub-block, not a buffer group head")]
    SubBlock,
    #[error("operation not valid for this buffer's kind")]
    WrongKind,
}

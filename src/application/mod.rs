//! Application layer: Use cases and services.
//!
//! This module orchestrates domain logic with ports to implement
//! the core use cases of the application.

mod codec;
mod ledger;
mod registry;

pub use codec::{QrCodec, QrImageSet, LARGE_WIDTH, MEDIUM_WIDTH, SMALL_WIDTH};
pub use ledger::LedgerGateway;
pub use registry::{
    FileRegistry, RegistryError, UploadBatch, UploadProgress, DEFAULT_PROGRESS_INTERVAL,
    FILE_KEY_PREFIX, INDEX_KEY,
};

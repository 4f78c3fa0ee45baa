//! Ports layer: Trait definitions for external operations.
//!
//! Following Hexagonal Architecture, these traits define the boundaries
//! between the application and external systems (storage, QR rendering,
//! ledger network).

mod barcode;
mod ledger;
mod storage;

pub use barcode::BarcodeRenderer;
pub use ledger::{ContractCallResult, LedgerClient, LedgerError};
pub use storage::KeyValueStore;

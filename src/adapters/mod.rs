//! Adapters layer: Concrete implementations of ports.
//!
//! These modules contain the actual integration with external libraries:
//! - `sqlite`: SQLite for the local key-value store
//! - `qr`: qrcode + image for barcode rendering
//! - `sanitize`: identifier and secret filtering for logs

pub mod qr;
pub mod sanitize;
pub mod sqlite;

pub use sqlite::StorageError;

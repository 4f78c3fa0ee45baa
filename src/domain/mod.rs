//! Domain layer: Core business types and logic.
//!
//! This module contains pure Rust types with no I/O.
//! All types are serializable and implement strict validation.

mod crypto;
mod file_record;
pub mod kdf;
mod qr_payload;

pub use crypto::{CodecKey, CryptoError, CODEC_KEY_LEN};
pub use file_record::{
    generate_file_id, FileRecord, FileStats, UploadFile, ValidationError, ALLOWED_MIME_TYPES,
    MAX_FILE_SIZE,
};
pub use qr_payload::{
    CodecError, ErrorCorrection, PatientIdentity, QrOptions, QrPayload, ValidationReport,
    MAX_PAYLOAD_AGE_HOURS, PAYLOAD_VERSION,
};

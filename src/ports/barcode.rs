//! Barcode port: Trait for rendering sealed payloads as scannable images.

use crate::domain::{CodecError, QrOptions};

/// Trait for 2-D barcode rendering.
pub trait BarcodeRenderer: Send + Sync {
    /// Render `text` as an image data URL.
    ///
    /// # Errors
    /// Returns `CodecError::Encoding` if the text does not fit the requested
    /// error correction level or the options are invalid.
    fn render(&self, text: &str, options: &QrOptions) -> Result<String, CodecError>;
}

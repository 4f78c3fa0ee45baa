//! QR codec service: seals patient identities into scannable QR codes and
//! validates scanned payloads.
//!
//! Pipeline:
//! - Stamp the identity (`timestamp`, `version`)
//! - Serialize to JSON
//! - Seal with AES-256-GCM under the configured codec key
//! - Render the base64 sealed text as a QR code data URL

use std::sync::Arc;

use base64::engine::general_purpose;
use base64::Engine;
use chrono::{DateTime, Utc};

use crate::domain::{
    kdf::{self, SealedBox},
    CodecError, CodecKey, PatientIdentity, QrOptions, QrPayload, ValidationReport,
};
use crate::ports::BarcodeRenderer;

/// Pixel widths used by `encode_multiple`.
pub const SMALL_WIDTH: u32 = 128;
pub const MEDIUM_WIDTH: u32 = 256;
pub const LARGE_WIDTH: u32 = 512;

/// Same payload rendered at three sizes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrImageSet {
    pub small: String,
    pub medium: String,
    pub large: String,
}

/// Service for encoding and validating patient QR codes.
///
/// Holds only the immutable codec key and renderer, so a single instance can
/// be shared across threads behind an `Arc`.
pub struct QrCodec<R>
where
    R: BarcodeRenderer,
{
    key: CodecKey,
    renderer: Arc<R>,
}

impl<R> QrCodec<R>
where
    R: BarcodeRenderer,
{
    /// Create a new codec.
    pub fn new(key: CodecKey, renderer: Arc<R>) -> Self {
        tracing::info!("QR codec ready (key fingerprint {})", key.fingerprint);
        Self { key, renderer }
    }

    /// Fingerprint of the codec key (safe to display).
    #[must_use]
    pub fn key_fingerprint(&self) -> &str {
        &self.key.fingerprint
    }

    /// Stamp and seal an identity, returning the text carried by the QR code.
    ///
    /// # Errors
    /// Returns error if serialization or encryption fails.
    pub fn seal(&self, identity: PatientIdentity) -> Result<String, CodecError> {
        self.seal_payload(&QrPayload::stamp(identity, Utc::now()))
    }

    /// Seal an already stamped payload without touching its timestamp.
    ///
    /// # Errors
    /// Returns error if serialization or encryption fails.
    pub fn seal_payload(&self, payload: &QrPayload) -> Result<String, CodecError> {
        let json = serde_json::to_vec(payload)
            .map_err(|e| CodecError::Encoding(format!("payload serialization failed: {e}")))?;
        let sealed = kdf::seal(&json, &self.key)?;
        Ok(general_purpose::STANDARD.encode(sealed.to_bytes()))
    }

    /// Encode an identity as a QR code image (PNG data URL).
    ///
    /// # Errors
    /// Returns `CodecError::Encoding` if the image cannot be rendered with
    /// the requested options.
    pub fn encode(
        &self,
        identity: PatientIdentity,
        options: &QrOptions,
    ) -> Result<String, CodecError> {
        let sealed = self.seal(identity)?;
        let image = self.renderer.render(&sealed, options)?;
        tracing::debug!("Encoded QR code at {}px", options.width);
        Ok(image)
    }

    /// Encode one identity at the small, medium and large widths.
    ///
    /// The identity is stamped once, so all three images carry the same
    /// sealed payload and expire together.
    ///
    /// # Errors
    /// Returns `CodecError::Encoding` if any size fails to render.
    pub fn encode_multiple(&self, identity: PatientIdentity) -> Result<QrImageSet, CodecError> {
        let sealed = self.seal(identity)?;
        let render = |width| self.renderer.render(&sealed, &QrOptions::with_width(width));

        Ok(QrImageSet {
            small: render(SMALL_WIDTH)?,
            medium: render(MEDIUM_WIDTH)?,
            large: render(LARGE_WIDTH)?,
        })
    }

    /// Decode scanned QR text back into a payload.
    ///
    /// No freshness or completeness checks; see `validate`.
    ///
    /// # Errors
    /// Returns `CodecError::Decode` with reason "corrupt" if the text is not
    /// base64, fails authentication, or is not a payload.
    pub fn decode(&self, text: &str) -> Result<QrPayload, CodecError> {
        let bytes = general_purpose::STANDARD
            .decode(text.trim())
            .map_err(|_| CodecError::corrupt())?;
        let sealed = SealedBox::from_bytes(&bytes).map_err(|_| CodecError::corrupt())?;
        let plaintext = kdf::open(&sealed, &self.key).map_err(|_| CodecError::corrupt())?;

        serde_json::from_slice(&plaintext).map_err(|_| CodecError::corrupt())
    }

    /// Decode and check completeness and age of a scanned payload.
    #[must_use]
    pub fn validate(&self, text: &str) -> ValidationReport {
        self.validate_at(text, Utc::now())
    }

    fn validate_at(&self, text: &str, now: DateTime<Utc>) -> ValidationReport {
        let payload = match self.decode(text) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::debug!("QR validation failed: {}", e);
                return ValidationReport::invalid("invalid or corrupted data");
            }
        };

        if payload.missing_required_fields() {
            return ValidationReport::invalid("missing required fields");
        }

        if payload.is_expired_at(now) {
            return ValidationReport::invalid("expired");
        }

        ValidationReport::valid(payload)
    }

    /// Patient id of a valid payload.
    #[must_use]
    pub fn extract_patient_id(&self, text: &str) -> Option<String> {
        self.validate(text)
            .payload
            .map(|payload| payload.identity.patient_id)
    }
}

//! Patient identity payload carried inside QR codes.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::crypto::CryptoError;

/// Schema version stamped on every payload.
pub const PAYLOAD_VERSION: &str = "1.0";

/// Maximum age of a payload before it is rejected.
pub const MAX_PAYLOAD_AGE_HOURS: i64 = 24;

/// Error type for QR encode/decode operations.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("QR encoding failed: {0}")]
    Encoding(String),

    #[error("QR payload rejected: {reason}")]
    Decode { reason: String },

    #[error("Sealing failed: {0}")]
    Crypto(#[from] CryptoError),
}

impl CodecError {
    /// The single decode failure surfaced to callers.
    #[must_use]
    pub fn corrupt() -> Self {
        Self::Decode {
            reason: "corrupt".to_string(),
        }
    }
}

/// Minimal structured data identifying a patient for QR lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientIdentity {
    pub patient_id: String,
    pub nom: String,
    pub prenom: String,
    /// Facility code
    pub hopital: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_naissance: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub groupe_sanguin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allergies: Option<Vec<String>>,
}

impl PatientIdentity {
    /// Create an identity with the required fields only.
    #[must_use]
    pub fn new(
        patient_id: impl Into<String>,
        nom: impl Into<String>,
        prenom: impl Into<String>,
        hopital: impl Into<String>,
    ) -> Self {
        Self {
            patient_id: patient_id.into(),
            nom: nom.into(),
            prenom: prenom.into(),
            hopital: hopital.into(),
            date_naissance: None,
            groupe_sanguin: None,
            allergies: None,
        }
    }
}

/// Identity record as sealed into a QR code.
///
/// `timestamp` (milliseconds since the Unix epoch) is set once at encode
/// time and never altered afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrPayload {
    #[serde(flatten)]
    pub identity: PatientIdentity,
    pub timestamp: i64,
    pub version: String,
}

impl QrPayload {
    /// Stamp an identity with a creation time and the current schema version.
    #[must_use]
    pub fn stamp(identity: PatientIdentity, at: DateTime<Utc>) -> Self {
        Self {
            identity,
            timestamp: at.timestamp_millis(),
            version: PAYLOAD_VERSION.to_string(),
        }
    }

    /// Whether any of `patientId`, `nom`, `prenom` is blank.
    #[must_use]
    pub fn missing_required_fields(&self) -> bool {
        [
            &self.identity.patient_id,
            &self.identity.nom,
            &self.identity.prenom,
        ]
        .iter()
        .any(|field| field.trim().is_empty())
    }

    /// Whether the payload is older than the allowed age at `now`.
    ///
    /// Payloads stamped in the future are not considered expired.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        let age_ms = now.timestamp_millis() - self.timestamp;
        age_ms > Duration::hours(MAX_PAYLOAD_AGE_HOURS).num_milliseconds()
    }
}

/// QR error correction level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorCorrection {
    /// ~7% recovery
    Low,
    /// ~15% recovery
    #[default]
    Medium,
    /// ~25% recovery
    Quartile,
    /// ~30% recovery
    High,
}

impl std::str::FromStr for ErrorCorrection {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "L" => Ok(Self::Low),
            "M" => Ok(Self::Medium),
            "Q" => Ok(Self::Quartile),
            "H" => Ok(Self::High),
            other => Err(CodecError::Encoding(format!(
                "unknown error correction level '{other}' (expected L, M, Q or H)"
            ))),
        }
    }
}

/// Rendering options for a QR image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrOptions {
    /// Target image width in pixels
    pub width: u32,
    /// Quiet zone around the code, in modules
    pub margin: u32,
    pub error_correction: ErrorCorrection,
    /// Hex color of dark modules (`#RRGGBB` or `#RRGGBBAA`)
    pub dark_color: String,
    /// Hex color of light modules
    pub light_color: String,
}

impl Default for QrOptions {
    fn default() -> Self {
        Self {
            width: 256,
            margin: 2,
            error_correction: ErrorCorrection::Medium,
            dark_color: "#000000".to_string(),
            light_color: "#FFFFFF".to_string(),
        }
    }
}

impl QrOptions {
    /// Default options at the given width.
    #[must_use]
    pub fn with_width(width: u32) -> Self {
        Self {
            width,
            ..Self::default()
        }
    }
}

/// Outcome of validating a scanned payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub is_valid: bool,
    pub payload: Option<QrPayload>,
    pub error: Option<String>,
}

impl ValidationReport {
    #[must_use]
    pub fn valid(payload: QrPayload) -> Self {
        Self {
            is_valid: true,
            payload: Some(payload),
            error: None,
        }
    }

    #[must_use]
    pub fn invalid(error: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            payload: None,
            error: Some(error.into()),
        }
    }
}

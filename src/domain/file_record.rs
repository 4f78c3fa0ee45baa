//! Uploaded document metadata and upload validation rules.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum accepted upload size (5 MiB).
pub const MAX_FILE_SIZE: u64 = 5 * 1024 * 1024;

/// MIME types accepted for upload.
pub const ALLOWED_MIME_TYPES: [&str; 5] = [
    "application/pdf",
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/gif",
];

/// Rejection of a single upload item.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{file_name}: {reason}")]
pub struct ValidationError {
    pub file_name: String,
    pub reason: String,
}

/// A document submitted for upload.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub name: String,
    /// Declared MIME type; inferred from the file name when empty
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl UploadFile {
    #[must_use]
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            data,
        }
    }

    /// Size in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    /// Declared MIME type, or a guess from the extension when none was given.
    #[must_use]
    pub fn resolved_mime_type(&self) -> String {
        let declared = self.mime_type.trim();
        if declared.is_empty() {
            mime_guess::from_path(&self.name)
                .first_raw()
                .unwrap_or("application/octet-stream")
                .to_string()
        } else {
            declared.to_ascii_lowercase()
        }
    }

    /// Check the size cap and type allow-list.
    ///
    /// # Errors
    /// Returns a `ValidationError` naming the file and the violated rule.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.size() > MAX_FILE_SIZE {
            return Err(ValidationError {
                file_name: self.name.clone(),
                reason: format!(
                    "file too large ({} bytes, max {} bytes)",
                    self.size(),
                    MAX_FILE_SIZE
                ),
            });
        }

        let mime = self.resolved_mime_type();
        if !ALLOWED_MIME_TYPES.contains(&mime.as_str()) {
            return Err(ValidationError {
                file_name: self.name.clone(),
                reason: format!(
                    "file type '{mime}' not allowed (accepted: pdf, jpeg, jpg, png, gif)"
                ),
            });
        }

        Ok(())
    }
}

/// Catalogued metadata of a stored document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub id: String,
    pub name: String,
    pub size: u64,
    #[serde(rename = "type")]
    pub mime_type: String,
    pub url: String,
    pub uploaded_at: DateTime<Utc>,
    /// Weak owner reference; the registry does not manage patients
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<String>,
}

impl FileRecord {
    /// Build the record for an accepted upload.
    #[must_use]
    pub fn new(
        id: String,
        file: &UploadFile,
        patient_id: Option<String>,
        uploaded_at: DateTime<Utc>,
    ) -> Self {
        let url = format!("local://uploads/{id}/{}", file.name);
        Self {
            id,
            name: file.name.clone(),
            size: file.size(),
            mime_type: file.resolved_mime_type(),
            url,
            uploaded_at,
            patient_id,
        }
    }
}

/// Aggregate view over the registry contents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileStats {
    pub total_files: usize,
    pub total_size: u64,
    pub files_by_type: BTreeMap<String, usize>,
}

impl FileStats {
    /// Summarize a set of records.
    #[must_use]
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a FileRecord>) -> Self {
        records.into_iter().fold(Self::default(), |mut stats, record| {
            stats.total_files += 1;
            stats.total_size += record.size;
            *stats
                .files_by_type
                .entry(record.mime_type.clone())
                .or_insert(0) += 1;
            stats
        })
    }
}

/// Generate a random file id (UUID v4 layout) using a CSPRNG.
#[must_use]
pub fn generate_file_id() -> String {
    use rand::Rng;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    let mut rng = ChaCha20Rng::from_entropy();
    let bytes: [u8; 16] = rng.gen();

    format!(
        "{:02x}{:02x}{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
        bytes[0], bytes[1], bytes[2], bytes[3],
        bytes[4], bytes[5],
        (bytes[6] & 0x0f) | 0x40, bytes[7],
        (bytes[8] & 0x3f) | 0x80, bytes[9],
        bytes[10], bytes[11], bytes[12], bytes[13], bytes[14], bytes[15]
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_cap() {
        let ok = UploadFile::new("scan.pdf", "application/pdf", vec![0u8; MAX_FILE_SIZE as usize]);
        assert!(ok.validate().is_ok());

        let too_big =
            UploadFile::new("scan.pdf", "application/pdf", vec![0u8; MAX_FILE_SIZE as usize + 1]);
        let err = too_big.validate().expect_err("Should reject");
        assert_eq!(err.file_name, "scan.pdf");
        assert!(err.reason.contains("too large"));
    }

    #[test]
    fn test_type_allow_list() {
        for mime in ALLOWED_MIME_TYPES {
            assert!(UploadFile::new("f", mime, vec![1]).validate().is_ok(), "{mime}");
        }

        let exe = UploadFile::new("tool", "application/x-executable", vec![1]);
        let err = exe.validate().expect_err("Should reject");
        assert!(err.reason.contains("application/x-executable"));
    }

    #[test]
    fn test_mime_inferred_from_name() {
        let png = UploadFile::new("radio.PNG", "", vec![1]);
        assert_eq!(png.resolved_mime_type(), "image/png");
        assert!(png.validate().is_ok());

        let unknown = UploadFile::new("notes", "", vec![1]);
        assert_eq!(unknown.resolved_mime_type(), "application/octet-stream");
        assert!(unknown.validate().is_err());
    }

    #[test]
    fn test_record_json_shape() {
        let file = UploadFile::new("ordonnance.pdf", "application/pdf", vec![0u8; 42]);
        let record =
            FileRecord::new("abc".to_string(), &file, Some("BJ20250001".into()), Utc::now());
        let json = serde_json::to_value(&record).expect("Should serialize");

        assert_eq!(json["type"], "application/pdf");
        assert_eq!(json["size"], 42);
        assert_eq!(json["patientId"], "BJ20250001");
        assert_eq!(json["url"], "local://uploads/abc/ordonnance.pdf");
        assert!(json.get("uploadedAt").is_some());
    }

    #[test]
    fn test_stats_from_records() {
        let now = Utc::now();
        let pdf = UploadFile::new("a.pdf", "application/pdf", vec![0u8; 10]);
        let png = UploadFile::new("b.png", "image/png", vec![0u8; 5]);
        let records = vec![
            FileRecord::new("1".into(), &pdf, None, now),
            FileRecord::new("2".into(), &pdf, None, now),
            FileRecord::new("3".into(), &png, None, now),
        ];

        let stats = FileStats::from_records(&records);
        assert_eq!(stats.total_files, 3);
        assert_eq!(stats.total_size, 25);
        assert_eq!(stats.files_by_type["application/pdf"], 2);
        assert_eq!(stats.files_by_type["image/png"], 1);
    }

    #[test]
    fn test_file_id_generation() {
        let id1 = generate_file_id();
        let id2 = generate_file_id();
        assert_ne!(id1, id2);
        assert_eq!(id1.len(), 36);
    }
}

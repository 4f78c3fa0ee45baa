//! Environment-driven configuration and secret loading.
//!
//! # Codec key sources
//!
//! Precedence (highest first):
//! - `HEDERA_QR_KEY_FILE`: file holding a base64 32-byte key
//! - `/run/secrets/hedera_qr_key`: container secret holding a base64 key
//! - `HEDERA_QR_PASSPHRASE_FILE`: file holding a passphrase, stretched with
//!   Argon2id using `HEDERA_QR_KEY_SALT`
//! - `HEDERA_QR_KEY`: base64 key in the environment, debug builds only
//!
//! Release builds refuse to read key material from environment variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use zeroize::Zeroizing;

use crate::application::DEFAULT_PROGRESS_INTERVAL;
use crate::domain::kdf::{self, KdfParams};
use crate::domain::{CodecKey, CryptoError};

pub const DB_PATH_ENV: &str = "HEDERA_DB_PATH";
pub const UPLOAD_TICK_MS_ENV: &str = "HEDERA_UPLOAD_TICK_MS";
pub const LEDGER_CONTRACT_ENV: &str = "HEDERA_LEDGER_CONTRACT_ID";
pub const LOG_MODE_ENV: &str = "HEDERA_LOG_MODE";
pub const LOG_FILE_ENV: &str = "HEDERA_LOG_FILE";

pub const KEY_FILE_ENV: &str = "HEDERA_QR_KEY_FILE";
pub const KEY_DOCKER_SECRET_PATH: &str = "/run/secrets/hedera_qr_key";
pub const PASSPHRASE_FILE_ENV: &str = "HEDERA_QR_PASSPHRASE_FILE";
pub const KEY_SALT_ENV: &str = "HEDERA_QR_KEY_SALT";

// Dev-only escape hatch for local runs.
pub const KEY_ENV_DEV: &str = "HEDERA_QR_KEY";

const DEFAULT_DB_PATH: &str = "hedera-health.db";
const DEFAULT_LOG_FILE: &str = "hedera-health.log";
const DEFAULT_KEY_SALT: &str = "hedera-health-id/qr-codec/v1";

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(
        "Missing codec key: provide {KEY_FILE_ENV} or {PASSPHRASE_FILE_ENV} (or mount {KEY_DOCKER_SECRET_PATH})"
    )]
    MissingSecret,

    #[error("Could not read secret from {path}: {source}")]
    SecretRead {
        path: String,
        source: std::io::Error,
    },

    #[error("Invalid codec key: {0}")]
    InvalidKey(#[from] CryptoError),

    #[error("Invalid value for {name}: '{value}'")]
    InvalidValue { name: &'static str, value: String },
}

/// Where log output goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogMode {
    Stderr,
    File(PathBuf),
}

/// Runtime configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// SQLite file backing the file registry
    pub db_path: PathBuf,
    /// Delay between upload progress ticks
    pub progress_interval: Duration,
    /// Contract used for identity registration, if any
    pub ledger_contract_id: Option<String>,
    pub log_mode: LogMode,
}

impl AppConfig {
    /// Load configuration from the process environment.
    ///
    /// # Errors
    /// Returns error if a variable is present but malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    /// Returns error if a variable is present but malformed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let db_path = non_empty(DB_PATH_ENV)
            .map_or_else(|| PathBuf::from(DEFAULT_DB_PATH), PathBuf::from);

        let progress_interval = match non_empty(UPLOAD_TICK_MS_ENV) {
            Some(v) => Duration::from_millis(v.trim().parse().map_err(|_| {
                ConfigError::InvalidValue {
                    name: UPLOAD_TICK_MS_ENV,
                    value: v.clone(),
                }
            })?),
            None => DEFAULT_PROGRESS_INTERVAL,
        };

        let log_mode = match non_empty(LOG_MODE_ENV).as_deref().map(str::trim) {
            None | Some("stderr") => LogMode::Stderr,
            Some("file") => LogMode::File(
                non_empty(LOG_FILE_ENV)
                    .map_or_else(|| PathBuf::from(DEFAULT_LOG_FILE), PathBuf::from),
            ),
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    name: LOG_MODE_ENV,
                    value: other.to_string(),
                })
            }
        };

        Ok(Self {
            db_path,
            progress_interval,
            ledger_contract_id: non_empty(LEDGER_CONTRACT_ENV),
            log_mode,
        })
    }
}

/// Load the codec key from the first configured secure source.
///
/// # Errors
/// Returns `ConfigError::MissingSecret` if no source is configured, or an
/// error if the configured source is unreadable or malformed.
pub fn load_codec_key() -> Result<CodecKey, ConfigError> {
    load_codec_key_with(
        |name| std::env::var(name).ok(),
        Path::new(KEY_DOCKER_SECRET_PATH),
        KdfParams::default(),
    )
}

fn read_secret(path: &Path) -> Result<Zeroizing<String>, ConfigError> {
    let content = Zeroizing::new(std::fs::read_to_string(path).map_err(|source| {
        ConfigError::SecretRead {
            path: path.display().to_string(),
            source,
        }
    })?);

    let secret = content.trim_end_matches(['\n', '\r']);
    if secret.is_empty() {
        return Err(ConfigError::MissingSecret);
    }
    Ok(Zeroizing::new(secret.to_string()))
}

fn load_codec_key_with<F>(
    lookup: F,
    docker_secret: &Path,
    params: KdfParams,
) -> Result<CodecKey, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    // 1) Explicit key file
    if let Some(path) = lookup(KEY_FILE_ENV) {
        let secret = read_secret(Path::new(path.trim()))?;
        return Ok(CodecKey::from_base64(&secret)?);
    }

    // 2) Container secret default path
    if docker_secret.exists() {
        let secret = read_secret(docker_secret)?;
        return Ok(CodecKey::from_base64(&secret)?);
    }

    // 3) Passphrase file, stretched with Argon2id
    if let Some(path) = lookup(PASSPHRASE_FILE_ENV) {
        let passphrase = read_secret(Path::new(path.trim()))?;
        let salt = lookup(KEY_SALT_ENV).unwrap_or_else(|| {
            tracing::warn!("{} not set, using the built-in salt", KEY_SALT_ENV);
            DEFAULT_KEY_SALT.to_string()
        });
        let key = kdf::derive_codec_key(&passphrase, salt.as_bytes(), params)?;
        tracing::info!("Derived codec key from passphrase file");
        return Ok(key);
    }

    // 4) Dev-only env var (refused in release builds)
    if cfg!(debug_assertions) {
        if let Some(value) = lookup(KEY_ENV_DEV) {
            let value = Zeroizing::new(value);
            tracing::warn!("Using codec key from {} (debug builds only)", KEY_ENV_DEV);
            return Ok(CodecKey::from_base64(&value)?);
        }
    }

    Err(ConfigError::MissingSecret)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    fn fast_params() -> KdfParams {
        KdfParams {
            memory_kib: 64,
            iterations: 1,
            parallelism: 1,
        }
    }

    fn no_docker_secret() -> PathBuf {
        PathBuf::from("/nonexistent/hedera_qr_key")
    }

    #[test]
    fn test_config_defaults() {
        let config = AppConfig::from_lookup(|_| None).expect("Should load");
        assert_eq!(config.db_path, PathBuf::from(DEFAULT_DB_PATH));
        assert_eq!(config.progress_interval, DEFAULT_PROGRESS_INTERVAL);
        assert_eq!(config.log_mode, LogMode::Stderr);
        assert!(config.ledger_contract_id.is_none());
    }

    #[test]
    fn test_config_overrides() {
        let config = AppConfig::from_lookup(lookup_from(&[
            (DB_PATH_ENV, "/var/lib/hedera/files.db"),
            (UPLOAD_TICK_MS_ENV, "0"),
            (LEDGER_CONTRACT_ENV, "0.0.5005"),
            (LOG_MODE_ENV, "file"),
            (LOG_FILE_ENV, "/var/log/hedera.log"),
        ]))
        .expect("Should load");

        assert_eq!(config.db_path, PathBuf::from("/var/lib/hedera/files.db"));
        assert_eq!(config.progress_interval, Duration::ZERO);
        assert_eq!(config.ledger_contract_id.as_deref(), Some("0.0.5005"));
        assert_eq!(config.log_mode, LogMode::File(PathBuf::from("/var/log/hedera.log")));
    }

    #[test]
    fn test_config_rejects_bad_values() {
        let bad_tick = AppConfig::from_lookup(lookup_from(&[(UPLOAD_TICK_MS_ENV, "soon")]));
        assert!(matches!(bad_tick, Err(ConfigError::InvalidValue { .. })));

        let bad_mode = AppConfig::from_lookup(lookup_from(&[(LOG_MODE_ENV, "syslog")]));
        assert!(matches!(bad_mode, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_key_from_file() {
        let dir = tempfile::tempdir().expect("Should create temp dir");
        let path = dir.path().join("qr.key");
        let key = CodecKey::generate();
        std::fs::write(&path, format!("{}\n", key.to_base64())).expect("Should write");

        let loaded = load_codec_key_with(
            lookup_from(&[(KEY_FILE_ENV, path.to_str().expect("utf8 path"))]),
            &no_docker_secret(),
            fast_params(),
        )
        .expect("Should load");
        assert_eq!(loaded.as_bytes(), key.as_bytes());
    }

    #[test]
    fn test_key_from_docker_secret() {
        let dir = tempfile::tempdir().expect("Should create temp dir");
        let path = dir.path().join("hedera_qr_key");
        let key = CodecKey::generate();
        std::fs::write(&path, key.to_base64()).expect("Should write");

        let loaded = load_codec_key_with(|_| None, &path, fast_params()).expect("Should load");
        assert_eq!(loaded.fingerprint, key.fingerprint);
    }

    #[test]
    fn test_key_from_passphrase() {
        let dir = tempfile::tempdir().expect("Should create temp dir");
        let path = dir.path().join("passphrase");
        std::fs::write(&path, "correct-horse-battery-staple\n").expect("Should write");
        let path_str = path.to_str().expect("utf8 path");

        let a = load_codec_key_with(
            lookup_from(&[(PASSPHRASE_FILE_ENV, path_str), (KEY_SALT_ENV, "chu-mel-salt")]),
            &no_docker_secret(),
            fast_params(),
        )
        .expect("Should derive");
        let b = kdf::derive_codec_key(
            "correct-horse-battery-staple",
            b"chu-mel-salt",
            fast_params(),
        )
        .expect("Should derive");
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_missing_and_empty_secrets() {
        let missing = load_codec_key_with(|_| None, &no_docker_secret(), fast_params());
        assert!(matches!(missing, Err(ConfigError::MissingSecret)));

        let dir = tempfile::tempdir().expect("Should create temp dir");
        let path = dir.path().join("empty.key");
        std::fs::write(&path, "\n").expect("Should write");
        let empty = load_codec_key_with(
            lookup_from(&[(KEY_FILE_ENV, path.to_str().expect("utf8 path"))]),
            &no_docker_secret(),
            fast_params(),
        );
        assert!(matches!(empty, Err(ConfigError::MissingSecret)));

        let unreadable = load_codec_key_with(
            lookup_from(&[(KEY_FILE_ENV, "/nonexistent/qr.key")]),
            &no_docker_secret(),
            fast_params(),
        );
        assert!(matches!(unreadable, Err(ConfigError::SecretRead { .. })));
    }

    #[test]
    fn test_malformed_key_file() {
        let dir = tempfile::tempdir().expect("Should create temp dir");
        let path = dir.path().join("bad.key");
        std::fs::write(&path, "c2hvcnQ=").expect("Should write");

        let result = load_codec_key_with(
            lookup_from(&[(KEY_FILE_ENV, path.to_str().expect("utf8 path"))]),
            &no_docker_secret(),
            fast_params(),
        );
        assert!(matches!(result, Err(ConfigError::InvalidKey(_))));
    }

    #[test]
    fn test_dev_env_key() {
        let key = CodecKey::generate();
        let encoded = key.to_base64();
        let result = load_codec_key_with(
            lookup_from(&[(KEY_ENV_DEV, encoded.as_str())]),
            &no_docker_secret(),
            fast_params(),
        );

        if cfg!(debug_assertions) {
            assert_eq!(result.expect("Should load").as_bytes(), key.as_bytes());
        } else {
            assert!(matches!(result, Err(ConfigError::MissingSecret)));
        }
    }
}

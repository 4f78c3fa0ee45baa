//! # Hedera Health
//!
//! Patient identity QR codes and local document cataloguing for the
//! Hedera Health ID hospital record system.
//!
//! This crate provides:
//! - An encrypted, versioned, expiring QR payload codec for patient identity
//! - A local file registry with size/type validation and patient scoping
//! - A thin gateway to the ledger-network client for identity contracts
//!
//! ## Architecture
//!
//! The crate follows Hexagonal Architecture:
//! - `domain`: Core business types (QR payload, file records, codec keys)
//! - `ports`: Trait definitions for external operations
//! - `adapters`: Concrete implementations (SQLite, qrcode, log sanitizer)
//! - `application`: Use cases orchestrating domain and ports
//! - `config`: Environment-driven configuration and secret loading

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;

pub use application::{FileRegistry, LedgerGateway, QrCodec};
pub use domain::{FileRecord, PatientIdentity, QrPayload, UploadFile};

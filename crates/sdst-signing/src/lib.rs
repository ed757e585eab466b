//! Multi-key signing for text and JSON.
//!
//! Keys live in a [`KeyDatabase`] and are identified by a [`KeyId`], the
//! URL-safe base64 SHA-256 of the DER public key. A [`SignatureEngine`]
//! signs and verifies through a [`provider::CryptoProvider`] that performs
//! one operation at a time.
//!
//! Two envelope formats are supported:
//!
//! - [`jsr`]: JSON Sign Requests carrying data, negotiation terms and a list
//!   of signatures. Structured data is signed in canonical form.
//! - [`plain_text`]: signature blocks appended below a text, which may be
//!   stacked and are verified from the outermost layer inwards.
//!
//! # Signing a JSON Sign Request
//!
//! ```
//! use sdst_signing::jsr::{self, JsonSignRequest, JsrPurpose, JsrSignOptions};
//! use sdst_signing::provider::{ProviderHandle, RustCryptoProvider};
//! use sdst_signing::{KeyDatabase, SignatureEngine};
//!
//! let engine = SignatureEngine::new(ProviderHandle::new(RustCryptoProvider::new()));
//! let mut db = KeyDatabase::new();
//! let key = engine.generate_key(&mut db, "ed25519", Some("me"), None).unwrap();
//!
//! let request = JsonSignRequest::parse(
//!     r#"{"data": {"amount": 10}, "acceptedAlgorithms": ["ed25519"]}"#,
//!     JsrPurpose::Sign,
//! )
//! .unwrap();
//! let signed = jsr::sign_json_request(&engine, &db, Some(&key), request, &JsrSignOptions::default()).unwrap();
//! assert!(jsr::verify_json_request(&engine, &db, signed).all_valid());
//! ```
//!
//! # Storage
//!
//! [`container`] reads and writes database files, optionally encrypted with
//! a password. [`config::SigningConfig`] holds user preferences.

pub mod algorithm;
pub mod canonical;
pub mod config;
pub mod container;
pub mod database;
pub mod engine;
pub mod error;
pub mod identity;
pub mod jsr;
pub mod pem;
pub mod plain_text;
pub mod provider;
pub mod resolve;

pub use algorithm::Algorithm;
pub use algorithm::DigestMethod;
pub use config::SigningConfig;
pub use database::Key;
pub use database::KeyDatabase;
pub use engine::SignatureEngine;
pub use error::Result;
pub use error::SigningError;
pub use identity::KeyId;

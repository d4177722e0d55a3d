//! A JOSE engine: JWE encryption and JWS signing.
//!
//! This crate builds, serializes, parses, decrypts and verifies JSON Web
//! Encryption (RFC 7516) and JSON Web Signature (RFC 7515) tokens, using the
//! algorithms of RFC 7518 and EdDSA from RFC 8037.
//!
//! # Architecture
//!
//! The crate is organized into these main modules:
//! - `key`: JSON Web Keys and key sets
//! - `header`: JOSE headers, merging and `crit` processing
//! - `registry`: Algorithm lookup by name, built from an `EngineConfig`
//! - `jwe`: Key management, content encryption, building and decryption
//! - `jws`: Signature algorithms, building and verification
//! - `config`: Engine tunables
//! - `error`: Error types and handling
//!
//! Key management algorithms are grouped by mode (direct, key encryption,
//! key wrapping, key agreement and key agreement with wrapping); the
//! builder and decrypter dispatch on the mode without knowing individual
//! algorithms.
//!
//! # Examples
//!
//! ```rust
//! use jose_engine_core::header::Header;
//! use jose_engine_core::jwe::{Jwe, JweBuilder, JweDecrypter};
//! use jose_engine_core::key::Key;
//! use jose_engine_core::registry::AlgorithmRegistry;
//! use jose_engine_core::Serialization;
//!
//! let registry = AlgorithmRegistry::with_defaults().unwrap();
//! let key = Key::generate_oct(128).unwrap();
//!
//! let jwe = JweBuilder::new(&registry)
//!     .payload(b"Live long and prosper.".to_vec())
//!     .shared_protected_header(Header::new().with("alg", "A128KW").with("enc", "A128GCM"))
//!     .add_recipient(&key, Header::new())
//!     .build()
//!     .unwrap();
//!
//! let token = jwe.serialize(Serialization::Compact, 0).unwrap();
//! let parsed: Jwe = token.parse().unwrap();
//! let decrypted = JweDecrypter::new(&registry).decrypt_with_key(&parsed, &key).unwrap();
//! assert_eq!(decrypted.payload, b"Live long and prosper.");
//! ```
//!
//! # Security Considerations
//!
//! - `RSA1_5` is registered by default for interoperability; disable it
//!   with `allow_rsa1_5: false` when it is not needed
//! - Decryption failures that depend on the key are reported as a single
//!   `Error::Cryptographic` without detail
//! - Secret key material is zeroized when keys and content encryption keys
//!   are dropped

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod header;
pub mod jwe;
pub mod jws;
pub mod key;
pub mod registry;
pub mod utils;

#[cfg(test)]
pub(crate) mod tests;

pub use config::EngineConfig;
pub use error::{Error, Result};
pub use header::Header;
pub use jwe::Serialization;
pub use key::{Key, KeySet};
pub use registry::AlgorithmRegistry;

//! JWS (JSON Web Signature, RFC 7515), including the unencoded payload
//! option of RFC 7797 and detached payloads.
//!
//! # Examples
//!
//! ```rust
//! use jose_engine_core::header::Header;
//! use jose_engine_core::jws::{Jws, JwsBuilder, JwsVerifier};
//! use jose_engine_core::key::Key;
//! use jose_engine_core::registry::AlgorithmRegistry;
//! use jose_engine_core::Serialization;
//!
//! let registry = AlgorithmRegistry::with_defaults().unwrap();
//! let key = Key::generate_ed25519();
//!
//! let jws = JwsBuilder::new(&registry)
//!     .payload(b"In the beginning".to_vec(), false)
//!     .add_signature(&key, Header::new().with("alg", "EdDSA"), Header::new())
//!     .build()
//!     .unwrap();
//!
//! let compact = jws.serialize(Serialization::Compact, 0).unwrap();
//! let parsed: Jws = compact.parse().unwrap();
//! let public = key.to_public().unwrap();
//! JwsVerifier::new(&registry)
//!     .verify_with_key(&parsed, &public, 0, None)
//!     .unwrap();
//! ```

use serde_json::Value;

use crate::error::{Error, Result};
use crate::header::Header;
use crate::utils::b64_encode;

pub mod algorithms;
pub mod builder;
pub mod serializer;
pub mod verifier;

pub use self::algorithms::SignatureAlgorithm;
pub use self::builder::JwsBuilder;
pub use self::verifier::JwsVerifier;

/// One signature over the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub(crate) protected: Header,
    pub(crate) encoded_protected: String,
    pub(crate) header: Header,
    pub(crate) signature: Vec<u8>,
}

impl Signature {
    /// The integrity-protected header.
    #[must_use]
    pub fn protected(&self) -> &Header {
        &self.protected
    }

    /// The protected header exactly as it appears on the wire.
    #[must_use]
    pub fn encoded_protected(&self) -> &str {
        &self.encoded_protected
    }

    /// The unprotected header.
    #[must_use]
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// The raw signature bytes.
    #[must_use]
    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    /// Whether the payload is base64url-encoded in the signing input.
    ///
    /// This is `false` only when the protected header carries `"b64": false`.
    #[must_use]
    pub fn is_payload_encoded(&self) -> bool {
        self.protected.get("b64").and_then(Value::as_bool).unwrap_or(true)
    }

    /// The union of the protected and unprotected headers.
    ///
    /// # Errors
    ///
    /// * `Error::Structural` - If a parameter appears in both
    pub fn complete_header(&self) -> Result<Header> {
        Header::merge(&[&self.protected, &self.header])
    }
}

/// A signed JWS token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Jws {
    pub(crate) payload: Option<Vec<u8>>,
    pub(crate) signatures: Vec<Signature>,
}

impl Jws {
    /// The payload, `None` when detached.
    #[must_use]
    pub fn payload(&self) -> Option<&[u8]> {
        self.payload.as_deref()
    }

    /// All signatures, in order.
    #[must_use]
    pub fn signatures(&self) -> &[Signature] {
        &self.signatures
    }

    pub(crate) fn signature_at(&self, index: usize) -> Result<&Signature> {
        self.signatures
            .get(index)
            .ok_or_else(|| Error::structural(format!("no signature at index {index}")))
    }

    /// Whether the payload is base64url-encoded, taken from the first
    /// signature. Every signature of a token agrees on it.
    pub(crate) fn is_payload_encoded(&self) -> bool {
        self.signatures
            .first()
            .map_or(true, Signature::is_payload_encoded)
    }
}

/// Validates `b64` in a signature's headers and returns its value.
///
/// `b64` must be a boolean in the protected header and, when present, be
/// listed in `crit`.
pub(crate) fn payload_encoding(protected: &Header, unprotected: &Header) -> Result<bool> {
    if unprotected.contains("b64") {
        return Err(Error::structural("b64 must be integrity protected"));
    }
    match protected.get("b64") {
        None => Ok(true),
        Some(Value::Bool(encoded)) => {
            if crate::header::is_critical(protected, "b64") {
                Ok(*encoded)
            } else {
                Err(Error::structural("b64 must be listed in crit"))
            }
        }
        Some(_) => Err(Error::structural("b64 must be a boolean")),
    }
}

/// `ASCII(encoded protected header) || "." || payload part`.
pub(crate) fn signing_input(encoded_protected: &str, payload: &[u8], encoded: bool) -> Vec<u8> {
    let mut input = Vec::with_capacity(encoded_protected.len() + 1 + payload.len() * 4 / 3 + 4);
    input.extend_from_slice(encoded_protected.as_bytes());
    input.push(b'.');
    if encoded {
        input.extend_from_slice(b64_encode(payload).as_bytes());
    } else {
        input.extend_from_slice(payload);
    }
    input
}

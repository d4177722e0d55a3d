//! JWE (JSON Web Encryption, RFC 7516).
//!
//! A [`Jwe`] is produced by a [`JweBuilder`], consumed by a [`JweDecrypter`]
//! and moved to and from wire text by the serializer. Algorithms are looked
//! up by name in an [`AlgorithmRegistry`](crate::registry::AlgorithmRegistry).
//!
//! # Key management
//!
//! Every `alg` falls in one of five modes, see [`KeyManagementMode`]:
//! - `dir`
//! - `RSA1_5`, `RSA-OAEP`, `RSA-OAEP-256`
//! - `A128KW`/`A192KW`/`A256KW`, `A128GCMKW`/`A192GCMKW`/`A256GCMKW` and the
//!   PBES2 family
//! - `ECDH-ES` and `ECDH-SS`
//! - `ECDH-ES+AxxxKW` and `ECDH-SS+AxxxKW`
//!
//! # Examples
//!
//! ```rust
//! use jose_engine_core::header::Header;
//! use jose_engine_core::jwe::{JweBuilder, JweDecrypter, Jwe, Serialization};
//! use jose_engine_core::key::Key;
//! use jose_engine_core::registry::AlgorithmRegistry;
//!
//! let registry = AlgorithmRegistry::with_defaults().unwrap();
//! let key = Key::generate_oct(128).unwrap();
//!
//! let jwe = JweBuilder::new(&registry)
//!     .payload(b"Live long and prosper.".to_vec())
//!     .shared_protected_header(Header::new().with("enc", "A128GCM"))
//!     .add_recipient(&key, Header::new().with("alg", "A128KW"))
//!     .build()
//!     .unwrap();
//!
//! let compact = jwe.serialize(Serialization::Compact, 0).unwrap();
//! let parsed: Jwe = compact.parse().unwrap();
//! let decrypted = JweDecrypter::new(&registry).decrypt_with_key(&parsed, &key).unwrap();
//! assert_eq!(decrypted.payload, b"Live long and prosper.");
//! ```
//!
//! # Security Considerations
//!
//! - Decryption failures never say which step failed
//! - CEKs are zeroized when dropped
//! - Compression (`zip`) is refused

use crate::error::{Error, Result};
use crate::header::Header;
use crate::utils::b64_encode;

pub mod builder;
pub mod concat_kdf;
pub mod content;
pub mod curve;
pub mod decrypter;
pub mod direct;
pub mod key_agreement;
pub mod key_wrapping;
pub mod rsa;
pub mod serializer;
pub mod types;

pub use self::builder::JweBuilder;
pub use self::content::ContentEncryptionAlgorithm;
pub use self::decrypter::{Decrypted, JweDecrypter};
pub use self::serializer::Serialization;
pub use self::types::{Cek, KeyManagement, KeyManagementAlgorithm, KeyManagementMode};

/// One recipient of a JWE.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Recipient {
    header: Header,
    encrypted_key: Vec<u8>,
}

impl Recipient {
    pub(crate) fn new(header: Header, encrypted_key: Vec<u8>) -> Self {
        Self {
            header,
            encrypted_key,
        }
    }

    /// The per-recipient unprotected header.
    #[must_use]
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// The encrypted CEK, empty for `dir` and direct key agreement.
    #[must_use]
    pub fn encrypted_key(&self) -> &[u8] {
        &self.encrypted_key
    }
}

/// An encrypted JWE token.
///
/// Tokens are immutable. The encoded protected header is kept exactly as
/// produced or parsed, since it is authenticated as part of the AAD.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Jwe {
    pub(crate) ciphertext: Vec<u8>,
    pub(crate) iv: Vec<u8>,
    pub(crate) tag: Vec<u8>,
    pub(crate) aad: Option<Vec<u8>>,
    pub(crate) shared_protected_header: Header,
    pub(crate) encoded_protected_header: String,
    pub(crate) shared_header: Header,
    pub(crate) recipients: Vec<Recipient>,
}

impl Jwe {
    /// The encrypted payload.
    #[must_use]
    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    /// The content encryption IV.
    #[must_use]
    pub fn iv(&self) -> &[u8] {
        &self.iv
    }

    /// The authentication tag.
    #[must_use]
    pub fn tag(&self) -> &[u8] {
        &self.tag
    }

    /// Additional authenticated data supplied by the sender.
    #[must_use]
    pub fn aad(&self) -> Option<&[u8]> {
        self.aad.as_deref()
    }

    /// The integrity-protected header shared by all recipients.
    #[must_use]
    pub fn shared_protected_header(&self) -> &Header {
        &self.shared_protected_header
    }

    /// The protected header exactly as it appears on the wire, empty if
    /// there is none.
    #[must_use]
    pub fn encoded_protected_header(&self) -> &str {
        &self.encoded_protected_header
    }

    /// The unprotected header shared by all recipients.
    #[must_use]
    pub fn shared_header(&self) -> &Header {
        &self.shared_header
    }

    /// All recipients, in order.
    #[must_use]
    pub fn recipients(&self) -> &[Recipient] {
        &self.recipients
    }

    /// The union of the protected, shared and per-recipient headers.
    ///
    /// # Errors
    ///
    /// * `Error::Structural` - If the index is out of range or a parameter
    ///   appears in more than one header
    pub fn complete_header(&self, recipient_index: usize) -> Result<Header> {
        let recipient = self.recipient(recipient_index)?;
        Header::merge(&[
            &self.shared_protected_header,
            &self.shared_header,
            &recipient.header,
        ])
    }

    pub(crate) fn recipient(&self, index: usize) -> Result<&Recipient> {
        self.recipients
            .get(index)
            .ok_or_else(|| Error::structural(format!("no recipient at index {index}")))
    }

    /// The AAD bound by content encryption.
    pub(crate) fn content_aad(&self) -> Vec<u8> {
        content_aad(&self.encoded_protected_header, self.aad.as_deref())
    }
}

/// `ASCII(encoded protected header)`, followed by `"." || b64(aad)` when
/// additional data is present.
pub(crate) fn content_aad(encoded_protected_header: &str, aad: Option<&[u8]>) -> Vec<u8> {
    let mut input = encoded_protected_header.as_bytes().to_vec();
    if let Some(aad) = aad {
        input.push(b'.');
        input.extend_from_slice(b64_encode(aad).as_bytes());
    }
    input
}

/// Rejects compressed content.
pub(crate) fn reject_compression(headers: &[&Header]) -> Result<()> {
    if headers.iter().any(|header| header.contains("zip")) {
        return Err(Error::unsupported("zip"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_content_aad() {
        assert_eq!(content_aad("eyJhbGciOiJkaXIifQ", None), b"eyJhbGciOiJkaXIifQ");
        assert_eq!(content_aad("", Some(b"aad")), b".YWFk");
    }

    #[test]
    fn test_complete_header_detects_duplicates() {
        let jwe = Jwe {
            ciphertext: Vec::new(),
            iv: Vec::new(),
            tag: Vec::new(),
            aad: None,
            shared_protected_header: Header::new().with("enc", "A128GCM"),
            encoded_protected_header: String::new(),
            shared_header: Header::new().with("jku", "https://example.com"),
            recipients: vec![
                Recipient::new(Header::new().with("alg", "A128KW"), Vec::new()),
                Recipient::new(Header::new().with("enc", "A256GCM"), Vec::new()),
            ],
        };
        let complete = jwe.complete_header(0).unwrap();
        assert_eq!(complete.get_str("alg"), Some("A128KW"));
        assert_eq!(complete.get_str("enc"), Some("A128GCM"));
        assert!(matches!(jwe.complete_header(1), Err(Error::Structural(_))));
        assert!(matches!(jwe.complete_header(2), Err(Error::Structural(_))));
    }

    #[test]
    fn test_reject_compression() {
        let plain = Header::new().with("alg", "dir");
        assert!(reject_compression(&[&plain]).is_ok());
        let zipped = Header::new().with("zip", "DEF");
        assert!(matches!(
            reject_compression(&[&plain, &zipped]),
            Err(Error::UnsupportedAlgorithm(name)) if name == "zip"
        ));
    }
}

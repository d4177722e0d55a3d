//! Capability traits for JWE key management.
//!
//! Each key-management algorithm implements [`KeyManagementAlgorithm`] and
//! exactly one capability trait, exposed through the closed
//! [`KeyManagement`] enum. Orchestration dispatches on that enum and never on
//! algorithm names.
//!
//! Header parameters an algorithm needs to publish (`epk`, `iv`, `tag`,
//! `p2s`, `p2c`) are returned next to the result, never written into a
//! caller-owned header.
//!
//! # Security Considerations
//!
//! - Keys are checked against [`KeyManagementAlgorithm::allowed_key_types`]
//!   before any cryptographic step
//! - Recovered CEKs are returned in [`Zeroizing`] buffers

use std::fmt;

use zeroize::Zeroizing;

use crate::error::{Error, Result};
use crate::header::Header;
use crate::key::{Key, KeyType};

/// A content encryption key.
pub type Cek = Zeroizing<Vec<u8>>;

/// How a recipient obtains or protects the CEK.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyManagementMode {
    /// The key is the CEK
    Direct,
    /// The CEK is encrypted with an asymmetric key
    Encrypt,
    /// The CEK is wrapped with a symmetric key
    Wrap,
    /// The CEK is derived from a shared secret
    Agreement,
    /// A derived key wraps a random CEK
    AgreementWrap,
}

impl KeyManagementMode {
    /// Whether the recipient computes the CEK rather than protecting one.
    #[must_use]
    pub fn provides_cek(self) -> bool {
        matches!(self, Self::Direct | Self::Agreement)
    }
}

/// Direct use of a shared symmetric key.
pub trait DirectEncryption {
    /// Returns the CEK held by `key`.
    ///
    /// # Errors
    ///
    /// * `Error::KeyFormat` - If the key has no usable `k`
    fn cek(&self, key: &Key) -> Result<Cek>;
}

/// Asymmetric encryption of the CEK.
pub trait KeyEncryption {
    /// Encrypts the CEK for `key`.
    ///
    /// # Errors
    ///
    /// Fails on malformed keys or when randomness is unavailable.
    fn encrypt_key(&self, key: &Key, cek: &[u8], header: &Header) -> Result<(Vec<u8>, Header)>;

    /// Recovers the CEK with the private `key`.
    ///
    /// # Errors
    ///
    /// * `Error::Cryptographic` - For every decryption failure
    fn decrypt_key(&self, key: &Key, encrypted_key: &[u8], header: &Header) -> Result<Cek>;
}

/// Symmetric wrapping of the CEK.
pub trait KeyWrapping {
    /// Wraps the CEK under `key`.
    ///
    /// # Errors
    ///
    /// Fails on malformed keys or when randomness is unavailable.
    fn wrap_key(&self, key: &Key, cek: &[u8], header: &Header) -> Result<(Vec<u8>, Header)>;

    /// Unwraps the CEK with `key`.
    ///
    /// # Errors
    ///
    /// * `Error::Cryptographic` - If the integrity check fails
    fn unwrap_key(&self, key: &Key, encrypted_key: &[u8], header: &Header) -> Result<Cek>;
}

/// Derivation of the CEK by key agreement.
pub trait KeyAgreement {
    /// Derives a `key_bits` CEK for content algorithm `enc`.
    ///
    /// A public `recipient_key` selects the sending side, which returns the
    /// `epk` to publish. A private one selects the receiving side, which
    /// reads `epk` from `header`.
    ///
    /// # Errors
    ///
    /// * `Error::KeyFormat` - On malformed keys
    /// * `Error::Cryptographic` - On curve mismatch or invalid points
    fn agreement_key(
        &self,
        key_bits: usize,
        enc: &str,
        recipient_key: &Key,
        sender_key: Option<&Key>,
        header: &Header,
    ) -> Result<(Cek, Header)>;
}

/// Key agreement followed by key wrapping of a random CEK.
pub trait KeyAgreementWrapping {
    /// Derives a wrapping key and wraps `cek` with it.
    ///
    /// # Errors
    ///
    /// * `Error::KeyFormat` - On malformed keys
    fn wrap_agreement_key(
        &self,
        recipient_key: &Key,
        sender_key: Option<&Key>,
        cek: &[u8],
        enc: &str,
        header: &Header,
    ) -> Result<(Vec<u8>, Header)>;

    /// Derives the wrapping key and unwraps the CEK.
    ///
    /// # Errors
    ///
    /// * `Error::Cryptographic` - On any agreement or unwrap failure
    fn unwrap_agreement_key(
        &self,
        recipient_key: &Key,
        encrypted_key: &[u8],
        enc: &str,
        header: &Header,
    ) -> Result<Cek>;
}

/// The capability an algorithm offers, one variant per mode.
pub enum KeyManagement<'a> {
    /// See [`DirectEncryption`]
    Direct(&'a dyn DirectEncryption),
    /// See [`KeyEncryption`]
    Encrypt(&'a dyn KeyEncryption),
    /// See [`KeyWrapping`]
    Wrap(&'a dyn KeyWrapping),
    /// See [`KeyAgreement`]
    Agreement(&'a dyn KeyAgreement),
    /// See [`KeyAgreementWrapping`]
    AgreementWrap(&'a dyn KeyAgreementWrapping),
}

/// A JWE `alg` implementation.
pub trait KeyManagementAlgorithm: Send + Sync + fmt::Debug {
    /// The JOSE `alg` name.
    fn name(&self) -> &'static str;

    /// Key types the algorithm accepts.
    fn allowed_key_types(&self) -> &'static [KeyType];

    /// The algorithm's capability.
    fn management(&self) -> KeyManagement<'_>;

    /// The mode tag of [`KeyManagementAlgorithm::management`].
    fn mode(&self) -> KeyManagementMode {
        match self.management() {
            KeyManagement::Direct(_) => KeyManagementMode::Direct,
            KeyManagement::Encrypt(_) => KeyManagementMode::Encrypt,
            KeyManagement::Wrap(_) => KeyManagementMode::Wrap,
            KeyManagement::Agreement(_) => KeyManagementMode::Agreement,
            KeyManagement::AgreementWrap(_) => KeyManagementMode::AgreementWrap,
        }
    }

    /// Rejects keys of a type the algorithm cannot use.
    ///
    /// # Errors
    ///
    /// * `Error::KeyFormat` - If the key type is not allowed
    fn check_key(&self, key: &Key) -> Result<()> {
        if self.allowed_key_types().contains(&key.key_type()) {
            Ok(())
        } else {
            Err(Error::key_format(format!(
                "{} does not accept {} keys",
                self.name(),
                key.key_type()
            )))
        }
    }

    /// Validates algorithm parameters in a received header before any key
    /// is tried.
    ///
    /// # Errors
    ///
    /// * `Error::Structural` - If a mandatory parameter is missing or invalid
    fn check_decryption_header(&self, _header: &Header) -> Result<()> {
        Ok(())
    }
}

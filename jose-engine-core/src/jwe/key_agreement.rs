//! Elliptic-curve key agreement: the `ECDH-ES` and `ECDH-SS` families.
//!
//! Both sides compute the raw ECDH secret with [`shared_secret`] and pass it
//! through the Concat KDF. In direct agreement the derived key is the CEK;
//! in the `+AxxxKW` variants it wraps a random CEK with AES Key Wrap.
//!
//! The sender publishes its public key as `epk`. For `ECDH-ES` this is a
//! fresh ephemeral key, for `ECDH-SS` the sender's static key.
//!
//! # Security Considerations
//!
//! - Recipient and sender keys must be on the same curve
//! - X25519 results that are all zero are rejected
//! - Derived keys are zeroized when dropped

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;
use zeroize::Zeroizing;

use super::concat_kdf::concat_kdf;
use super::curve::{shared_secret, ScalarMultiplier};
use super::key_wrapping::{aes_kw_unwrap, aes_kw_wrap};
use super::types::{
    Cek, KeyAgreement, KeyAgreementWrapping, KeyManagement, KeyManagementAlgorithm,
};
use crate::error::{Error, Result};
use crate::header::Header;
use crate::key::{Key, KeyType};

/// ECDH key agreement, optionally followed by AES Key Wrap.
#[derive(Debug, Clone)]
pub struct EcdhEs {
    wrap_bits: Option<usize>,
    static_sender: bool,
    multiplier: Arc<dyn ScalarMultiplier>,
}

impl EcdhEs {
    /// `ECDH-ES`, or `ECDH-ES+AxxxKW` when `wrap_bits` is set.
    ///
    /// # Errors
    ///
    /// * `Error::UnsupportedAlgorithm` - If `wrap_bits` is not 128, 192 or 256
    pub fn ephemeral(
        wrap_bits: Option<usize>,
        multiplier: Arc<dyn ScalarMultiplier>,
    ) -> Result<Self> {
        Self::build(wrap_bits, false, multiplier)
    }

    /// `ECDH-SS`, or `ECDH-SS+AxxxKW` when `wrap_bits` is set.
    ///
    /// # Errors
    ///
    /// * `Error::UnsupportedAlgorithm` - If `wrap_bits` is not 128, 192 or 256
    pub fn static_sender(
        wrap_bits: Option<usize>,
        multiplier: Arc<dyn ScalarMultiplier>,
    ) -> Result<Self> {
        Self::build(wrap_bits, true, multiplier)
    }

    fn build(
        wrap_bits: Option<usize>,
        static_sender: bool,
        multiplier: Arc<dyn ScalarMultiplier>,
    ) -> Result<Self> {
        if let Some(bits) = wrap_bits {
            if !matches!(bits, 128 | 192 | 256) {
                return Err(Error::unsupported(format!("ECDH with A{bits}KW")));
            }
        }
        Ok(Self {
            wrap_bits,
            static_sender,
            multiplier,
        })
    }

    /// Parses `epk` from a received header.
    fn peer_key(header: &Header) -> Result<Key> {
        match header.get("epk") {
            Some(Value::Object(params)) => Key::new(params.clone())
                .map_err(|e| Error::structural(format!("invalid epk: {e}"))),
            Some(_) => Err(Error::structural("epk must be a JSON object")),
            None => Err(Error::structural("missing header parameter epk")),
        }
    }

    /// Runs the agreement and the KDF.
    ///
    /// Returns the derived key and, on the sending side, the `epk` header.
    fn derive(
        &self,
        algorithm_id: &str,
        key_bits: usize,
        recipient_key: &Key,
        sender_key: Option<&Key>,
        header: &Header,
    ) -> Result<(Zeroizing<Vec<u8>>, Header)> {
        self.check_key(recipient_key)?;

        let (z, extra) = if recipient_key.is_private() {
            let peer = Self::peer_key(header)?;
            let z = shared_secret(self.multiplier.as_ref(), recipient_key, &peer)?;
            (z, Header::new())
        } else {
            let generated;
            let sender = match sender_key {
                Some(key) => key,
                None if self.static_sender => {
                    return Err(Error::key_format(format!(
                        "{} requires a sender key",
                        self.name()
                    )))
                }
                None => {
                    generated = Key::generate_ec(recipient_key.curve()?)?;
                    &generated
                }
            };
            self.check_key(sender)?;
            if !sender.is_private() {
                return Err(Error::key_format("sender key has no private part"));
            }
            let z = shared_secret(self.multiplier.as_ref(), sender, recipient_key)?;
            let epk = serde_json::to_value(sender.to_public()?)?;
            (z, Header::new().with("epk", epk))
        };

        let apu = header.decode_optional("apu")?;
        let apv = header.decode_optional("apv")?;
        debug!(alg = self.name(), algorithm_id, key_bits, "deriving agreement key");
        Ok((concat_kdf(&z, algorithm_id, key_bits, &apu, &apv), extra))
    }
}

impl KeyAgreement for EcdhEs {
    fn agreement_key(
        &self,
        key_bits: usize,
        enc: &str,
        recipient_key: &Key,
        sender_key: Option<&Key>,
        header: &Header,
    ) -> Result<(Cek, Header)> {
        self.derive(enc, key_bits, recipient_key, sender_key, header)
    }
}

impl KeyAgreementWrapping for EcdhEs {
    fn wrap_agreement_key(
        &self,
        recipient_key: &Key,
        sender_key: Option<&Key>,
        cek: &[u8],
        _enc: &str,
        header: &Header,
    ) -> Result<(Vec<u8>, Header)> {
        let bits = self.wrap_bits.unwrap_or(256);
        let (kek, extra) = self.derive(self.name(), bits, recipient_key, sender_key, header)?;
        Ok((aes_kw_wrap(&kek, cek)?, extra))
    }

    fn unwrap_agreement_key(
        &self,
        recipient_key: &Key,
        encrypted_key: &[u8],
        _enc: &str,
        header: &Header,
    ) -> Result<Cek> {
        let bits = self.wrap_bits.unwrap_or(256);
        let (kek, _) = self.derive(self.name(), bits, recipient_key, None, header)?;
        aes_kw_unwrap(&kek, encrypted_key)
    }
}

impl KeyManagementAlgorithm for EcdhEs {
    fn name(&self) -> &'static str {
        match (self.static_sender, self.wrap_bits) {
            (false, None) => "ECDH-ES",
            (false, Some(128)) => "ECDH-ES+A128KW",
            (false, Some(192)) => "ECDH-ES+A192KW",
            (false, Some(_)) => "ECDH-ES+A256KW",
            (true, None) => "ECDH-SS",
            (true, Some(128)) => "ECDH-SS+A128KW",
            (true, Some(192)) => "ECDH-SS+A192KW",
            (true, Some(_)) => "ECDH-SS+A256KW",
        }
    }

    fn allowed_key_types(&self) -> &'static [KeyType] {
        &[KeyType::Ec, KeyType::Okp]
    }

    fn management(&self) -> KeyManagement<'_> {
        if self.wrap_bits.is_some() {
            KeyManagement::AgreementWrap(self)
        } else {
            KeyManagement::Agreement(self)
        }
    }

    fn check_decryption_header(&self, header: &Header) -> Result<()> {
        Self::peer_key(header).map(|_| ())
    }
}

//! JWE decryption.
//!
//! Decryption runs in two phases. Checks that do not depend on a key
//! (header layout, `crit`, algorithm names, mandatory algorithm parameters)
//! come first and end the attempt on failure. Then every recipient is tried
//! with every candidate key, in order, until one pair authenticates the
//! content.
//!
//! # Security Considerations
//!
//! - A failed candidate is indistinguishable from any other: when nothing
//!   decrypts, the result is always `Error::Cryptographic`
//! - Logs carry recipient and key indices only

use std::sync::Arc;

use tracing::{debug, trace};

use super::content::ContentEncryptionAlgorithm;
use super::types::{Cek, KeyManagement, KeyManagementAlgorithm};
use super::{reject_compression, Jwe, Recipient};
use crate::error::{Error, Result};
use crate::header::{check_critical, Header};
use crate::key::{Key, KeySet};
use crate::registry::AlgorithmRegistry;
use crate::utils::random_secret;

/// The outcome of a successful decryption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decrypted {
    /// The plaintext
    pub payload: Vec<u8>,
    /// Index of the recipient whose encrypted key was used
    pub recipient_index: usize,
    /// Index of the key that recovered the CEK
    pub key_index: usize,
}

/// A recipient that passed the key-independent checks.
struct Candidate<'j> {
    recipient: &'j Recipient,
    algorithm: Arc<dyn KeyManagementAlgorithm>,
    enc: Arc<dyn ContentEncryptionAlgorithm>,
    complete: Header,
}

/// Decrypts [`Jwe`] tokens with algorithms from a registry.
#[derive(Debug, Clone, Copy)]
pub struct JweDecrypter<'a> {
    registry: &'a AlgorithmRegistry,
}

impl<'a> JweDecrypter<'a> {
    /// Creates a decrypter over `registry`.
    #[must_use]
    pub fn new(registry: &'a AlgorithmRegistry) -> Self {
        Self { registry }
    }

    /// Decrypts with a single key.
    ///
    /// # Errors
    ///
    /// See [`JweDecrypter::decrypt_with_key_set`].
    pub fn decrypt_with_key(&self, jwe: &Jwe, key: &Key) -> Result<Decrypted> {
        self.decrypt_with_keys(jwe, &[key])
    }

    /// Decrypts with the first key of `keys` that works for any recipient.
    ///
    /// # Errors
    ///
    /// * `Error::Structural` - If the headers are malformed, a parameter is
    ///   duplicated, `crit` is violated or an algorithm parameter is missing
    /// * `Error::UnsupportedAlgorithm` - If `alg`, `enc` or `zip` is not
    ///   supported
    /// * `Error::Cryptographic` - If no recipient and key pair decrypts
    pub fn decrypt_with_key_set(&self, jwe: &Jwe, keys: &KeySet) -> Result<Decrypted> {
        let keys: Vec<&Key> = keys.iter().collect();
        self.decrypt_with_keys(jwe, &keys)
    }

    fn decrypt_with_keys(&self, jwe: &Jwe, keys: &[&Key]) -> Result<Decrypted> {
        let candidates = self.prepare(jwe)?;
        let aad = jwe.content_aad();
        debug!(
            recipients = candidates.len(),
            keys = keys.len(),
            "decrypting JWE"
        );

        for (recipient_index, candidate) in candidates.iter().enumerate() {
            for (key_index, key) in keys.iter().enumerate() {
                let attempt = recover_cek_or_substitute(candidate, key).and_then(|cek| {
                    if cek.len() * 8 != candidate.enc.cek_size() {
                        return Err(Error::Cryptographic);
                    }
                    candidate
                        .enc
                        .decrypt(&cek, &jwe.iv, &aad, &jwe.ciphertext, &jwe.tag)
                });
                match attempt {
                    Ok(payload) => {
                        debug!(recipient_index, key_index, "JWE decrypted");
                        return Ok(Decrypted {
                            payload,
                            recipient_index,
                            key_index,
                        });
                    }
                    Err(_) => trace!(recipient_index, key_index, "candidate rejected"),
                }
            }
        }
        Err(Error::Cryptographic)
    }

    /// Runs every key-independent check.
    fn prepare<'j>(&self, jwe: &'j Jwe) -> Result<Vec<Candidate<'j>>> {
        if jwe.recipients.is_empty() {
            return Err(Error::structural("JWE has no recipients"));
        }
        jwe.recipients
            .iter()
            .enumerate()
            .map(|(index, recipient)| {
                reject_compression(&[
                    &jwe.shared_protected_header,
                    &jwe.shared_header,
                    &recipient.header,
                ])?;
                if recipient.header.contains("enc") {
                    return Err(Error::structural("enc must be shared by all recipients"));
                }
                let complete = jwe.complete_header(index)?;
                check_critical(&jwe.shared_protected_header, &complete)?;
                let algorithm = self.registry.key_management(complete.require_str("alg")?)?;
                let enc = self
                    .registry
                    .content_encryption(complete.require_str("enc")?)?;
                algorithm.check_decryption_header(&complete)?;
                if algorithm.mode().provides_cek() && !recipient.encrypted_key.is_empty() {
                    return Err(Error::structural(format!(
                        "{} requires an empty encrypted key",
                        algorithm.name()
                    )));
                }
                Ok(Candidate {
                    recipient,
                    algorithm,
                    enc,
                    complete,
                })
            })
            .collect()
    }
}

/// Like [`recover_cek`], except that an `RSA1_5` padding failure or a CEK of
/// the wrong size yields a random CEK of the size `enc` expects. Content
/// decryption then fails the same way it would for a wrong key
/// (RFC 7516 section 11.5).
fn recover_cek_or_substitute(candidate: &Candidate<'_>, key: &Key) -> Result<Cek> {
    let recovered = recover_cek(candidate, key);
    if candidate.algorithm.name() != "RSA1_5" {
        return recovered;
    }
    let size = candidate.enc.cek_size() / 8;
    match recovered {
        Ok(cek) if cek.len() == size => Ok(cek),
        Ok(_) | Err(Error::Cryptographic) => random_secret(size),
        Err(error) => Err(error),
    }
}

/// Recovers the CEK for one recipient with one key.
fn recover_cek(candidate: &Candidate<'_>, key: &Key) -> Result<Cek> {
    let algorithm = &candidate.algorithm;
    algorithm.check_key(key)?;
    let encrypted_key = &candidate.recipient.encrypted_key;
    let header = &candidate.complete;
    let enc = &candidate.enc;
    match algorithm.management() {
        KeyManagement::Direct(direct) => direct.cek(key),
        KeyManagement::Encrypt(encryption) => encryption.decrypt_key(key, encrypted_key, header),
        KeyManagement::Wrap(wrapping) => wrapping.unwrap_key(key, encrypted_key, header),
        KeyManagement::Agreement(agreement) => {
            if !key.is_private() {
                return Err(Error::Cryptographic);
            }
            agreement
                .agreement_key(enc.cek_size(), enc.name(), key, None, header)
                .map(|(cek, _)| cek)
        }
        KeyManagement::AgreementWrap(agreement) => {
            if !key.is_private() {
                return Err(Error::Cryptographic);
            }
            agreement.unwrap_agreement_key(key, encrypted_key, enc.name(), header)
        }
    }
}

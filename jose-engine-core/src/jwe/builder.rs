//! JWE construction.
//!
//! Every name is resolved and every key is checked before any random bytes
//! are drawn, so a misconfigured build fails without side effects.

use std::sync::Arc;

use tracing::{debug, trace};

use super::content::ContentEncryptionAlgorithm;
use super::types::{Cek, KeyManagement, KeyManagementAlgorithm};
use super::{content_aad, reject_compression, Jwe, Recipient};
use crate::error::{Error, Result};
use crate::header::{check_critical, Header};
use crate::key::Key;
use crate::registry::AlgorithmRegistry;
use crate::utils::{random_bytes, random_secret};

struct PendingRecipient<'a> {
    key: &'a Key,
    sender: Option<&'a Key>,
    header: Header,
}

/// A recipient whose algorithm has been resolved and key checked.
struct ResolvedRecipient<'a> {
    algorithm: Arc<dyn KeyManagementAlgorithm>,
    key: &'a Key,
    sender: Option<&'a Key>,
    header: Header,
    complete: Header,
}

/// Builds a [`Jwe`] for one or more recipients.
pub struct JweBuilder<'a> {
    registry: &'a AlgorithmRegistry,
    payload: Option<Vec<u8>>,
    protected: Header,
    shared: Header,
    aad: Option<Vec<u8>>,
    recipients: Vec<PendingRecipient<'a>>,
}

impl<'a> JweBuilder<'a> {
    /// Starts a build that looks algorithms up in `registry`.
    #[must_use]
    pub fn new(registry: &'a AlgorithmRegistry) -> Self {
        Self {
            registry,
            payload: None,
            protected: Header::new(),
            shared: Header::new(),
            aad: None,
            recipients: Vec::new(),
        }
    }

    /// Sets the plaintext.
    #[must_use]
    pub fn payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    /// Sets the integrity-protected header shared by all recipients.
    #[must_use]
    pub fn shared_protected_header(mut self, header: Header) -> Self {
        self.protected = header;
        self
    }

    /// Sets the unprotected header shared by all recipients.
    #[must_use]
    pub fn shared_header(mut self, header: Header) -> Self {
        self.shared = header;
        self
    }

    /// Sets additional authenticated data.
    #[must_use]
    pub fn aad(mut self, aad: impl Into<Vec<u8>>) -> Self {
        self.aad = Some(aad.into());
        self
    }

    /// Adds a recipient with its per-recipient header.
    #[must_use]
    pub fn add_recipient(mut self, key: &'a Key, header: Header) -> Self {
        self.recipients.push(PendingRecipient {
            key,
            sender: None,
            header,
        });
        self
    }

    /// Adds a recipient whose key agreement uses `sender_key` as the
    /// originator's key.
    #[must_use]
    pub fn add_recipient_with_sender(
        mut self,
        key: &'a Key,
        header: Header,
        sender_key: &'a Key,
    ) -> Self {
        self.recipients.push(PendingRecipient {
            key,
            sender: Some(sender_key),
            header,
        });
        self
    }

    /// Encrypts the payload for every recipient.
    ///
    /// # Errors
    ///
    /// * `Error::Structural` - If the payload or recipients are missing,
    ///   a header parameter is duplicated or misplaced, or a direct mode is
    ///   combined with several recipients
    /// * `Error::UnsupportedAlgorithm` - If `alg` or `enc` is unknown, or
    ///   compression is requested
    /// * `Error::KeyFormat` - If a key does not fit its algorithm
    /// * `Error::Randomness` - If the OS random source fails
    pub fn build(self) -> Result<Jwe> {
        let payload = self
            .payload
            .as_deref()
            .ok_or_else(|| Error::structural("JWE payload is missing"))?;
        if self.recipients.is_empty() {
            return Err(Error::structural("JWE has no recipients"));
        }

        let shared = Header::merge(&[&self.protected, &self.shared])?;
        let enc = self.registry.content_encryption(shared.require_str("enc")?)?;
        let mut resolved = self.resolve_recipients()?;
        debug!(enc = enc.name(), recipients = resolved.len(), "building JWE");

        let provider = resolved
            .iter()
            .position(|r| r.algorithm.mode().provides_cek());
        if provider.is_some() && resolved.len() != 1 {
            return Err(Error::structural(
                "direct encryption and direct key agreement allow a single recipient",
            ));
        }

        let mut protected = self.protected.clone();
        let mut encrypted_keys = Vec::with_capacity(resolved.len());
        let cek = match provider {
            Some(index) => {
                let (cek, extra) = provided_cek(&resolved[index], enc.as_ref())?;
                protected.extend(extra);
                encrypted_keys.push(Vec::new());
                cek
            }
            None => {
                let cek = random_secret(enc.cek_size() / 8)?;
                let single = resolved.len() == 1;
                for (index, recipient) in resolved.iter_mut().enumerate() {
                    trace!(recipient = index, alg = recipient.algorithm.name(), "protecting CEK");
                    let (encrypted_key, extra) = protect_cek(recipient, enc.as_ref(), &cek)?;
                    if single {
                        protected.extend(extra);
                    } else {
                        recipient.header.extend(extra);
                    }
                    encrypted_keys.push(encrypted_key);
                }
                cek
            }
        };

        let recipients = resolved
            .into_iter()
            .zip(encrypted_keys)
            .map(|(r, encrypted_key)| {
                Header::merge(&[&protected, &self.shared, &r.header])?;
                Ok(Recipient::new(r.header, encrypted_key))
            })
            .collect::<Result<Vec<_>>>()?;

        let encoded_protected_header = if protected.is_empty() {
            String::new()
        } else {
            protected.encode()?
        };
        let aad = content_aad(&encoded_protected_header, self.aad.as_deref());
        let iv = random_bytes(enc.iv_size() / 8)?;
        let (ciphertext, tag) = enc.encrypt(&cek, &iv, &aad, payload)?;

        debug!(enc = enc.name(), recipients = recipients.len(), "JWE built");
        Ok(Jwe {
            ciphertext,
            iv,
            tag,
            aad: self.aad,
            shared_protected_header: protected,
            encoded_protected_header,
            shared_header: self.shared,
            recipients,
        })
    }

    fn resolve_recipients(&self) -> Result<Vec<ResolvedRecipient<'a>>> {
        self.recipients
            .iter()
            .map(|pending| {
                reject_compression(&[&self.protected, &self.shared, &pending.header])?;
                if pending.header.contains("enc") {
                    return Err(Error::structural(
                        "enc must be shared by all recipients",
                    ));
                }
                let complete = Header::merge(&[&self.protected, &self.shared, &pending.header])?;
                check_critical(&self.protected, &complete)?;
                let algorithm = self.registry.key_management(complete.require_str("alg")?)?;
                algorithm.check_key(pending.key)?;
                if let Some(sender) = pending.sender {
                    algorithm.check_key(sender)?;
                }
                Ok(ResolvedRecipient {
                    algorithm,
                    key: pending.key,
                    sender: pending.sender,
                    header: pending.header.clone(),
                    complete,
                })
            })
            .collect()
    }
}

/// Obtains the CEK from the single recipient of a direct mode.
fn provided_cek(
    recipient: &ResolvedRecipient<'_>,
    enc: &dyn ContentEncryptionAlgorithm,
) -> Result<(Cek, Header)> {
    match recipient.algorithm.management() {
        KeyManagement::Direct(direct) => {
            let cek = direct.cek(recipient.key)?;
            if cek.len() * 8 != enc.cek_size() {
                return Err(Error::key_format(format!(
                    "{} requires a {}-bit key, got {} bits",
                    enc.name(),
                    enc.cek_size(),
                    cek.len() * 8
                )));
            }
            Ok((cek, Header::new()))
        }
        KeyManagement::Agreement(agreement) => agreement.agreement_key(
            enc.cek_size(),
            enc.name(),
            &recipient.key.to_public()?,
            recipient.sender,
            &recipient.complete,
        ),
        _ => Err(Error::structural(format!(
            "{} does not provide the CEK",
            recipient.algorithm.name()
        ))),
    }
}

/// Encrypts or wraps a random CEK for one recipient.
fn protect_cek(
    recipient: &ResolvedRecipient<'_>,
    enc: &dyn ContentEncryptionAlgorithm,
    cek: &Cek,
) -> Result<(Vec<u8>, Header)> {
    match recipient.algorithm.management() {
        KeyManagement::Encrypt(encryption) => {
            encryption.encrypt_key(recipient.key, cek, &recipient.complete)
        }
        KeyManagement::Wrap(wrapping) => {
            wrapping.wrap_key(recipient.key, cek, &recipient.complete)
        }
        KeyManagement::AgreementWrap(agreement) => agreement.wrap_agreement_key(
            &recipient.key.to_public()?,
            recipient.sender,
            cek,
            enc.name(),
            &recipient.complete,
        ),
        KeyManagement::Direct(_) | KeyManagement::Agreement(_) => Err(Error::structural(
            format!("{} must be the only recipient", recipient.algorithm.name()),
        )),
    }
}

//! JWS verification.
//!
//! Each signature of a token is verified on its own, selected by index.
//! Header, `crit` and `alg` problems end verification; a key that does not
//! fit or does not verify only moves on to the next key.

use tracing::{debug, trace};

use super::{payload_encoding, signing_input, Jws};
use crate::error::{Error, Result};
use crate::header::check_critical;
use crate::key::{Key, KeySet};
use crate::registry::AlgorithmRegistry;

/// Verifies [`Jws`] signatures with algorithms from a registry.
#[derive(Debug, Clone, Copy)]
pub struct JwsVerifier<'a> {
    registry: &'a AlgorithmRegistry,
}

impl<'a> JwsVerifier<'a> {
    /// Creates a verifier over `registry`.
    #[must_use]
    pub fn new(registry: &'a AlgorithmRegistry) -> Self {
        Self { registry }
    }

    /// Verifies signature `index` with `key`.
    ///
    /// `detached` supplies the payload of a detached token; when given it
    /// takes the place of any payload the token carries.
    ///
    /// # Errors
    ///
    /// See [`JwsVerifier::verify_with_key_set`].
    pub fn verify_with_key(
        &self,
        jws: &Jws,
        key: &Key,
        index: usize,
        detached: Option<&[u8]>,
    ) -> Result<()> {
        self.verify_with_keys(jws, &[key], index, detached).map(|_| ())
    }

    /// Verifies signature `index` with the keys of `keys`, in order, and
    /// returns the index of the first key that verifies.
    ///
    /// # Errors
    ///
    /// * `Error::Structural` - If the index is out of range, a header
    ///   parameter is duplicated, or `crit` or `b64` is misused
    /// * `Error::UnsupportedAlgorithm` - If `alg` is unknown
    /// * `Error::Cryptographic` - If no key verifies the signature
    pub fn verify_with_key_set(
        &self,
        jws: &Jws,
        keys: &KeySet,
        index: usize,
        detached: Option<&[u8]>,
    ) -> Result<usize> {
        let keys: Vec<&Key> = keys.iter().collect();
        self.verify_with_keys(jws, &keys, index, detached)
    }

    fn verify_with_keys(
        &self,
        jws: &Jws,
        keys: &[&Key],
        index: usize,
        detached: Option<&[u8]>,
    ) -> Result<usize> {
        let signature = jws.signature_at(index)?;
        let complete = signature.complete_header()?;
        check_critical(&signature.protected, &complete)?;
        let encoded = payload_encoding(&signature.protected, &signature.header)?;
        let algorithm = self.registry.signature(complete.require_str("alg")?)?;

        let payload = detached.or(jws.payload.as_deref()).unwrap_or_default();
        let input = signing_input(&signature.encoded_protected, payload, encoded);
        debug!(signature = index, alg = algorithm.name(), keys = keys.len(), "verifying JWS");

        for (key_index, key) in keys.iter().enumerate() {
            let verified = algorithm.check_key(key).and_then(|()| {
                algorithm.verify(key, &input, &signature.signature)
            });
            if matches!(verified, Ok(true)) {
                debug!(signature = index, key_index, "JWS verified");
                return Ok(key_index);
            }
            trace!(signature = index, key_index, "key rejected");
        }
        Err(Error::Cryptographic)
    }
}

//! JWS construction.

use std::sync::Arc;

use tracing::{debug, trace};

use super::algorithms::SignatureAlgorithm;
use super::{payload_encoding, signing_input, Jws, Signature};
use crate::error::{Error, Result};
use crate::header::{check_critical, Header};
use crate::key::Key;
use crate::registry::AlgorithmRegistry;

struct PendingSignature<'a> {
    key: &'a Key,
    protected: Header,
    header: Header,
}

/// Builds a [`Jws`] with one or more signatures.
pub struct JwsBuilder<'a> {
    registry: &'a AlgorithmRegistry,
    payload: Option<Vec<u8>>,
    detached: bool,
    signatures: Vec<PendingSignature<'a>>,
}

impl<'a> JwsBuilder<'a> {
    /// Starts a build that looks algorithms up in `registry`.
    #[must_use]
    pub fn new(registry: &'a AlgorithmRegistry) -> Self {
        Self {
            registry,
            payload: None,
            detached: false,
            signatures: Vec::new(),
        }
    }

    /// Sets the payload. A detached payload is signed but left out of the
    /// token.
    #[must_use]
    pub fn payload(mut self, payload: impl Into<Vec<u8>>, detached: bool) -> Self {
        self.payload = Some(payload.into());
        self.detached = detached;
        self
    }

    /// Adds a signature made with `key`.
    #[must_use]
    pub fn add_signature(mut self, key: &'a Key, protected: Header, header: Header) -> Self {
        self.signatures.push(PendingSignature {
            key,
            protected,
            header,
        });
        self
    }

    /// Signs the payload once per signature.
    ///
    /// # Errors
    ///
    /// * `Error::Structural` - If the payload or signatures are missing, a
    ///   header parameter is duplicated, `crit` or `b64` is misused, or an
    ///   unencoded attached payload is not UTF-8
    /// * `Error::UnsupportedAlgorithm` - If `alg` is unknown
    /// * `Error::KeyFormat` - If a key does not fit its algorithm
    pub fn build(self) -> Result<Jws> {
        let payload = self
            .payload
            .ok_or_else(|| Error::structural("JWS payload is missing"))?;
        if self.signatures.is_empty() {
            return Err(Error::structural("JWS has no signatures"));
        }

        let mut encoded = None;
        let mut resolved: Vec<(Arc<dyn SignatureAlgorithm>, &PendingSignature<'_>)> =
            Vec::with_capacity(self.signatures.len());
        for pending in &self.signatures {
            let complete = Header::merge(&[&pending.protected, &pending.header])?;
            check_critical(&pending.protected, &complete)?;
            let b64 = payload_encoding(&pending.protected, &pending.header)?;
            if *encoded.get_or_insert(b64) != b64 {
                return Err(Error::structural("signatures disagree on b64"));
            }
            let algorithm = self.registry.signature(complete.require_str("alg")?)?;
            algorithm.check_key(pending.key)?;
            resolved.push((algorithm, pending));
        }

        let encoded = encoded.unwrap_or(true);
        if !encoded && !self.detached && std::str::from_utf8(&payload).is_err() {
            return Err(Error::structural("unencoded payload must be UTF-8"));
        }
        debug!(signatures = resolved.len(), encoded, detached = self.detached, "building JWS");

        let mut signatures = Vec::with_capacity(resolved.len());
        for (index, (algorithm, pending)) in resolved.into_iter().enumerate() {
            trace!(signature = index, alg = algorithm.name(), "signing");
            let encoded_protected = if pending.protected.is_empty() {
                String::new()
            } else {
                pending.protected.encode()?
            };
            let input = signing_input(&encoded_protected, &payload, encoded);
            signatures.push(Signature {
                signature: algorithm.sign(pending.key, &input)?,
                protected: pending.protected.clone(),
                encoded_protected,
                header: pending.header.clone(),
            });
        }

        Ok(Jws {
            payload: (!self.detached).then_some(payload),
            signatures,
        })
    }
}

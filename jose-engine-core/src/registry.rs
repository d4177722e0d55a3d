//! Name-indexed lookup of every supported algorithm.
//!
//! The registry is built once, from an [`EngineConfig`], and then shared
//! read-only by builders, decrypters and verifiers. There is no global
//! state: two registries with different configurations can coexist.
//!
//! # Examples
//!
//! ```rust
//! use jose_engine_core::config::EngineConfig;
//! use jose_engine_core::registry::AlgorithmRegistry;
//!
//! let config = EngineConfig {
//!     allow_rsa1_5: false,
//!     ..EngineConfig::default()
//! };
//! let registry = AlgorithmRegistry::from_config(&config).unwrap();
//! assert!(registry.key_management("RSA-OAEP-256").is_ok());
//! assert!(registry.key_management("RSA1_5").is_err());
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::jwe::content::{AesCbcHmacEncryption, AesGcmEncryption, ContentEncryptionAlgorithm};
use crate::jwe::curve::multiplier_for;
use crate::jwe::direct::Direct;
use crate::jwe::key_agreement::EcdhEs;
use crate::jwe::key_wrapping::{AesGcmKeyWrap, AesKeyWrap, Pbes2};
use crate::jwe::rsa::RsaKeyEncryption;
use crate::jwe::types::KeyManagementAlgorithm;
use crate::jws::algorithms::{EcdsaSignature, EdDsa, HmacSignature, RsaSignature, SignatureAlgorithm};

/// Lookup tables for key management, content encryption and signature
/// algorithms.
#[derive(Clone, Default)]
pub struct AlgorithmRegistry {
    key_management: HashMap<&'static str, Arc<dyn KeyManagementAlgorithm>>,
    content_encryption: HashMap<&'static str, Arc<dyn ContentEncryptionAlgorithm>>,
    signature: HashMap<&'static str, Arc<dyn SignatureAlgorithm>>,
}

impl AlgorithmRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with every algorithm and the default
    /// configuration.
    ///
    /// # Errors
    ///
    /// See [`AlgorithmRegistry::from_config`].
    pub fn with_defaults() -> Result<Self> {
        Self::from_config(&EngineConfig::default())
    }

    /// Creates a registry with every algorithm the configuration enables.
    ///
    /// # Errors
    ///
    /// * `Error::Config` - If the configuration does not validate
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        config.validate()?;
        let multiplier = multiplier_for(config.curve_backend);
        let mut registry = Self::new();

        registry.register_key_management(Arc::new(Direct));
        if config.allow_rsa1_5 {
            registry.register_key_management(Arc::new(RsaKeyEncryption::rsa1_5()));
        }
        registry.register_key_management(Arc::new(RsaKeyEncryption::oaep()));
        registry.register_key_management(Arc::new(RsaKeyEncryption::oaep_256()));
        registry.register_key_management(Arc::new(EcdhEs::ephemeral(None, multiplier.clone())?));
        registry.register_key_management(Arc::new(EcdhEs::static_sender(None, multiplier.clone())?));
        for bits in [128, 192, 256] {
            registry.register_key_management(Arc::new(AesKeyWrap::new(bits)?));
            registry.register_key_management(Arc::new(AesGcmKeyWrap::new(bits)?));
            registry.register_key_management(Arc::new(Pbes2::new(bits, config)?));
            registry.register_key_management(Arc::new(EcdhEs::ephemeral(
                Some(bits),
                multiplier.clone(),
            )?));
            registry.register_key_management(Arc::new(EcdhEs::static_sender(
                Some(bits),
                multiplier.clone(),
            )?));
        }

        registry.register_content_encryption(Arc::new(AesGcmEncryption::a128()));
        registry.register_content_encryption(Arc::new(AesGcmEncryption::a192()));
        registry.register_content_encryption(Arc::new(AesGcmEncryption::a256()));
        registry.register_content_encryption(Arc::new(AesCbcHmacEncryption::a128()));
        registry.register_content_encryption(Arc::new(AesCbcHmacEncryption::a192()));
        registry.register_content_encryption(Arc::new(AesCbcHmacEncryption::a256()));

        for bits in [256, 384, 512] {
            registry.register_signature(Arc::new(HmacSignature::new(bits)?));
            registry.register_signature(Arc::new(RsaSignature::pkcs1v15(bits)?));
            registry.register_signature(Arc::new(RsaSignature::pss(bits)?));
        }
        registry.register_signature(Arc::new(EcdsaSignature::es256()));
        registry.register_signature(Arc::new(EcdsaSignature::es384()));
        registry.register_signature(Arc::new(EdDsa));

        debug!(
            key_management = registry.key_management.len(),
            content_encryption = registry.content_encryption.len(),
            signature = registry.signature.len(),
            "algorithm registry built"
        );
        Ok(registry)
    }

    /// Adds or replaces a key management algorithm.
    pub fn register_key_management(&mut self, algorithm: Arc<dyn KeyManagementAlgorithm>) {
        self.key_management.insert(algorithm.name(), algorithm);
    }

    /// Adds or replaces a content encryption algorithm.
    pub fn register_content_encryption(&mut self, algorithm: Arc<dyn ContentEncryptionAlgorithm>) {
        self.content_encryption.insert(algorithm.name(), algorithm);
    }

    /// Adds or replaces a signature algorithm.
    pub fn register_signature(&mut self, algorithm: Arc<dyn SignatureAlgorithm>) {
        self.signature.insert(algorithm.name(), algorithm);
    }

    /// Looks up a key management algorithm by `alg` name.
    ///
    /// # Errors
    ///
    /// * `Error::UnsupportedAlgorithm` - If the name is not registered
    pub fn key_management(&self, name: &str) -> Result<Arc<dyn KeyManagementAlgorithm>> {
        self.key_management
            .get(name)
            .cloned()
            .ok_or_else(|| Error::unsupported(name))
    }

    /// Looks up a content encryption algorithm by `enc` name.
    ///
    /// # Errors
    ///
    /// * `Error::UnsupportedAlgorithm` - If the name is not registered
    pub fn content_encryption(&self, name: &str) -> Result<Arc<dyn ContentEncryptionAlgorithm>> {
        self.content_encryption
            .get(name)
            .cloned()
            .ok_or_else(|| Error::unsupported(name))
    }

    /// Looks up a signature algorithm by `alg` name.
    ///
    /// # Errors
    ///
    /// * `Error::UnsupportedAlgorithm` - If the name is not registered
    pub fn signature(&self, name: &str) -> Result<Arc<dyn SignatureAlgorithm>> {
        self.signature
            .get(name)
            .cloned()
            .ok_or_else(|| Error::unsupported(name))
    }

    /// Registered key management names, sorted.
    #[must_use]
    pub fn key_management_names(&self) -> Vec<&'static str> {
        sorted(self.key_management.keys())
    }

    /// Registered content encryption names, sorted.
    #[must_use]
    pub fn content_encryption_names(&self) -> Vec<&'static str> {
        sorted(self.content_encryption.keys())
    }

    /// Registered signature names, sorted.
    #[must_use]
    pub fn signature_names(&self) -> Vec<&'static str> {
        sorted(self.signature.keys())
    }
}

fn sorted<'a>(names: impl Iterator<Item = &'a &'static str>) -> Vec<&'static str> {
    let mut names: Vec<_> = names.copied().collect();
    names.sort_unstable();
    names
}

impl fmt::Debug for AlgorithmRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlgorithmRegistry")
            .field("key_management", &self.key_management_names())
            .field("content_encryption", &self.content_encryption_names())
            .field("signature", &self.signature_names())
            .finish()
    }
}

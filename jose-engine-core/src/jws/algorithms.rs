//! JWS signature algorithms.
//!
//! - `HS256`, `HS384`, `HS512`: HMAC with SHA-2
//! - `RS256`, `RS384`, `RS512`: RSASSA-PKCS1-v1_5
//! - `PS256`, `PS384`, `PS512`: RSASSA-PSS, MGF1 with the same hash, salt
//!   the size of the hash output
//! - `ES256`, `ES384`: ECDSA with the fixed-size `r || s` encoding
//! - `EdDSA`: Ed25519
//!
//! A signature that cannot be parsed verifies as `false`. Only problems with
//! the key itself are errors.

use std::fmt;

use hmac::{Hmac, Mac};
use rand_core::OsRng;
use rsa::signature::{RandomizedSigner, SignatureEncoding, Signer, Verifier};
use rsa::traits::PublicKeyParts;
use rsa::{pkcs1v15, pss};
use sha2::{Sha256, Sha384, Sha512};

use crate::error::{Error, Result};
use crate::key::{Curve, Key, KeyType};

/// Smallest RSA modulus accepted for signing and verification, in bits.
const MIN_RSA_BITS: usize = 2048;

/// A JWS `alg` implementation.
pub trait SignatureAlgorithm: Send + Sync + fmt::Debug {
    /// The JOSE `alg` name.
    fn name(&self) -> &'static str;

    /// Key types the algorithm accepts.
    fn allowed_key_types(&self) -> &'static [KeyType];

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

    /// Signs `input` with the private `key`.
    ///
    /// # Errors
    ///
    /// * `Error::KeyFormat` - If the key is malformed or has no private part
    fn sign(&self, key: &Key, input: &[u8]) -> Result<Vec<u8>>;

    /// Checks `signature` over `input`.
    ///
    /// # Errors
    ///
    /// * `Error::KeyFormat` - If the key is malformed
    fn verify(&self, key: &Key, input: &[u8], signature: &[u8]) -> Result<bool>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Hash {
    Sha256,
    Sha384,
    Sha512,
}

impl Hash {
    fn from_bits(bits: usize) -> Option<Self> {
        match bits {
            256 => Some(Self::Sha256),
            384 => Some(Self::Sha384),
            512 => Some(Self::Sha512),
            _ => None,
        }
    }

    fn bits(self) -> usize {
        match self {
            Self::Sha256 => 256,
            Self::Sha384 => 384,
            Self::Sha512 => 512,
        }
    }
}

/// HMAC with SHA-2.
#[derive(Debug, Clone, Copy)]
pub struct HmacSignature {
    hash: Hash,
}

impl HmacSignature {
    /// `HS256`, `HS384` or `HS512` by hash size.
    ///
    /// # Errors
    ///
    /// * `Error::UnsupportedAlgorithm` - For any other size
    pub fn new(bits: usize) -> Result<Self> {
        Hash::from_bits(bits)
            .map(|hash| Self { hash })
            .ok_or_else(|| Error::unsupported(format!("HS{bits}")))
    }

    fn mac_key(&self, key: &Key) -> Result<zeroize::Zeroizing<Vec<u8>>> {
        self.check_key(key)?;
        let k = key.decode("k")?;
        if k.len() * 8 < self.hash.bits() {
            return Err(Error::key_format(format!(
                "{} requires a key of at least {} bits",
                self.name(),
                self.hash.bits()
            )));
        }
        Ok(k)
    }
}

fn hmac_tag<M: Mac + hmac::digest::KeyInit>(key: &[u8], input: &[u8]) -> Result<M> {
    let mut mac = <M as hmac::digest::KeyInit>::new_from_slice(key)
        .map_err(|_| Error::key_format("invalid HMAC key"))?;
    mac.update(input);
    Ok(mac)
}

impl SignatureAlgorithm for HmacSignature {
    fn name(&self) -> &'static str {
        match self.hash {
            Hash::Sha256 => "HS256",
            Hash::Sha384 => "HS384",
            Hash::Sha512 => "HS512",
        }
    }

    fn allowed_key_types(&self) -> &'static [KeyType] {
        &[KeyType::Oct]
    }

    fn sign(&self, key: &Key, input: &[u8]) -> Result<Vec<u8>> {
        let k = self.mac_key(key)?;
        Ok(match self.hash {
            Hash::Sha256 => hmac_tag::<Hmac<Sha256>>(&k, input)?.finalize().into_bytes().to_vec(),
            Hash::Sha384 => hmac_tag::<Hmac<Sha384>>(&k, input)?.finalize().into_bytes().to_vec(),
            Hash::Sha512 => hmac_tag::<Hmac<Sha512>>(&k, input)?.finalize().into_bytes().to_vec(),
        })
    }

    fn verify(&self, key: &Key, input: &[u8], signature: &[u8]) -> Result<bool> {
        let k = self.mac_key(key)?;
        Ok(match self.hash {
            Hash::Sha256 => hmac_tag::<Hmac<Sha256>>(&k, input)?.verify_slice(signature).is_ok(),
            Hash::Sha384 => hmac_tag::<Hmac<Sha384>>(&k, input)?.verify_slice(signature).is_ok(),
            Hash::Sha512 => hmac_tag::<Hmac<Sha512>>(&k, input)?.verify_slice(signature).is_ok(),
        })
    }
}

/// RSASSA-PKCS1-v1_5 and RSASSA-PSS.
#[derive(Debug, Clone, Copy)]
pub struct RsaSignature {
    hash: Hash,
    pss: bool,
}

impl RsaSignature {
    /// `RS256`, `RS384` or `RS512` by hash size.
    ///
    /// # Errors
    ///
    /// * `Error::UnsupportedAlgorithm` - For any other size
    pub fn pkcs1v15(bits: usize) -> Result<Self> {
        Hash::from_bits(bits)
            .map(|hash| Self { hash, pss: false })
            .ok_or_else(|| Error::unsupported(format!("RS{bits}")))
    }

    /// `PS256`, `PS384` or `PS512` by hash size.
    ///
    /// # Errors
    ///
    /// * `Error::UnsupportedAlgorithm` - For any other size
    pub fn pss(bits: usize) -> Result<Self> {
        Hash::from_bits(bits)
            .map(|hash| Self { hash, pss: true })
            .ok_or_else(|| Error::unsupported(format!("PS{bits}")))
    }

    fn check_size(&self, modulus_bits: usize) -> Result<()> {
        if modulus_bits < MIN_RSA_BITS {
            return Err(Error::key_format(format!(
                "{} requires a modulus of at least {MIN_RSA_BITS} bits",
                self.name()
            )));
        }
        Ok(())
    }
}

fn pkcs1v15_sign<D>(private: rsa::RsaPrivateKey, input: &[u8]) -> Result<Vec<u8>>
where
    D: sha2::Digest + rsa::pkcs8::AssociatedOid,
{
    pkcs1v15::SigningKey::<D>::new(private)
        .try_sign(input)
        .map(|signature| signature.to_vec())
        .map_err(|_| Error::Cryptographic)
}

fn pss_sign<D>(private: rsa::RsaPrivateKey, input: &[u8]) -> Result<Vec<u8>>
where
    D: sha2::Digest + sha2::digest::FixedOutputReset,
{
    pss::BlindedSigningKey::<D>::new(private)
        .try_sign_with_rng(&mut OsRng, input)
        .map(|signature| signature.to_vec())
        .map_err(|_| Error::Cryptographic)
}

fn pkcs1v15_verify<D>(public: rsa::RsaPublicKey, input: &[u8], signature: &[u8]) -> bool
where
    D: sha2::Digest + rsa::pkcs8::AssociatedOid,
{
    pkcs1v15::Signature::try_from(signature)
        .is_ok_and(|s| pkcs1v15::VerifyingKey::<D>::new(public).verify(input, &s).is_ok())
}

fn pss_verify<D>(public: rsa::RsaPublicKey, input: &[u8], signature: &[u8]) -> bool
where
    D: sha2::Digest + sha2::digest::FixedOutputReset,
{
    pss::Signature::try_from(signature)
        .is_ok_and(|s| pss::VerifyingKey::<D>::new(public).verify(input, &s).is_ok())
}

impl SignatureAlgorithm for RsaSignature {
    fn name(&self) -> &'static str {
        match (self.pss, self.hash) {
            (false, Hash::Sha256) => "RS256",
            (false, Hash::Sha384) => "RS384",
            (false, Hash::Sha512) => "RS512",
            (true, Hash::Sha256) => "PS256",
            (true, Hash::Sha384) => "PS384",
            (true, Hash::Sha512) => "PS512",
        }
    }

    fn allowed_key_types(&self) -> &'static [KeyType] {
        &[KeyType::Rsa]
    }

    fn sign(&self, key: &Key, input: &[u8]) -> Result<Vec<u8>> {
        self.check_key(key)?;
        let private = key.rsa_private()?;
        self.check_size(private.size() * 8)?;
        match (self.pss, self.hash) {
            (false, Hash::Sha256) => pkcs1v15_sign::<Sha256>(private, input),
            (false, Hash::Sha384) => pkcs1v15_sign::<Sha384>(private, input),
            (false, Hash::Sha512) => pkcs1v15_sign::<Sha512>(private, input),
            (true, Hash::Sha256) => pss_sign::<Sha256>(private, input),
            (true, Hash::Sha384) => pss_sign::<Sha384>(private, input),
            (true, Hash::Sha512) => pss_sign::<Sha512>(private, input),
        }
    }

    fn verify(&self, key: &Key, input: &[u8], signature: &[u8]) -> Result<bool> {
        self.check_key(key)?;
        let public = key.rsa_public()?;
        self.check_size(public.size() * 8)?;
        Ok(match (self.pss, self.hash) {
            (false, Hash::Sha256) => pkcs1v15_verify::<Sha256>(public, input, signature),
            (false, Hash::Sha384) => pkcs1v15_verify::<Sha384>(public, input, signature),
            (false, Hash::Sha512) => pkcs1v15_verify::<Sha512>(public, input, signature),
            (true, Hash::Sha256) => pss_verify::<Sha256>(public, input, signature),
            (true, Hash::Sha384) => pss_verify::<Sha384>(public, input, signature),
            (true, Hash::Sha512) => pss_verify::<Sha512>(public, input, signature),
        })
    }
}

/// ECDSA on P-256 or P-384.
#[derive(Debug, Clone, Copy)]
pub struct EcdsaSignature {
    name: &'static str,
    curve: Curve,
}

impl EcdsaSignature {
    /// `ES256`
    #[must_use]
    pub fn es256() -> Self {
        Self {
            name: "ES256",
            curve: Curve::P256,
        }
    }

    /// `ES384`
    #[must_use]
    pub fn es384() -> Self {
        Self {
            name: "ES384",
            curve: Curve::P384,
        }
    }

    fn check_curve(&self, key: &Key) -> Result<()> {
        self.check_key(key)?;
        let curve = key.curve()?;
        if curve != self.curve {
            return Err(Error::key_format(format!(
                "{} requires a {} key, got {}",
                self.name(),
                self.curve.name(),
                curve.name()
            )));
        }
        Ok(())
    }

    fn unsupported_curve(&self) -> Error {
        Error::unsupported(format!("{} on {}", self.name, self.curve.name()))
    }

    /// Uncompressed SEC1 encoding of the public point.
    fn sec1_point(key: &Key) -> Result<Vec<u8>> {
        let x = key.decode("x")?;
        let y = key.decode("y")?;
        let mut sec1 = Vec::with_capacity(1 + x.len() + y.len());
        sec1.push(0x04);
        sec1.extend_from_slice(&x);
        sec1.extend_from_slice(&y);
        Ok(sec1)
    }
}

macro_rules! ecdsa_impl {
    ($sign:ident, $verify:ident, $curve:ident) => {
        fn $sign(d: &[u8], input: &[u8]) -> Result<Vec<u8>> {
            use $curve::ecdsa::signature::Signer as _;
            let signing = $curve::ecdsa::SigningKey::from_slice(d)
                .map_err(|_| Error::key_format("invalid ECDSA private key"))?;
            let signature: $curve::ecdsa::Signature = signing
                .try_sign(input)
                .map_err(|_| Error::Cryptographic)?;
            Ok(signature.to_bytes().to_vec())
        }

        fn $verify(sec1: &[u8], input: &[u8], signature: &[u8]) -> Result<bool> {
            use $curve::ecdsa::signature::Verifier as _;
            let verifying = $curve::ecdsa::VerifyingKey::from_sec1_bytes(sec1)
                .map_err(|_| Error::key_format("invalid ECDSA public key"))?;
            Ok($curve::ecdsa::Signature::from_slice(signature)
                .is_ok_and(|s| verifying.verify(input, &s).is_ok()))
        }
    };
}

ecdsa_impl!(p256_sign, p256_verify, p256);
ecdsa_impl!(p384_sign, p384_verify, p384);

impl SignatureAlgorithm for EcdsaSignature {
    fn name(&self) -> &'static str {
        self.name
    }

    fn allowed_key_types(&self) -> &'static [KeyType] {
        &[KeyType::Ec]
    }

    fn sign(&self, key: &Key, input: &[u8]) -> Result<Vec<u8>> {
        self.check_curve(key)?;
        let d = key.decode("d")?;
        match self.curve {
            Curve::P256 => p256_sign(&d, input),
            Curve::P384 => p384_sign(&d, input),
            Curve::P521 | Curve::X25519 | Curve::Ed25519 => Err(self.unsupported_curve()),
        }
    }

    fn verify(&self, key: &Key, input: &[u8], signature: &[u8]) -> Result<bool> {
        self.check_curve(key)?;
        let sec1 = Self::sec1_point(key)?;
        match self.curve {
            Curve::P256 => p256_verify(&sec1, input, signature),
            Curve::P384 => p384_verify(&sec1, input, signature),
            Curve::P521 | Curve::X25519 | Curve::Ed25519 => Err(self.unsupported_curve()),
        }
    }
}

/// EdDSA on Ed25519.
#[derive(Debug, Clone, Copy, Default)]
pub struct EdDsa;

impl EdDsa {
    fn key_bytes(key: &Key, name: &str) -> Result<[u8; 32]> {
        if key.curve()? != Curve::Ed25519 {
            return Err(Error::key_format("EdDSA requires an Ed25519 key"));
        }
        let bytes = key.decode(name)?;
        bytes
            .as_slice()
            .try_into()
            .map_err(|_| Error::key_format(format!("Ed25519 {name} must be 32 bytes")))
    }
}

impl SignatureAlgorithm for EdDsa {
    fn name(&self) -> &'static str {
        "EdDSA"
    }

    fn allowed_key_types(&self) -> &'static [KeyType] {
        &[KeyType::Okp]
    }

    fn sign(&self, key: &Key, input: &[u8]) -> Result<Vec<u8>> {
        use ed25519_dalek::Signer as _;
        self.check_key(key)?;
        let secret = zeroize::Zeroizing::new(Self::key_bytes(key, "d")?);
        let signing = ed25519_dalek::SigningKey::from_bytes(&secret);
        Ok(signing.sign(input).to_bytes().to_vec())
    }

    fn verify(&self, key: &Key, input: &[u8], signature: &[u8]) -> Result<bool> {
        self.check_key(key)?;
        let verifying = ed25519_dalek::VerifyingKey::from_bytes(&Self::key_bytes(key, "x")?)
            .map_err(|_| Error::key_format("invalid Ed25519 public key"))?;
        Ok(ed25519_dalek::Signature::from_slice(signature)
            .is_ok_and(|s| verifying.verify_strict(input, &s).is_ok()))
    }
}

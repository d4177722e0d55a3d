//! Symmetric key wrapping algorithms.
//!
//! - `A128KW`, `A192KW`, `A256KW`: AES Key Wrap (RFC 3394)
//! - `A128GCMKW`, `A192GCMKW`, `A256GCMKW`: AES-GCM with `iv` and `tag`
//!   published as header parameters
//! - `PBES2-HS256+A128KW`, `PBES2-HS384+A192KW`, `PBES2-HS512+A256KW`:
//!   PBKDF2 followed by AES Key Wrap, with `p2s` and `p2c` published as
//!   header parameters
//!
//! # Security Considerations
//!
//! - Wrapping keys must have exactly the algorithm's key size
//! - Unwrap integrity failures are reported as `Error::Cryptographic`
//! - Derived wrapping keys are zeroized when dropped
//! - PBES2 iteration counts above the configured maximum are refused before
//!   any derivation

use aes::cipher::generic_array::GenericArray;
use aes_gcm::{Aes128Gcm, Aes256Gcm};
use aes_kw::{KekAes128, KekAes192, KekAes256};
use serde_json::Value;
use sha2::{Sha256, Sha384, Sha512};
use zeroize::Zeroizing;

use super::content::{gcm_decrypt, gcm_encrypt, Aes192Gcm};
use super::types::{Cek, KeyManagement, KeyManagementAlgorithm, KeyWrapping};
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::header::Header;
use crate::key::{Key, KeyType};
use crate::utils::{b64_encode, random_bytes};

/// Wraps `cek` with AES Key Wrap under `kek`.
///
/// # Errors
///
/// * `Error::KeyFormat` - If `kek` is not 16, 24 or 32 bytes
/// * `Error::Cryptographic` - If `cek` is not a multiple of 8 bytes
pub(crate) fn aes_kw_wrap(kek: &[u8], cek: &[u8]) -> Result<Vec<u8>> {
    let wrapped = match kek.len() {
        16 => KekAes128::new(GenericArray::from_slice(kek)).wrap_vec(cek),
        24 => KekAes192::new(GenericArray::from_slice(kek)).wrap_vec(cek),
        32 => KekAes256::new(GenericArray::from_slice(kek)).wrap_vec(cek),
        other => {
            return Err(Error::key_format(format!(
                "AES key wrap requires a 128, 192 or 256-bit key, got {} bits",
                other * 8
            )))
        }
    };
    wrapped.map_err(|_| Error::Cryptographic)
}

/// Unwraps `wrapped` with AES Key Wrap under `kek`.
///
/// # Errors
///
/// * `Error::KeyFormat` - If `kek` is not 16, 24 or 32 bytes
/// * `Error::Cryptographic` - If the integrity check fails
pub(crate) fn aes_kw_unwrap(kek: &[u8], wrapped: &[u8]) -> Result<Cek> {
    let unwrapped = match kek.len() {
        16 => KekAes128::new(GenericArray::from_slice(kek)).unwrap_vec(wrapped),
        24 => KekAes192::new(GenericArray::from_slice(kek)).unwrap_vec(wrapped),
        32 => KekAes256::new(GenericArray::from_slice(kek)).unwrap_vec(wrapped),
        other => {
            return Err(Error::key_format(format!(
                "AES key wrap requires a 128, 192 or 256-bit key, got {} bits",
                other * 8
            )))
        }
    };
    unwrapped.map(Zeroizing::new).map_err(|_| Error::Cryptographic)
}

/// Reads the `k` parameter of an `oct` key and checks its size.
fn wrapping_key(key: &Key, bits: usize) -> Result<Zeroizing<Vec<u8>>> {
    let k = key.decode("k")?;
    if k.len() * 8 != bits {
        return Err(Error::key_format(format!(
            "expected a {bits}-bit key, got {} bits",
            k.len() * 8
        )));
    }
    Ok(k)
}

/// AES Key Wrap.
#[derive(Debug, Clone, Copy)]
pub struct AesKeyWrap {
    bits: usize,
}

impl AesKeyWrap {
    /// `A128KW`, `A192KW` or `A256KW` by key size.
    ///
    /// # Errors
    ///
    /// * `Error::UnsupportedAlgorithm` - For any other size
    pub fn new(bits: usize) -> Result<Self> {
        match bits {
            128 | 192 | 256 => Ok(Self { bits }),
            other => Err(Error::unsupported(format!("A{other}KW"))),
        }
    }
}

impl KeyWrapping for AesKeyWrap {
    fn wrap_key(&self, key: &Key, cek: &[u8], _header: &Header) -> Result<(Vec<u8>, Header)> {
        self.check_key(key)?;
        let kek = wrapping_key(key, self.bits)?;
        Ok((aes_kw_wrap(&kek, cek)?, Header::new()))
    }

    fn unwrap_key(&self, key: &Key, encrypted_key: &[u8], _header: &Header) -> Result<Cek> {
        self.check_key(key)?;
        let kek = wrapping_key(key, self.bits)?;
        aes_kw_unwrap(&kek, encrypted_key)
    }
}

impl KeyManagementAlgorithm for AesKeyWrap {
    fn name(&self) -> &'static str {
        match self.bits {
            128 => "A128KW",
            192 => "A192KW",
            _ => "A256KW",
        }
    }

    fn allowed_key_types(&self) -> &'static [KeyType] {
        &[KeyType::Oct]
    }

    fn management(&self) -> KeyManagement<'_> {
        KeyManagement::Wrap(self)
    }
}

/// AES-GCM key wrap.
#[derive(Debug, Clone, Copy)]
pub struct AesGcmKeyWrap {
    bits: usize,
}

impl AesGcmKeyWrap {
    /// `A128GCMKW`, `A192GCMKW` or `A256GCMKW` by key size.
    ///
    /// # Errors
    ///
    /// * `Error::UnsupportedAlgorithm` - For any other size
    pub fn new(bits: usize) -> Result<Self> {
        match bits {
            128 | 192 | 256 => Ok(Self { bits }),
            other => Err(Error::unsupported(format!("A{other}GCMKW"))),
        }
    }

    fn iv_and_tag(header: &Header) -> Result<(Vec<u8>, Vec<u8>)> {
        let iv = header.decode_param("iv")?;
        let tag = header.decode_param("tag")?;
        if iv.len() != 12 || tag.len() != 16 {
            return Err(Error::structural("GCM key wrap requires a 96-bit iv and 128-bit tag"));
        }
        Ok((iv, tag))
    }
}

impl KeyWrapping for AesGcmKeyWrap {
    fn wrap_key(&self, key: &Key, cek: &[u8], _header: &Header) -> Result<(Vec<u8>, Header)> {
        self.check_key(key)?;
        let kek = wrapping_key(key, self.bits)?;
        let iv = random_bytes(12)?;
        let (wrapped, tag) = match self.bits {
            128 => gcm_encrypt::<Aes128Gcm>(&kek, &iv, b"", cek)?,
            192 => gcm_encrypt::<Aes192Gcm>(&kek, &iv, b"", cek)?,
            _ => gcm_encrypt::<Aes256Gcm>(&kek, &iv, b"", cek)?,
        };
        let extra = Header::new()
            .with("iv", b64_encode(&iv))
            .with("tag", b64_encode(&tag));
        Ok((wrapped, extra))
    }

    fn unwrap_key(&self, key: &Key, encrypted_key: &[u8], header: &Header) -> Result<Cek> {
        self.check_key(key)?;
        let kek = wrapping_key(key, self.bits)?;
        let (iv, tag) = Self::iv_and_tag(header)?;
        let cek = match self.bits {
            128 => gcm_decrypt::<Aes128Gcm>(&kek, &iv, b"", encrypted_key, &tag)?,
            192 => gcm_decrypt::<Aes192Gcm>(&kek, &iv, b"", encrypted_key, &tag)?,
            _ => gcm_decrypt::<Aes256Gcm>(&kek, &iv, b"", encrypted_key, &tag)?,
        };
        Ok(Zeroizing::new(cek))
    }
}

impl KeyManagementAlgorithm for AesGcmKeyWrap {
    fn name(&self) -> &'static str {
        match self.bits {
            128 => "A128GCMKW",
            192 => "A192GCMKW",
            _ => "A256GCMKW",
        }
    }

    fn allowed_key_types(&self) -> &'static [KeyType] {
        &[KeyType::Oct]
    }

    fn management(&self) -> KeyManagement<'_> {
        KeyManagement::Wrap(self)
    }

    fn check_decryption_header(&self, header: &Header) -> Result<()> {
        Self::iv_and_tag(header).map(|_| ())
    }
}

/// PBES2 with HMAC-SHA2 and AES Key Wrap.
#[derive(Debug, Clone, Copy)]
pub struct Pbes2 {
    bits: usize,
    salt_size: usize,
    iterations: u32,
    max_iterations: u32,
}

impl Pbes2 {
    /// The PBES2 variant wrapping with a `bits`-bit derived key, tuned by
    /// `config`.
    ///
    /// # Errors
    ///
    /// * `Error::UnsupportedAlgorithm` - If `bits` is not 128, 192 or 256
    pub fn new(bits: usize, config: &EngineConfig) -> Result<Self> {
        match bits {
            128 | 192 | 256 => Ok(Self {
                bits,
                salt_size: config.pbes2_salt_size,
                iterations: config.pbes2_iterations,
                max_iterations: config.pbes2_max_iterations,
            }),
            other => Err(Error::unsupported(format!("PBES2 with A{other}KW"))),
        }
    }

    /// `alg || 0x00 || p2s`
    fn salt_input(&self, p2s: &[u8]) -> Vec<u8> {
        let name = self.name().as_bytes();
        let mut salt = Vec::with_capacity(name.len() + 1 + p2s.len());
        salt.extend_from_slice(name);
        salt.push(0x00);
        salt.extend_from_slice(p2s);
        salt
    }

    fn derive(&self, password: &[u8], p2s: &[u8], p2c: u32) -> Zeroizing<Vec<u8>> {
        let salt = self.salt_input(p2s);
        let mut kek = Zeroizing::new(vec![0u8; self.bits / 8]);
        match self.bits {
            128 => pbkdf2::pbkdf2_hmac::<Sha256>(password, &salt, p2c, &mut kek),
            192 => pbkdf2::pbkdf2_hmac::<Sha384>(password, &salt, p2c, &mut kek),
            _ => pbkdf2::pbkdf2_hmac::<Sha512>(password, &salt, p2c, &mut kek),
        }
        kek
    }

    fn salt_and_count(&self, header: &Header) -> Result<(Vec<u8>, u32)> {
        let p2s = header.decode_param("p2s")?;
        let p2c = header
            .get("p2c")
            .and_then(Value::as_u64)
            .ok_or_else(|| Error::structural("missing header parameter p2c"))?;
        if p2c == 0 || p2c > u64::from(self.max_iterations) {
            return Err(Error::structural(format!(
                "p2c must be between 1 and {}",
                self.max_iterations
            )));
        }
        let p2c = u32::try_from(p2c).map_err(|_| Error::structural("p2c out of range"))?;
        Ok((p2s, p2c))
    }
}

impl KeyWrapping for Pbes2 {
    fn wrap_key(&self, key: &Key, cek: &[u8], _header: &Header) -> Result<(Vec<u8>, Header)> {
        self.check_key(key)?;
        let password = key.decode("k")?;
        let p2s = random_bytes(self.salt_size)?;
        let kek = self.derive(&password, &p2s, self.iterations);
        let extra = Header::new()
            .with("p2s", b64_encode(&p2s))
            .with("p2c", self.iterations);
        Ok((aes_kw_wrap(&kek, cek)?, extra))
    }

    fn unwrap_key(&self, key: &Key, encrypted_key: &[u8], header: &Header) -> Result<Cek> {
        self.check_key(key)?;
        let password = key.decode("k")?;
        let (p2s, p2c) = self.salt_and_count(header)?;
        let kek = self.derive(&password, &p2s, p2c);
        aes_kw_unwrap(&kek, encrypted_key)
    }
}

impl KeyManagementAlgorithm for Pbes2 {
    fn name(&self) -> &'static str {
        match self.bits {
            128 => "PBES2-HS256+A128KW",
            192 => "PBES2-HS384+A192KW",
            _ => "PBES2-HS512+A256KW",
        }
    }

    fn allowed_key_types(&self) -> &'static [KeyType] {
        &[KeyType::Oct]
    }

    fn management(&self) -> KeyManagement<'_> {
        KeyManagement::Wrap(self)
    }

    fn check_decryption_header(&self, header: &Header) -> Result<()> {
        self.salt_and_count(header).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::b64_decode;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_rfc3394_vector() {
        let kek: Vec<u8> = (0u8..16).collect();
        let data = b64_decode("data", "ABEiM0RVZneImaq7zN3u_w").unwrap();
        let wrapped = aes_kw_wrap(&kek, &data).unwrap();
        assert_eq!(
            b64_encode(&wrapped),
            b64_encode([
                0x1F, 0xA6, 0x8B, 0x0A, 0x81, 0x12, 0xB4, 0x47, 0xAE, 0xF3, 0x4B, 0xD8, 0xFB,
                0x5A, 0x7B, 0x82, 0x9D, 0x3E, 0x86, 0x23, 0x71, 0xD2, 0xCF, 0xE5,
            ])
        );
        assert_eq!(aes_kw_unwrap(&kek, &wrapped).unwrap().as_slice(), data.as_slice());
    }

    #[test]
    fn test_wrap_unwrap_every_size() {
        let config = EngineConfig::default();
        let mut algorithms: Vec<Box<dyn KeyWrapping>> = Vec::new();
        let mut keys = Vec::new();
        for bits in [128, 192, 256] {
            algorithms.push(Box::new(AesKeyWrap::new(bits).unwrap()));
            keys.push(Key::generate_oct(bits).unwrap());
            algorithms.push(Box::new(AesGcmKeyWrap::new(bits).unwrap()));
            keys.push(Key::generate_oct(bits).unwrap());
            algorithms.push(Box::new(Pbes2::new(bits, &config).unwrap()));
            keys.push(Key::from_password("correct horse battery staple"));
        }

        for (alg, key) in algorithms.iter().zip(&keys) {
            for cek_bits in [128, 256, 512] {
                let cek = random_bytes(cek_bits / 8).unwrap();
                let (wrapped, extra) = alg.wrap_key(key, &cek, &Header::new()).unwrap();
                let unwrapped = alg.unwrap_key(key, &wrapped, &extra).unwrap();
                assert_eq!(unwrapped.as_slice(), cek.as_slice());
            }
        }
    }

    #[test]
    fn test_wrong_key_fails() {
        let alg = AesKeyWrap::new(128).unwrap();
        let key = Key::generate_oct(128).unwrap();
        let other = Key::generate_oct(128).unwrap();
        let (wrapped, _) = alg.wrap_key(&key, &[1u8; 32], &Header::new()).unwrap();
        assert!(matches!(
            alg.unwrap_key(&other, &wrapped, &Header::new()),
            Err(Error::Cryptographic)
        ));
        assert!(matches!(
            alg.wrap_key(&Key::generate_oct(256).unwrap(), &[1u8; 32], &Header::new()),
            Err(Error::KeyFormat(_))
        ));
        assert!(matches!(
            alg.wrap_key(&Key::generate_x25519(), &[1u8; 32], &Header::new()),
            Err(Error::KeyFormat(_))
        ));
    }

    #[test]
    fn test_gcm_wrap_headers() {
        let alg = AesGcmKeyWrap::new(256).unwrap();
        let key = Key::generate_oct(256).unwrap();
        let (wrapped, extra) = alg.wrap_key(&key, &[9u8; 32], &Header::new()).unwrap();

        assert_eq!(extra.decode_param("iv").unwrap().len(), 12);
        assert_eq!(extra.decode_param("tag").unwrap().len(), 16);
        assert!(alg.check_decryption_header(&extra).is_ok());

        let no_tag = Header::new().with("iv", extra.get_str("iv").unwrap());
        assert!(matches!(
            alg.check_decryption_header(&no_tag),
            Err(Error::Structural(_))
        ));
        assert!(matches!(
            alg.unwrap_key(&key, &wrapped, &no_tag),
            Err(Error::Structural(_))
        ));

        let mut tampered = extra.clone();
        tampered.insert("tag", b64_encode([0u8; 16]));
        assert!(matches!(
            alg.unwrap_key(&key, &wrapped, &tampered),
            Err(Error::Cryptographic)
        ));
    }

    #[test]
    fn test_pbes2_parameters() {
        let config = EngineConfig {
            pbes2_salt_size: 16,
            pbes2_iterations: 1000,
            pbes2_max_iterations: 2000,
            ..EngineConfig::default()
        };
        let alg = Pbes2::new(128, &config).unwrap();
        let key = Key::from_password("Thus from my lips, by yours, my sin is purged.");
        let (wrapped, extra) = alg.wrap_key(&key, &[3u8; 16], &Header::new()).unwrap();

        assert_eq!(extra.decode_param("p2s").unwrap().len(), 16);
        assert_eq!(extra.get("p2c").and_then(Value::as_u64), Some(1000));

        let too_many = extra.clone().with("p2c", 5000);
        assert!(matches!(
            alg.check_decryption_header(&too_many),
            Err(Error::Structural(_))
        ));
        let missing = Header::new().with("p2c", 1000);
        assert!(alg.check_decryption_header(&missing).is_err());

        let wrong = Key::from_password("wrong");
        assert!(matches!(
            alg.unwrap_key(&wrong, &wrapped, &extra),
            Err(Error::Cryptographic)
        ));
    }

    #[test]
    fn test_pbes2_salt_binds_algorithm_name() {
        let config = EngineConfig::default();
        let alg = Pbes2::new(256, &config).unwrap();
        let salt = alg.salt_input(b"\x01\x02");
        assert_eq!(&salt[..18], b"PBES2-HS512+A256KW");
        assert_eq!(&salt[18..], &[0, 1, 2]);
    }
}

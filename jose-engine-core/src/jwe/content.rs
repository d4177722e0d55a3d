//! Content encryption algorithms (`enc`).
//!
//! This module provides the AEAD constructions JWE uses to encrypt the
//! payload with the CEK:
//! - `A128GCM`, `A192GCM` and `A256GCM` (AES-GCM, 96-bit IV, 128-bit tag)
//! - `A128CBC-HS256`, `A192CBC-HS384` and `A256CBC-HS512` (AES-CBC with
//!   PKCS#7 padding, authenticated with a truncated HMAC)
//!
//! # Security Considerations
//!
//! - Authentication tags are validated in constant time
//! - CBC padding is only inspected after the tag has been verified
//! - Every decryption failure is reported as `Error::Cryptographic`

use std::fmt;

use aes::cipher::consts::{U12, U16};
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::{Aes128, Aes192, Aes256};
use aes_gcm::aead::AeadInPlace;
use aes_gcm::{Aes128Gcm, Aes256Gcm, AesGcm};
use hmac::{Hmac, Mac};
use sha2::{Sha256, Sha384, Sha512};
use subtle::ConstantTimeEq;

use crate::error::{Error, Result};

pub(crate) type Aes192Gcm = AesGcm<Aes192, U12>;

/// AES block size in bytes.
const BLOCK_SIZE: usize = 16;

/// A JWE `enc` implementation.
pub trait ContentEncryptionAlgorithm: Send + Sync + fmt::Debug {
    /// The JOSE `enc` name.
    fn name(&self) -> &'static str;

    /// Required CEK size in bits.
    fn cek_size(&self) -> usize;

    /// Required IV size in bits.
    fn iv_size(&self) -> usize;

    /// Encrypts `plaintext`, returning `(ciphertext, tag)`.
    ///
    /// # Errors
    ///
    /// * `Error::KeyFormat` - If the CEK or IV has the wrong length
    fn encrypt(&self, cek: &[u8], iv: &[u8], aad: &[u8], plaintext: &[u8])
        -> Result<(Vec<u8>, Vec<u8>)>;

    /// Authenticates and decrypts `ciphertext`.
    ///
    /// # Errors
    ///
    /// * `Error::Cryptographic` - On any length, tag or padding failure
    fn decrypt(
        &self,
        cek: &[u8],
        iv: &[u8],
        aad: &[u8],
        ciphertext: &[u8],
        tag: &[u8],
    ) -> Result<Vec<u8>>;
}

/// AES-GCM content encryption.
#[derive(Debug, Clone, Copy)]
pub struct AesGcmEncryption {
    key_bits: usize,
}

impl AesGcmEncryption {
    /// `A128GCM`
    #[must_use]
    pub fn a128() -> Self {
        Self { key_bits: 128 }
    }

    /// `A192GCM`
    #[must_use]
    pub fn a192() -> Self {
        Self { key_bits: 192 }
    }

    /// `A256GCM`
    #[must_use]
    pub fn a256() -> Self {
        Self { key_bits: 256 }
    }
}

impl ContentEncryptionAlgorithm for AesGcmEncryption {
    fn name(&self) -> &'static str {
        match self.key_bits {
            128 => "A128GCM",
            192 => "A192GCM",
            _ => "A256GCM",
        }
    }

    fn cek_size(&self) -> usize {
        self.key_bits
    }

    fn iv_size(&self) -> usize {
        96
    }

    fn encrypt(
        &self,
        cek: &[u8],
        iv: &[u8],
        aad: &[u8],
        plaintext: &[u8],
    ) -> Result<(Vec<u8>, Vec<u8>)> {
        if cek.len() * 8 != self.key_bits || iv.len() != 12 {
            return Err(Error::key_format(format!(
                "{} requires a {}-bit key and a 96-bit IV",
                self.name(),
                self.key_bits
            )));
        }
        match self.key_bits {
            128 => gcm_encrypt::<Aes128Gcm>(cek, iv, aad, plaintext),
            192 => gcm_encrypt::<Aes192Gcm>(cek, iv, aad, plaintext),
            _ => gcm_encrypt::<Aes256Gcm>(cek, iv, aad, plaintext),
        }
    }

    fn decrypt(
        &self,
        cek: &[u8],
        iv: &[u8],
        aad: &[u8],
        ciphertext: &[u8],
        tag: &[u8],
    ) -> Result<Vec<u8>> {
        if cek.len() * 8 != self.key_bits || iv.len() != 12 || tag.len() != 16 {
            return Err(Error::Cryptographic);
        }
        match self.key_bits {
            128 => gcm_decrypt::<Aes128Gcm>(cek, iv, aad, ciphertext, tag),
            192 => gcm_decrypt::<Aes192Gcm>(cek, iv, aad, ciphertext, tag),
            _ => gcm_decrypt::<Aes256Gcm>(cek, iv, aad, ciphertext, tag),
        }
    }
}

/// Encrypts with AES-GCM and splits off the tag.
///
/// Key and nonce lengths are checked by the caller.
pub(crate) fn gcm_encrypt<A>(
    key: &[u8],
    iv: &[u8],
    aad: &[u8],
    plaintext: &[u8],
) -> Result<(Vec<u8>, Vec<u8>)>
where
    A: AeadInPlace<NonceSize = U12, TagSize = U16> + KeyInit,
{
    let cipher = A::new_from_slice(key).map_err(|_| Error::Cryptographic)?;
    let mut buffer = plaintext.to_vec();
    let tag = cipher
        .encrypt_in_place_detached(GenericArray::from_slice(iv), aad, &mut buffer)
        .map_err(|_| Error::Cryptographic)?;
    Ok((buffer, tag.to_vec()))
}

/// Decrypts AES-GCM with a detached tag.
///
/// Key, nonce and tag lengths are checked by the caller.
pub(crate) fn gcm_decrypt<A>(
    key: &[u8],
    iv: &[u8],
    aad: &[u8],
    ciphertext: &[u8],
    tag: &[u8],
) -> Result<Vec<u8>>
where
    A: AeadInPlace<NonceSize = U12, TagSize = U16> + KeyInit,
{
    let cipher = A::new_from_slice(key).map_err(|_| Error::Cryptographic)?;
    let mut buffer = ciphertext.to_vec();
    cipher
        .decrypt_in_place_detached(
            GenericArray::from_slice(iv),
            aad,
            &mut buffer,
            GenericArray::from_slice(tag),
        )
        .map_err(|_| Error::Cryptographic)?;
    Ok(buffer)
}

/// AES-CBC with HMAC-SHA2 content encryption.
///
/// The CEK is split in two: the first half keys the HMAC, the second half
/// keys AES. The tag is the first half of
/// `HMAC(AAD || IV || ciphertext || AL)`, where `AL` is the AAD length in
/// bits as a 64-bit big-endian integer.
#[derive(Debug, Clone, Copy)]
pub struct AesCbcHmacEncryption {
    key_bits: usize,
}

impl AesCbcHmacEncryption {
    /// `A128CBC-HS256`
    #[must_use]
    pub fn a128() -> Self {
        Self { key_bits: 256 }
    }

    /// `A192CBC-HS384`
    #[must_use]
    pub fn a192() -> Self {
        Self { key_bits: 384 }
    }

    /// `A256CBC-HS512`
    #[must_use]
    pub fn a256() -> Self {
        Self { key_bits: 512 }
    }

    fn tag(&self, mac_key: &[u8], aad: &[u8], iv: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
        let al = (aad.len() as u64 * 8).to_be_bytes();
        let parts: [&[u8]; 4] = [aad, iv, ciphertext, &al];
        let mut full = match self.key_bits {
            256 => hmac_parts::<Hmac<Sha256>>(mac_key, &parts)?,
            384 => hmac_parts::<Hmac<Sha384>>(mac_key, &parts)?,
            _ => hmac_parts::<Hmac<Sha512>>(mac_key, &parts)?,
        };
        full.truncate(mac_key.len());
        Ok(full)
    }
}

impl ContentEncryptionAlgorithm for AesCbcHmacEncryption {
    fn name(&self) -> &'static str {
        match self.key_bits {
            256 => "A128CBC-HS256",
            384 => "A192CBC-HS384",
            _ => "A256CBC-HS512",
        }
    }

    fn cek_size(&self) -> usize {
        self.key_bits
    }

    fn iv_size(&self) -> usize {
        128
    }

    fn encrypt(
        &self,
        cek: &[u8],
        iv: &[u8],
        aad: &[u8],
        plaintext: &[u8],
    ) -> Result<(Vec<u8>, Vec<u8>)> {
        if cek.len() * 8 != self.key_bits || iv.len() != BLOCK_SIZE {
            return Err(Error::key_format(format!(
                "{} requires a {}-bit key and a 128-bit IV",
                self.name(),
                self.key_bits
            )));
        }
        let (mac_key, enc_key) = cek.split_at(cek.len() / 2);
        let ciphertext = match self.key_bits {
            256 => cbc_encrypt::<Aes128>(enc_key, iv, plaintext)?,
            384 => cbc_encrypt::<Aes192>(enc_key, iv, plaintext)?,
            _ => cbc_encrypt::<Aes256>(enc_key, iv, plaintext)?,
        };
        let tag = self.tag(mac_key, aad, iv, &ciphertext)?;
        Ok((ciphertext, tag))
    }

    fn decrypt(
        &self,
        cek: &[u8],
        iv: &[u8],
        aad: &[u8],
        ciphertext: &[u8],
        tag: &[u8],
    ) -> Result<Vec<u8>> {
        if cek.len() * 8 != self.key_bits
            || iv.len() != BLOCK_SIZE
            || tag.len() != cek.len() / 2
            || ciphertext.is_empty()
            || ciphertext.len() % BLOCK_SIZE != 0
        {
            return Err(Error::Cryptographic);
        }
        let (mac_key, enc_key) = cek.split_at(cek.len() / 2);
        let expected = self.tag(mac_key, aad, iv, ciphertext)?;
        if !bool::from(expected.ct_eq(tag)) {
            return Err(Error::Cryptographic);
        }
        match self.key_bits {
            256 => cbc_decrypt::<Aes128>(enc_key, iv, ciphertext),
            384 => cbc_decrypt::<Aes192>(enc_key, iv, ciphertext),
            _ => cbc_decrypt::<Aes256>(enc_key, iv, ciphertext),
        }
    }
}

fn hmac_parts<M: Mac + KeyInit>(key: &[u8], parts: &[&[u8]]) -> Result<Vec<u8>> {
    let mut mac = <M as KeyInit>::new_from_slice(key).map_err(|_| Error::Cryptographic)?;
    for part in parts {
        mac.update(part);
    }
    Ok(mac.finalize().into_bytes().to_vec())
}

#[allow(clippy::cast_possible_truncation)]
fn cbc_encrypt<C>(key: &[u8], iv: &[u8], plaintext: &[u8]) -> Result<Vec<u8>>
where
    C: BlockEncrypt<BlockSize = U16> + KeyInit,
{
    let cipher = C::new_from_slice(key).map_err(|_| Error::Cryptographic)?;

    // PKCS#7
    let padding_len = BLOCK_SIZE - (plaintext.len() % BLOCK_SIZE);
    let mut padded = plaintext.to_vec();
    padded.resize(plaintext.len() + padding_len, padding_len as u8);

    let mut previous = [0u8; BLOCK_SIZE];
    previous.copy_from_slice(iv);
    for chunk in padded.chunks_exact_mut(BLOCK_SIZE) {
        for (b, p) in chunk.iter_mut().zip(previous.iter()) {
            *b ^= p;
        }
        cipher.encrypt_block(GenericArray::from_mut_slice(chunk));
        previous.copy_from_slice(chunk);
    }
    Ok(padded)
}

fn cbc_decrypt<C>(key: &[u8], iv: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>>
where
    C: BlockDecrypt<BlockSize = U16> + KeyInit,
{
    let cipher = C::new_from_slice(key).map_err(|_| Error::Cryptographic)?;

    let mut plaintext = ciphertext.to_vec();
    let mut previous = [0u8; BLOCK_SIZE];
    previous.copy_from_slice(iv);
    for chunk in plaintext.chunks_exact_mut(BLOCK_SIZE) {
        let mut encrypted = [0u8; BLOCK_SIZE];
        encrypted.copy_from_slice(chunk);
        cipher.decrypt_block(GenericArray::from_mut_slice(chunk));
        for (b, p) in chunk.iter_mut().zip(previous.iter()) {
            *b ^= p;
        }
        previous = encrypted;
    }

    let padding_len = usize::from(*plaintext.last().ok_or(Error::Cryptographic)?);
    if padding_len == 0 || padding_len > BLOCK_SIZE {
        return Err(Error::Cryptographic);
    }
    let content_len = plaintext.len() - padding_len;
    if plaintext[content_len..]
        .iter()
        .any(|&b| usize::from(b) != padding_len)
    {
        return Err(Error::Cryptographic);
    }
    plaintext.truncate(content_len);
    Ok(plaintext)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::{b64_decode, random_bytes};
    use pretty_assertions::assert_eq;

    fn all() -> Vec<Box<dyn ContentEncryptionAlgorithm>> {
        vec![
            Box::new(AesGcmEncryption::a128()),
            Box::new(AesGcmEncryption::a192()),
            Box::new(AesGcmEncryption::a256()),
            Box::new(AesCbcHmacEncryption::a128()),
            Box::new(AesCbcHmacEncryption::a192()),
            Box::new(AesCbcHmacEncryption::a256()),
        ]
    }

    #[test]
    fn test_encrypt_decrypt() {
        for alg in all() {
            let cek = random_bytes(alg.cek_size() / 8).unwrap();
            let iv = random_bytes(alg.iv_size() / 8).unwrap();
            for len in [0, 1, 15, 16, 17, 100] {
                let plaintext = vec![0x42; len];
                let (ciphertext, tag) = alg.encrypt(&cek, &iv, b"aad", &plaintext).unwrap();
                let decrypted = alg.decrypt(&cek, &iv, b"aad", &ciphertext, &tag).unwrap();
                assert_eq!(decrypted, plaintext, "{}", alg.name());
            }
        }
    }

    #[test]
    fn test_tamper_detection() {
        for alg in all() {
            let cek = random_bytes(alg.cek_size() / 8).unwrap();
            let iv = random_bytes(alg.iv_size() / 8).unwrap();
            let (ciphertext, tag) = alg.encrypt(&cek, &iv, b"aad", b"test message").unwrap();

            let mut bad = ciphertext.clone();
            bad[0] ^= 1;
            assert!(matches!(
                alg.decrypt(&cek, &iv, b"aad", &bad, &tag),
                Err(Error::Cryptographic)
            ));

            let mut bad_tag = tag.clone();
            bad_tag[0] ^= 1;
            assert!(alg.decrypt(&cek, &iv, b"aad", &ciphertext, &bad_tag).is_err());

            let mut bad_iv = iv.clone();
            bad_iv[0] ^= 1;
            assert!(alg.decrypt(&cek, &bad_iv, b"aad", &ciphertext, &tag).is_err());

            assert!(alg.decrypt(&cek, &iv, b"other", &ciphertext, &tag).is_err());
        }
    }

    #[test]
    fn test_invalid_key_material() {
        let alg = AesGcmEncryption::a256();
        assert!(matches!(
            alg.encrypt(&[0; 16], &[0; 12], b"", b"x"),
            Err(Error::KeyFormat(_))
        ));
        assert!(alg.encrypt(&[0; 32], &[0; 8], b"", b"x").is_err());

        let alg = AesCbcHmacEncryption::a128();
        assert!(alg.encrypt(&[0; 16], &[0; 16], b"", b"x").is_err());
        assert!(matches!(
            alg.decrypt(&[0; 32], &[0; 16], b"", &[0; 15], &[0; 16]),
            Err(Error::Cryptographic)
        ));
    }

    #[test]
    fn test_rfc7516_a3_content() {
        // RFC 7516 appendix A.3: A128CBC-HS256 with the unwrapped CEK
        let cek: [u8; 32] = [
            4, 211, 31, 197, 84, 157, 252, 254, 11, 100, 157, 250, 63, 170, 106, 206, 107, 124,
            212, 45, 111, 107, 9, 219, 200, 177, 0, 240, 143, 156, 44, 207,
        ];
        let iv = b64_decode("iv", "AxY8DCtDaGlsbGljb3RoZQ").unwrap();
        let aad = b"eyJhbGciOiJBMTI4S1ciLCJlbmMiOiJBMTI4Q0JDLUhTMjU2In0";

        let alg = AesCbcHmacEncryption::a128();
        let (ciphertext, tag) = alg
            .encrypt(&cek, &iv, aad, b"Live long and prosper.")
            .unwrap();
        assert_eq!(
            ciphertext,
            b64_decode("ciphertext", "KDlTtXchhZTGufMYmOYGS4HffxPSUrfmqCHXaI9wOGY").unwrap()
        );
        assert_eq!(tag, b64_decode("tag", "U0m_YmjN04DJvceFICbCVQ").unwrap());
    }
}

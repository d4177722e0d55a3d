//! RSA key encryption: `RSA1_5`, `RSA-OAEP` and `RSA-OAEP-256`.
//!
//! The padding schemes of RFC 8017 are implemented here on top of raw
//! modular exponentiation with `rsa::BigUint`:
//! - RSAES-OAEP with MGF1 over SHA-1 or SHA-256 and an empty label
//! - RSAES-PKCS1-v1_5, kept for legacy tokens only
//!
//! A CEK longer than the OAEP capacity of the modulus is split into chunks,
//! each encrypted separately; the ciphertexts are concatenated.
//!
//! # Security Considerations
//!
//! - Every decryption failure is reported as the same `Error::Cryptographic`
//! - Padding checks accumulate their result with `subtle` instead of
//!   returning early
//! - `RSA1_5` logs a warning on every use

use rsa::BigUint;
use sha1::Sha1;
use sha2::{Digest, Sha256};
use subtle::{Choice, ConditionallySelectable, ConstantTimeEq};
use tracing::warn;
use zeroize::Zeroizing;

use super::types::{Cek, KeyEncryption, KeyManagement, KeyManagementAlgorithm};
use crate::error::{Error, Result};
use crate::header::Header;
use crate::key::{Key, KeyType};
use crate::utils::random_bytes;

/// Smallest PKCS#1 v1.5 padding string.
const PKCS1_MIN_PADDING: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Padding {
    Pkcs1v15,
    OaepSha1,
    OaepSha256,
}

/// RSA key encryption.
#[derive(Debug, Clone, Copy)]
pub struct RsaKeyEncryption {
    padding: Padding,
}

impl RsaKeyEncryption {
    /// `RSA1_5`, deprecated.
    #[must_use]
    pub fn rsa1_5() -> Self {
        Self {
            padding: Padding::Pkcs1v15,
        }
    }

    /// `RSA-OAEP` (SHA-1).
    #[must_use]
    pub fn oaep() -> Self {
        Self {
            padding: Padding::OaepSha1,
        }
    }

    /// `RSA-OAEP-256`.
    #[must_use]
    pub fn oaep_256() -> Self {
        Self {
            padding: Padding::OaepSha256,
        }
    }

    /// Whether this is the legacy PKCS#1 v1.5 mode.
    #[must_use]
    pub fn is_deprecated(&self) -> bool {
        self.padding == Padding::Pkcs1v15
    }
}

impl KeyEncryption for RsaKeyEncryption {
    fn encrypt_key(&self, key: &Key, cek: &[u8], _header: &Header) -> Result<(Vec<u8>, Header)> {
        self.check_key(key)?;
        let (n, e) = key.rsa_modulus_exponent()?;
        let k = modulus_len(&n);

        let encrypted = match self.padding {
            Padding::Pkcs1v15 => {
                warn!("Encrypting a CEK with deprecated RSA1_5");
                let em = pkcs1_encode(cek, k)?;
                rsa_ep(&n, &e, &em, k)
            }
            Padding::OaepSha1 => oaep_encrypt::<Sha1>(&n, &e, cek, k)?,
            Padding::OaepSha256 => oaep_encrypt::<Sha256>(&n, &e, cek, k)?,
        };
        Ok((encrypted, Header::new()))
    }

    fn decrypt_key(&self, key: &Key, encrypted_key: &[u8], _header: &Header) -> Result<Cek> {
        self.check_key(key)?;
        if !key.has("d") {
            return Err(Error::key_format("RSA decryption requires the private exponent d"));
        }
        let n = key.rsa_component("n")?;
        let d = Zeroizing::new(key.rsa_component("d")?);
        let k = modulus_len(&n);

        match self.padding {
            Padding::Pkcs1v15 => {
                warn!("Decrypting a CEK with deprecated RSA1_5");
                if encrypted_key.len() != k {
                    return Err(Error::Cryptographic);
                }
                let em = rsa_dp(&n, &d, encrypted_key, k)?;
                pkcs1_decode(&em)
            }
            Padding::OaepSha1 => oaep_decrypt::<Sha1>(&n, &d, encrypted_key, k),
            Padding::OaepSha256 => oaep_decrypt::<Sha256>(&n, &d, encrypted_key, k),
        }
    }
}

impl KeyManagementAlgorithm for RsaKeyEncryption {
    fn name(&self) -> &'static str {
        match self.padding {
            Padding::Pkcs1v15 => "RSA1_5",
            Padding::OaepSha1 => "RSA-OAEP",
            Padding::OaepSha256 => "RSA-OAEP-256",
        }
    }

    fn allowed_key_types(&self) -> &'static [KeyType] {
        &[KeyType::Rsa]
    }

    fn management(&self) -> KeyManagement<'_> {
        KeyManagement::Encrypt(self)
    }
}

fn modulus_len(n: &BigUint) -> usize {
    n.bits().div_ceil(8)
}

fn left_pad(bytes: &[u8], k: usize) -> Vec<u8> {
    let mut out = vec![0u8; k.saturating_sub(bytes.len())];
    out.extend_from_slice(bytes);
    out
}

/// RSAEP: `c = m^e mod n`, as `k` bytes.
fn rsa_ep(n: &BigUint, e: &BigUint, em: &[u8], k: usize) -> Vec<u8> {
    let m = BigUint::from_bytes_be(em);
    left_pad(&m.modpow(e, n).to_bytes_be(), k)
}

/// RSADP: `m = c^d mod n`, as `k` bytes.
fn rsa_dp(n: &BigUint, d: &BigUint, c: &[u8], k: usize) -> Result<Zeroizing<Vec<u8>>> {
    let c = BigUint::from_bytes_be(c);
    if &c >= n {
        return Err(Error::Cryptographic);
    }
    Ok(Zeroizing::new(left_pad(&c.modpow(d, n).to_bytes_be(), k)))
}

/// MGF1 from RFC 8017 appendix B.2.1.
#[allow(clippy::cast_possible_truncation)]
fn mgf1<D: Digest>(seed: &[u8], len: usize) -> Vec<u8> {
    let mut mask = Vec::with_capacity(len + <D as Digest>::output_size());
    let mut counter: u32 = 0;
    while mask.len() < len {
        let mut hasher = D::new();
        hasher.update(seed);
        hasher.update(counter.to_be_bytes());
        mask.extend_from_slice(&hasher.finalize());
        counter += 1;
    }
    mask.truncate(len);
    mask
}

fn xor_in_place(target: &mut [u8], mask: &[u8]) {
    for (t, m) in target.iter_mut().zip(mask) {
        *t ^= m;
    }
}

/// Largest message one OAEP block can carry.
fn oaep_capacity<D: Digest>(k: usize) -> Result<usize> {
    let h_len = <D as Digest>::output_size();
    k.checked_sub(2 * h_len + 2)
        .filter(|capacity| *capacity > 0)
        .ok_or_else(|| Error::key_format("RSA modulus too small for OAEP"))
}

fn oaep_encrypt<D: Digest>(n: &BigUint, e: &BigUint, message: &[u8], k: usize) -> Result<Vec<u8>> {
    let capacity = oaep_capacity::<D>(k)?;
    let chunks: Vec<&[u8]> = if message.is_empty() {
        vec![message]
    } else {
        message.chunks(capacity).collect()
    };

    let mut out = Vec::with_capacity(chunks.len() * k);
    for chunk in chunks {
        let em = oaep_encode::<D>(chunk, k)?;
        out.extend(rsa_ep(n, e, &em, k));
    }
    Ok(out)
}

fn oaep_decrypt<D: Digest>(n: &BigUint, d: &BigUint, ciphertext: &[u8], k: usize) -> Result<Cek> {
    oaep_capacity::<D>(k)?;
    if ciphertext.is_empty() || ciphertext.len() % k != 0 {
        return Err(Error::Cryptographic);
    }
    let mut out = Zeroizing::new(Vec::new());
    for chunk in ciphertext.chunks(k) {
        let em = rsa_dp(n, d, chunk, k)?;
        out.extend_from_slice(&oaep_decode::<D>(&em)?);
    }
    Ok(out)
}

/// EME-OAEP encoding with an empty label.
fn oaep_encode<D: Digest>(message: &[u8], k: usize) -> Result<Zeroizing<Vec<u8>>> {
    let h_len = <D as Digest>::output_size();
    let db_len = k - h_len - 1;

    // DB = lHash || PS || 0x01 || M
    let mut db = Zeroizing::new(Vec::with_capacity(db_len));
    db.extend_from_slice(&D::digest(b""));
    db.resize(db_len - message.len() - 1, 0);
    db.push(0x01);
    db.extend_from_slice(message);

    let mut seed = Zeroizing::new(random_bytes(h_len)?);
    xor_in_place(&mut db, &mgf1::<D>(&seed, db_len));
    xor_in_place(&mut seed, &mgf1::<D>(&db, h_len));

    let mut em = Zeroizing::new(Vec::with_capacity(k));
    em.push(0x00);
    em.extend_from_slice(&seed);
    em.extend_from_slice(&db);
    Ok(em)
}

/// EME-OAEP decoding; every failure is the same error.
#[allow(clippy::cast_possible_truncation)]
fn oaep_decode<D: Digest>(em: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    let h_len = <D as Digest>::output_size();
    let (y, rest) = em.split_first().ok_or(Error::Cryptographic)?;
    let (masked_seed, masked_db) = rest.split_at(h_len);

    let mut seed = Zeroizing::new(masked_seed.to_vec());
    xor_in_place(&mut seed, &mgf1::<D>(masked_db, h_len));
    let mut db = Zeroizing::new(masked_db.to_vec());
    xor_in_place(&mut db, &mgf1::<D>(&seed, masked_db.len()));

    let l_hash = D::digest(b"");
    let mut valid = y.ct_eq(&0u8) & l_hash.as_slice().ct_eq(&db[..h_len]);

    // Find the 0x01 separator after the zero padding without branching
    let mut looking = Choice::from(1);
    let mut invalid = Choice::from(0);
    let mut index: u32 = 0;
    for (i, byte) in db[h_len..].iter().enumerate() {
        let is_zero = byte.ct_eq(&0u8);
        let is_one = byte.ct_eq(&1u8);
        index.conditional_assign(&(i as u32), looking & is_one);
        invalid |= looking & !is_zero & !is_one;
        looking &= !is_one;
    }
    valid &= !looking & !invalid;

    if !bool::from(valid) {
        return Err(Error::Cryptographic);
    }
    Ok(Zeroizing::new(db[h_len + index as usize + 1..].to_vec()))
}

/// EME-PKCS1-v1_5 encoding with a random non-zero padding string.
fn pkcs1_encode(message: &[u8], k: usize) -> Result<Zeroizing<Vec<u8>>> {
    let ps_len = k
        .checked_sub(message.len() + 3)
        .filter(|len| *len >= PKCS1_MIN_PADDING)
        .ok_or_else(|| Error::key_format("RSA modulus too small for the CEK"))?;

    let mut ps = random_bytes(ps_len)?;
    for byte in &mut ps {
        while *byte == 0 {
            *byte = random_bytes(1)?[0];
        }
    }

    let mut em = Zeroizing::new(Vec::with_capacity(k));
    em.extend_from_slice(&[0x00, 0x02]);
    em.extend_from_slice(&ps);
    em.push(0x00);
    em.extend_from_slice(message);
    Ok(em)
}

/// EME-PKCS1-v1_5 decoding; every failure is the same error.
#[allow(clippy::cast_possible_truncation)]
fn pkcs1_decode(em: &[u8]) -> Result<Cek> {
    if em.len() < PKCS1_MIN_PADDING + 3 {
        return Err(Error::Cryptographic);
    }
    let mut valid = em[0].ct_eq(&0u8) & em[1].ct_eq(&2u8);

    let mut looking = Choice::from(1);
    let mut index: u32 = 0;
    for (i, byte) in em[2..].iter().enumerate() {
        let is_zero = byte.ct_eq(&0u8);
        index.conditional_assign(&(i as u32), looking & is_zero);
        looking &= !is_zero;
    }
    valid &= !looking;
    valid &= !Choice::from(u8::from((index as usize) < PKCS1_MIN_PADDING));

    if !bool::from(valid) {
        return Err(Error::Cryptographic);
    }
    Ok(Zeroizing::new(em[2 + index as usize + 1..].to_vec()))
}

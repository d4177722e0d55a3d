//! Concat KDF (NIST SP 800-56A) as profiled by RFC 7518 section 4.6.2.

use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

/// Derives `key_bits` bits of key material from the shared secret `z`.
///
/// One SHA-256 round covers up to 256 bits; longer outputs continue with an
/// incremented round counter. `SuppPrivInfo` is always empty.
///
/// # Arguments
///
/// * `z` - The shared secret
/// * `algorithm` - `enc` for direct agreement, `alg` for agreement with wrapping
/// * `key_bits` - Output length in bits, a multiple of 8
/// * `apu` - Decoded `PartyUInfo`, empty when absent
/// * `apv` - Decoded `PartyVInfo`, empty when absent
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn concat_kdf(
    z: &[u8],
    algorithm: &str,
    key_bits: usize,
    apu: &[u8],
    apv: &[u8],
) -> Zeroizing<Vec<u8>> {
    let key_len = key_bits / 8;
    let block_size = <Sha256 as Digest>::output_size();
    let rounds = key_len.div_ceil(block_size);
    let mut output = Zeroizing::new(Vec::with_capacity(rounds * block_size));

    for round in 1..=rounds {
        let mut hasher = Sha256::new();
        hasher.update((round as u32).to_be_bytes());
        hasher.update(z);
        hasher.update((algorithm.len() as u32).to_be_bytes());
        hasher.update(algorithm.as_bytes());
        hasher.update((apu.len() as u32).to_be_bytes());
        hasher.update(apu);
        hasher.update((apv.len() as u32).to_be_bytes());
        hasher.update(apv);
        hasher.update((key_bits as u32).to_be_bytes());
        output.extend_from_slice(&hasher.finalize());
    }

    output.truncate(key_len);
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::b64_encode;
    use pretty_assertions::assert_eq;

    // RFC 7518 appendix C
    const Z: [u8; 32] = [
        158, 86, 217, 29, 129, 113, 53, 211, 114, 131, 66, 131, 191, 132, 38, 156, 251, 49, 110,
        163, 218, 128, 106, 72, 246, 218, 167, 121, 140, 254, 144, 196,
    ];

    #[test]
    fn test_rfc7518_vector() {
        let key = concat_kdf(&Z, "A128GCM", 128, b"Alice", b"Bob");
        assert_eq!(b64_encode(key.as_slice()), "VqqN6vgjbSBcIijNcacQGg");
    }

    #[test]
    fn test_empty_party_info_vector() {
        let key = concat_kdf(&Z, "A128GCM", 128, b"", b"");
        assert_eq!(b64_encode(key.as_slice()), "u5erXQ6FbY-PwD4mWyQqfQ");

        let wrap = concat_kdf(&Z, "ECDH-ES+A256KW", 256, b"", b"");
        assert_eq!(
            b64_encode(wrap.as_slice()),
            "iauDhjN1eAW9Z4yxZPJCd3aCTo94QVLyN0cJZEmSH0Y"
        );
    }

    #[test]
    fn test_output_lengths() {
        for bits in [128, 192, 256, 384, 512] {
            assert_eq!(concat_kdf(&Z, "A256CBC-HS512", bits, b"", b"").len(), bits / 8);
        }
    }

    #[test]
    fn test_second_round_extends_first() {
        // The first block depends on the requested length, so compare the
        // 512-bit output against a manual two-round computation instead.
        let long = concat_kdf(&Z, "A256CBC-HS512", 512, b"", b"");

        let round = |counter: u32| {
            let mut hasher = Sha256::new();
            hasher.update(counter.to_be_bytes());
            hasher.update(Z);
            hasher.update(13u32.to_be_bytes());
            hasher.update(b"A256CBC-HS512");
            hasher.update(0u32.to_be_bytes());
            hasher.update(0u32.to_be_bytes());
            hasher.update(512u32.to_be_bytes());
            hasher.finalize().to_vec()
        };
        let mut expected = round(1);
        expected.extend(round(2));
        assert_eq!(long.as_slice(), expected.as_slice());
    }

    #[test]
    fn test_inputs_are_bound() {
        let base = concat_kdf(&Z, "A128GCM", 128, b"", b"");
        assert_ne!(base, concat_kdf(&Z, "A128GCM", 128, b"Alice", b""));
        assert_ne!(base, concat_kdf(&Z, "A128GCM", 128, b"", b"Bob"));
        assert_ne!(base, concat_kdf(&Z, "A128KW", 128, b"", b""));
    }
}

//! Encoding and randomness helpers shared across the crate.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand_core::{OsRng, RngCore};
use zeroize::Zeroizing;

use crate::error::{Error, Result};

/// Encodes bytes as unpadded base64url.
pub fn b64_encode(data: impl AsRef<[u8]>) -> String {
    URL_SAFE_NO_PAD.encode(data)
}

/// Decodes strict unpadded base64url.
///
/// # Arguments
///
/// * `what` - Name of the decoded member, used in the error message
/// * `data` - The encoded text
///
/// # Errors
///
/// * `Error::Structural` - If the input is not canonical base64url
pub fn b64_decode(what: &str, data: &str) -> Result<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(data)
        .map_err(|_| Error::structural(format!("invalid base64url in {what}")))
}

/// Generates `size` random bytes from the operating system.
///
/// # Errors
///
/// * `Error::Randomness` - If the OS random source fails
pub fn random_bytes(size: usize) -> Result<Vec<u8>> {
    let mut bytes = vec![0u8; size];
    OsRng.try_fill_bytes(&mut bytes).map_err(|_| Error::Randomness)?;
    Ok(bytes)
}

/// Generates secret random bytes that are wiped on drop.
///
/// # Errors
///
/// * `Error::Randomness` - If the OS random source fails
pub fn random_secret(size: usize) -> Result<Zeroizing<Vec<u8>>> {
    random_bytes(size).map(Zeroizing::new)
}

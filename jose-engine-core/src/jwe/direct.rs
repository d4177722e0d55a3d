//! Direct use of a shared symmetric key as the CEK (`dir`).

use super::types::{Cek, DirectEncryption, KeyManagement, KeyManagementAlgorithm};
use crate::error::Result;
use crate::key::{Key, KeyType};

/// The `dir` algorithm.
#[derive(Debug, Clone, Copy, Default)]
pub struct Direct;

impl DirectEncryption for Direct {
    fn cek(&self, key: &Key) -> Result<Cek> {
        self.check_key(key)?;
        key.decode("k")
    }
}

impl KeyManagementAlgorithm for Direct {
    fn name(&self) -> &'static str {
        "dir"
    }

    fn allowed_key_types(&self) -> &'static [KeyType] {
        &[KeyType::Oct]
    }

    fn management(&self) -> KeyManagement<'_> {
        KeyManagement::Direct(self)
    }
}

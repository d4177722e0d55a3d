//! Engine configuration.
//!
//! Configuration is plain data, deserialisable from JSON with defaults for
//! every field. It is consumed once, when the
//! [`AlgorithmRegistry`](crate::registry::AlgorithmRegistry) is built.
//!
//! # Examples
//!
//! ```rust
//! use jose_engine_core::config::{CurveBackend, EngineConfig};
//!
//! let config = EngineConfig::from_json(r#"{"allow_rsa1_5": false}"#).unwrap();
//! assert!(!config.allow_rsa1_5);
//! assert_eq!(config.curve_backend, CurveBackend::Native);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Smallest accepted PBES2 salt, in bytes.
pub const MIN_PBES2_SALT_SIZE: usize = 8;

/// Smallest accepted PBES2 iteration count.
pub const MIN_PBES2_ITERATIONS: u32 = 1000;

/// Implementation used for NIST curve scalar multiplication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CurveBackend {
    /// Constant-time arithmetic from the `p256`/`p384`/`p521` crates
    #[default]
    Native,
    /// Affine big-integer double-and-add
    Software,
}

/// Tunables for the algorithm suite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Whether the legacy `RSA1_5` key encryption is registered
    pub allow_rsa1_5: bool,
    /// Size of the random PBES2 salt (`p2s`) in bytes
    pub pbes2_salt_size: usize,
    /// PBES2 iteration count (`p2c`) used when encrypting
    pub pbes2_iterations: u32,
    /// Largest `p2c` accepted when decrypting
    pub pbes2_max_iterations: u32,
    /// Scalar multiplication backend for P-256/P-384/P-521
    pub curve_backend: CurveBackend,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            allow_rsa1_5: true,
            pbes2_salt_size: 64,
            pbes2_iterations: 4096,
            pbes2_max_iterations: 1_000_000,
            curve_backend: CurveBackend::Native,
        }
    }
}

impl EngineConfig {
    /// Parses and validates a configuration document.
    ///
    /// # Errors
    ///
    /// * `Error::Config` - If the document is not valid JSON for this type or
    ///   a value is out of range
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that every value is usable.
    ///
    /// # Errors
    ///
    /// * `Error::Config` - On the first out-of-range value
    pub fn validate(&self) -> Result<()> {
        if self.pbes2_salt_size < MIN_PBES2_SALT_SIZE {
            return Err(Error::Config(format!(
                "pbes2_salt_size must be at least {MIN_PBES2_SALT_SIZE}"
            )));
        }
        if self.pbes2_iterations < MIN_PBES2_ITERATIONS {
            return Err(Error::Config(format!(
                "pbes2_iterations must be at least {MIN_PBES2_ITERATIONS}"
            )));
        }
        if self.pbes2_max_iterations < self.pbes2_iterations {
            return Err(Error::Config(
                "pbes2_max_iterations is below pbes2_iterations".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::from_json("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert!(config.allow_rsa1_5);
        assert_eq!(config.pbes2_salt_size, 64);
        assert_eq!(config.pbes2_iterations, 4096);
    }

    #[test]
    fn test_backend_names() {
        let config = EngineConfig::from_json(r#"{"curve_backend":"software"}"#).unwrap();
        assert_eq!(config.curve_backend, CurveBackend::Software);
        assert!(EngineConfig::from_json(r#"{"curve_backend":"gpu"}"#).is_err());
    }

    #[test]
    fn test_out_of_range() {
        for json in [
            r#"{"pbes2_salt_size": 4}"#,
            r#"{"pbes2_iterations": 10}"#,
            r#"{"pbes2_iterations": 5000, "pbes2_max_iterations": 4096}"#,
        ] {
            assert!(matches!(EngineConfig::from_json(json), Err(Error::Config(_))));
        }
    }
}

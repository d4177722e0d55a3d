//! JOSE header parameter sets.
//!
//! Headers are ordered JSON objects. A token carries up to three of them
//! (shared protected, shared unprotected and per-recipient or per-signature
//! unprotected), and the effective header of a recipient is their union.
//! A parameter name may appear in only one location.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::utils::{b64_decode, b64_encode};

/// A set of JOSE header parameters.
///
/// # Examples
///
/// ```rust
/// use jose_engine_core::header::Header;
///
/// let header = Header::new().with("alg", "A128KW").with("enc", "A128GCM");
/// assert_eq!(header.get_str("alg"), Some("A128KW"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Header(Map<String, Value>);

impl Header {
    /// Creates an empty header.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a parameter, builder style.
    #[must_use]
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.0.insert(name.to_string(), value.into());
        self
    }

    /// Sets a parameter, replacing any previous value.
    pub fn insert(&mut self, name: &str, value: impl Into<Value>) {
        self.0.insert(name.to_string(), value.into());
    }

    /// Returns a parameter value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Returns a string parameter.
    #[must_use]
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    /// Whether the parameter is present.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Whether the header has no parameters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates parameter names in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Copies every parameter of `other` into this header.
    pub fn extend(&mut self, other: Header) {
        self.0.extend(other.0);
    }

    /// Returns the parameters as a JSON object.
    #[must_use]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Reads a mandatory string parameter.
    ///
    /// # Errors
    ///
    /// * `Error::Structural` - If the parameter is absent or not a string
    pub fn require_str(&self, name: &str) -> Result<&str> {
        self.get_str(name)
            .ok_or_else(|| Error::structural(format!("missing header parameter {name}")))
    }

    /// Decodes a base64url string parameter.
    ///
    /// # Errors
    ///
    /// * `Error::Structural` - If the parameter is absent, not a string or
    ///   not base64url
    pub fn decode_param(&self, name: &str) -> Result<Vec<u8>> {
        b64_decode(name, self.require_str(name)?)
    }

    /// Decodes an optional base64url parameter, empty when absent.
    ///
    /// # Errors
    ///
    /// * `Error::Structural` - If the parameter is present but malformed
    pub fn decode_optional(&self, name: &str) -> Result<Vec<u8>> {
        match self.get(name) {
            None => Ok(Vec::new()),
            Some(_) => self.decode_param(name),
        }
    }

    /// Encodes the header as base64url(JSON).
    ///
    /// # Errors
    ///
    /// * `Error::Serialization` - If JSON encoding fails
    pub fn encode(&self) -> Result<String> {
        Ok(b64_encode(serde_json::to_vec(&self.0)?))
    }

    /// Decodes a base64url(JSON object) header.
    ///
    /// # Errors
    ///
    /// * `Error::Structural` - If the text is not base64url or does not hold
    ///   a JSON object
    pub fn decode(encoded: &str) -> Result<Self> {
        let bytes = b64_decode("protected header", encoded)?;
        match serde_json::from_slice(&bytes) {
            Ok(Value::Object(map)) => Ok(Self(map)),
            _ => Err(Error::structural("protected header is not a JSON object")),
        }
    }

    /// Builds the effective header from several locations.
    ///
    /// # Errors
    ///
    /// * `Error::Structural` - If a parameter appears in more than one location
    pub fn merge(parts: &[&Header]) -> Result<Self> {
        let mut complete = Map::new();
        for part in parts {
            for (name, value) in &part.0 {
                if complete.insert(name.clone(), value.clone()).is_some() {
                    return Err(Error::structural(format!(
                        "header parameter {name} is duplicated"
                    )));
                }
            }
        }
        Ok(Self(complete))
    }
}

impl From<Map<String, Value>> for Header {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Header parameters registered by RFC 7515, 7516 and 7518. They are never
/// extensions and may not appear in `crit`.
const REGISTERED: &[&str] = &[
    "alg", "enc", "zip", "jku", "jwk", "kid", "x5u", "x5c", "x5t", "x5t#S256", "typ", "cty",
    "crit", "epk", "apu", "apv", "iv", "tag", "p2s", "p2c",
];

/// Extensions this engine implements.
const UNDERSTOOD: &[&str] = &["b64"];

/// Validates the `crit` parameter.
///
/// `crit` must be a non-empty array of names and must sit in the protected
/// header. Every name it lists must be an understood extension and must be
/// present in the effective header.
///
/// # Errors
///
/// * `Error::Structural` - On any violation
pub fn check_critical(protected: &Header, complete: &Header) -> Result<()> {
    let Some(crit) = complete.get("crit") else {
        return Ok(());
    };
    if !protected.contains("crit") {
        return Err(Error::structural("crit must be integrity protected"));
    }
    let names = crit
        .as_array()
        .filter(|names| !names.is_empty())
        .ok_or_else(|| Error::structural("crit must be a non-empty array"))?;
    for name in names {
        let name = name
            .as_str()
            .ok_or_else(|| Error::structural("crit entries must be strings"))?;
        if REGISTERED.contains(&name) {
            return Err(Error::structural(format!(
                "registered header parameter {name} cannot be critical"
            )));
        }
        if !UNDERSTOOD.contains(&name) {
            return Err(Error::structural(format!(
                "critical extension {name} is not understood"
            )));
        }
        if !complete.contains(name) {
            return Err(Error::structural(format!(
                "critical header parameter {name} is missing"
            )));
        }
    }
    Ok(())
}

/// Whether `name` is listed in the protected `crit` array.
pub(crate) fn is_critical(protected: &Header, name: &str) -> bool {
    protected
        .get("crit")
        .and_then(Value::as_array)
        .is_some_and(|names| names.iter().any(|n| n.as_str() == Some(name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_encode_preserves_order() {
        let header = Header::new().with("alg", "A128KW").with("enc", "A128CBC-HS256");
        assert_eq!(
            header.encode().unwrap(),
            "eyJhbGciOiJBMTI4S1ciLCJlbmMiOiJBMTI4Q0JDLUhTMjU2In0"
        );
        let decoded = Header::decode("eyJhbGciOiJBMTI4S1ciLCJlbmMiOiJBMTI4Q0JDLUhTMjU2In0").unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn test_decode_rejects_non_objects() {
        assert!(matches!(Header::decode("W10"), Err(Error::Structural(_))));
        assert!(matches!(Header::decode("e30="), Err(Error::Structural(_))));
        assert!(matches!(Header::decode("bm90IGpzb24"), Err(Error::Structural(_))));
    }

    #[test]
    fn test_merge_rejects_duplicates() {
        let protected = Header::new().with("enc", "A128GCM");
        let shared = Header::new().with("kid", "1");
        let recipient = Header::new().with("alg", "A128KW");

        let complete = Header::merge(&[&protected, &shared, &recipient]).unwrap();
        assert_eq!(complete.keys().collect::<Vec<_>>(), vec!["enc", "kid", "alg"]);

        let clash = Header::new().with("enc", "A256GCM");
        assert!(matches!(
            Header::merge(&[&protected, &clash]),
            Err(Error::Structural(_))
        ));
    }

    #[test]
    fn test_decode_optional() {
        let header = Header::new().with("apu", "QWxpY2U").with("apv", 5);
        assert_eq!(header.decode_optional("apu").unwrap(), b"Alice");
        assert!(header.decode_optional("missing").unwrap().is_empty());
        assert!(header.decode_optional("apv").is_err());
    }

    #[test]
    fn test_critical() {
        let protected = Header::new()
            .with("alg", "HS256")
            .with("b64", false)
            .with("crit", json!(["b64"]));
        assert!(check_critical(&protected, &protected).is_ok());
        assert!(is_critical(&protected, "b64"));

        let missing = Header::new().with("crit", json!(["b64"]));
        assert!(matches!(check_critical(&missing, &missing), Err(Error::Structural(_))));

        let unknown = Header::new().with("exp", 1_300_819_380).with("crit", json!(["exp"]));
        assert!(matches!(check_critical(&unknown, &unknown), Err(Error::Structural(_))));

        let registered = Header::new().with("alg", "HS256").with("crit", json!(["alg"]));
        assert!(matches!(check_critical(&registered, &registered), Err(Error::Structural(_))));

        let empty = Header::new().with("crit", json!([]));
        assert!(check_critical(&empty, &empty).is_err());

        // crit in an unprotected location
        let unprotected = Header::new().with("b64", false).with("crit", json!(["b64"]));
        assert!(check_critical(&Header::new(), &unprotected).is_err());
    }
}

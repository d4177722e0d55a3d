//! JSON Web Key model.
//!
//! A [`Key`] is an immutable set of JWK parameters with a validated `kty`.
//! Algorithms read the parameters they need through the accessors here and
//! never parse any other key format.
//!
//! # Security Considerations
//!
//! - String parameters are wiped when the key is dropped
//! - `Debug` output never includes key material
//! - [`Key::to_public`] returns a new value and leaves the original untouched

use std::collections::BTreeMap;
use std::fmt;

use p256::elliptic_curve::sec1::ToEncodedPoint;
use rand_core::OsRng;
use rsa::traits::{PrivateKeyParts, PublicKeyParts};
use rsa::{BigUint, RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, Zeroizing};

use crate::error::{Error, Result};
use crate::utils::{b64_decode, b64_encode, random_bytes};

/// Private parameters removed by [`Key::to_public`].
const PRIVATE_PARAMS: [&str; 7] = ["d", "p", "q", "dp", "dq", "qi", "oth"];

/// The JWK `kty` discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyType {
    /// Symmetric octet sequence
    #[serde(rename = "oct")]
    Oct,
    /// RSA
    #[serde(rename = "RSA")]
    Rsa,
    /// Elliptic curve (NIST)
    #[serde(rename = "EC")]
    Ec,
    /// Octet key pair (X25519, Ed25519)
    #[serde(rename = "OKP")]
    Okp,
}

impl KeyType {
    /// Returns the JWK name of the key type.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Oct => "oct",
            Self::Rsa => "RSA",
            Self::Ec => "EC",
            Self::Okp => "OKP",
        }
    }

    fn from_name(name: &str) -> Result<Self> {
        match name {
            "oct" => Ok(Self::Oct),
            "RSA" => Ok(Self::Rsa),
            "EC" => Ok(Self::Ec),
            "OKP" => Ok(Self::Okp),
            other => Err(Error::key_format(format!("unknown key type {other}"))),
        }
    }

    fn required_params(self) -> &'static [&'static str] {
        match self {
            Self::Oct => &["k"],
            Self::Rsa => &["n", "e"],
            Self::Ec => &["crv", "x", "y"],
            Self::Okp => &["crv", "x"],
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named curves usable in `EC` and `OKP` keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Curve {
    /// NIST P-256
    P256,
    /// NIST P-384
    P384,
    /// NIST P-521
    P521,
    /// Curve25519 for key agreement
    X25519,
    /// Edwards25519 for signatures
    Ed25519,
}

impl Curve {
    /// Returns the JWK `crv` name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::P256 => "P-256",
            Self::P384 => "P-384",
            Self::P521 => "P-521",
            Self::X25519 => "X25519",
            Self::Ed25519 => "Ed25519",
        }
    }

    /// Looks up a curve by its JWK `crv` name.
    ///
    /// # Errors
    ///
    /// * `Error::KeyFormat` - If the curve is not supported
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "P-256" => Ok(Self::P256),
            "P-384" => Ok(Self::P384),
            "P-521" => Ok(Self::P521),
            "X25519" => Ok(Self::X25519),
            "Ed25519" => Ok(Self::Ed25519),
            other => Err(Error::key_format(format!("unsupported curve {other}"))),
        }
    }

    /// Size in bytes of one encoded coordinate or private scalar.
    #[must_use]
    pub fn coordinate_size(self) -> usize {
        match self {
            Self::P256 | Self::X25519 | Self::Ed25519 => 32,
            Self::P384 => 48,
            Self::P521 => 66,
        }
    }

    /// The key type that carries this curve.
    #[must_use]
    pub fn key_type(self) -> KeyType {
        match self {
            Self::P256 | Self::P384 | Self::P521 => KeyType::Ec,
            Self::X25519 | Self::Ed25519 => KeyType::Okp,
        }
    }
}

/// An immutable JSON Web Key.
///
/// # Examples
///
/// ```rust
/// use jose_engine_core::key::{Key, KeyType};
///
/// let key = Key::from_json(r#"{"kty":"oct","k":"GawgguFyGrWKav7AX4VKUg"}"#).unwrap();
/// assert_eq!(key.key_type(), KeyType::Oct);
/// assert_eq!(key.decode("k").unwrap().len(), 16);
/// ```
#[derive(Clone, PartialEq, Deserialize)]
#[serde(try_from = "Map<String, Value>")]
pub struct Key {
    kty: KeyType,
    params: Map<String, Value>,
}

impl Key {
    /// Builds a key from its JWK parameters.
    ///
    /// # Errors
    ///
    /// * `Error::KeyFormat` - If `kty` is absent or unknown, or a parameter
    ///   mandatory for that key type is missing
    pub fn new(params: Map<String, Value>) -> Result<Self> {
        let kty = params
            .get("kty")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::key_format("missing kty"))
            .and_then(KeyType::from_name)?;
        for name in kty.required_params() {
            if !params.get(*name).is_some_and(Value::is_string) {
                return Err(Error::key_format(format!(
                    "{kty} key requires parameter {name}"
                )));
            }
        }
        Ok(Self { kty, params })
    }

    /// Parses a key from a JWK document.
    ///
    /// # Errors
    ///
    /// * `Error::KeyFormat` - If the document is not a JSON object or fails
    ///   [`Key::new`] validation
    pub fn from_json(json: &str) -> Result<Self> {
        let value: Value =
            serde_json::from_str(json).map_err(|e| Error::key_format(e.to_string()))?;
        match value {
            Value::Object(params) => Self::new(params),
            _ => Err(Error::key_format("JWK must be a JSON object")),
        }
    }

    /// Wraps raw secret bytes as an `oct` key.
    #[must_use]
    pub fn from_secret(secret: &[u8]) -> Self {
        let mut params = Map::new();
        params.insert("kty".into(), Value::from("oct"));
        params.insert("k".into(), Value::from(b64_encode(secret)));
        Self {
            kty: KeyType::Oct,
            params,
        }
    }

    /// Wraps a password as an `oct` key for the PBES2 family.
    #[must_use]
    pub fn from_password(password: &str) -> Self {
        Self::from_secret(password.as_bytes())
    }

    /// Generates a random `oct` key of `bits` bits.
    ///
    /// # Errors
    ///
    /// * `Error::Randomness` - If the OS random source fails
    pub fn generate_oct(bits: usize) -> Result<Self> {
        let secret = Zeroizing::new(random_bytes(bits / 8)?);
        Ok(Self::from_secret(&secret))
    }

    /// Generates a private key on a NIST curve or X25519.
    ///
    /// # Errors
    ///
    /// * `Error::KeyFormat` - For `Ed25519`, use [`Key::generate_ed25519`]
    pub fn generate_ec(curve: Curve) -> Result<Self> {
        let (x, y, d) = match curve {
            Curve::P256 => {
                let secret = p256::SecretKey::random(&mut OsRng);
                let point = secret.public_key().to_encoded_point(false);
                encoded_coordinates(point.x(), point.y(), &secret.to_bytes())?
            }
            Curve::P384 => {
                let secret = p384::SecretKey::random(&mut OsRng);
                let point = secret.public_key().to_encoded_point(false);
                encoded_coordinates(point.x(), point.y(), &secret.to_bytes())?
            }
            Curve::P521 => {
                let secret = p521::SecretKey::random(&mut OsRng);
                let point = secret.public_key().to_encoded_point(false);
                encoded_coordinates(point.x(), point.y(), &secret.to_bytes())?
            }
            Curve::X25519 => return Ok(Self::generate_x25519()),
            Curve::Ed25519 => {
                return Err(Error::key_format("Ed25519 is not a key agreement curve"))
            }
        };
        Self::from_curve_parts(curve, &x, Some(y.as_slice()), Some(d.as_slice()))
    }

    /// Generates an X25519 private key.
    #[must_use]
    pub fn generate_x25519() -> Self {
        let secret = x25519_dalek::StaticSecret::random_from_rng(OsRng);
        let public = x25519_dalek::PublicKey::from(&secret);
        okp_key(Curve::X25519, public.as_bytes(), &secret.to_bytes())
    }

    /// Generates an Ed25519 signing key.
    #[must_use]
    pub fn generate_ed25519() -> Self {
        let signing = ed25519_dalek::SigningKey::generate(&mut OsRng);
        okp_key(
            Curve::Ed25519,
            signing.verifying_key().as_bytes(),
            &signing.to_bytes(),
        )
    }

    /// Exports an RSA private key, including its CRT parameters.
    #[must_use]
    pub fn from_rsa(private: &RsaPrivateKey) -> Self {
        let mut params = Map::new();
        params.insert("kty".into(), Value::from("RSA"));
        let mut put = |name: &str, value: &BigUint| {
            params.insert(name.into(), Value::from(b64_encode(value.to_bytes_be())));
        };
        put("n", private.n());
        put("e", private.e());
        put("d", private.d());
        if let [p, q] = private.primes() {
            put("p", p);
            put("q", q);
        }
        if let Some(dp) = private.dp() {
            put("dp", dp);
        }
        if let Some(dq) = private.dq() {
            put("dq", dq);
        }
        if let Some(qi) = private.crt_coefficient() {
            put("qi", &qi);
        }
        Self {
            kty: KeyType::Rsa,
            params,
        }
    }

    /// Builds an `EC` or `OKP` key from raw coordinate bytes.
    pub(crate) fn from_curve_parts(
        curve: Curve,
        x: &[u8],
        y: Option<&[u8]>,
        d: Option<&[u8]>,
    ) -> Result<Self> {
        let mut params = Map::new();
        params.insert("kty".into(), Value::from(curve.key_type().as_str()));
        params.insert("crv".into(), Value::from(curve.name()));
        params.insert("x".into(), Value::from(b64_encode(x)));
        if let Some(y) = y {
            params.insert("y".into(), Value::from(b64_encode(y)));
        }
        if let Some(d) = d {
            params.insert("d".into(), Value::from(b64_encode(d)));
        }
        Self::new(params)
    }

    /// Returns the key type.
    #[must_use]
    pub fn key_type(&self) -> KeyType {
        self.kty
    }

    /// Returns all parameters.
    #[must_use]
    pub fn params(&self) -> &Map<String, Value> {
        &self.params
    }

    /// Returns a parameter value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.params.get(name)
    }

    /// Returns a string parameter.
    #[must_use]
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.params.get(name).and_then(Value::as_str)
    }

    /// Whether the parameter is present.
    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.params.contains_key(name)
    }

    /// Returns the key ID, if any.
    #[must_use]
    pub fn kid(&self) -> Option<&str> {
        self.get_str("kid")
    }

    /// Whether the key carries private material.
    #[must_use]
    pub fn is_private(&self) -> bool {
        match self.kty {
            KeyType::Oct => true,
            _ => self.has("d"),
        }
    }

    /// Decodes a base64url parameter.
    ///
    /// # Errors
    ///
    /// * `Error::KeyFormat` - If the parameter is absent or not base64url
    pub fn decode(&self, name: &str) -> Result<Zeroizing<Vec<u8>>> {
        let encoded = self
            .get_str(name)
            .ok_or_else(|| Error::key_format(format!("missing key parameter {name}")))?;
        b64_decode(name, encoded)
            .map(Zeroizing::new)
            .map_err(|_| Error::key_format(format!("key parameter {name} is not base64url")))
    }

    /// Returns the curve of an `EC` or `OKP` key.
    ///
    /// # Errors
    ///
    /// * `Error::KeyFormat` - If the key has no curve or the curve does not
    ///   belong to its key type
    pub fn curve(&self) -> Result<Curve> {
        let name = self
            .get_str("crv")
            .ok_or_else(|| Error::key_format("missing key parameter crv"))?;
        let curve = Curve::from_name(name)?;
        if curve.key_type() != self.kty {
            return Err(Error::key_format(format!(
                "curve {name} is not valid for {} keys",
                self.kty
            )));
        }
        Ok(curve)
    }

    /// Returns a copy without private parameters.
    ///
    /// # Errors
    ///
    /// * `Error::KeyFormat` - For `oct` keys, which have no public part
    pub fn to_public(&self) -> Result<Self> {
        if self.kty == KeyType::Oct {
            return Err(Error::key_format("symmetric keys have no public part"));
        }
        let mut params = self.params.clone();
        for name in PRIVATE_PARAMS {
            params.remove(name);
        }
        Ok(Self {
            kty: self.kty,
            params,
        })
    }

    /// Computes the RFC 7638 SHA-256 thumbprint, base64url-encoded.
    ///
    /// # Errors
    ///
    /// * `Error::KeyFormat` - If a thumbprint member is missing
    pub fn thumbprint(&self) -> Result<String> {
        let members: &[&str] = match self.kty {
            KeyType::Oct => &["k", "kty"],
            KeyType::Rsa => &["e", "kty", "n"],
            KeyType::Ec => &["crv", "kty", "x", "y"],
            KeyType::Okp => &["crv", "kty", "x"],
        };
        let mut canonical = BTreeMap::new();
        for name in members {
            let value = self
                .get_str(name)
                .ok_or_else(|| Error::key_format(format!("missing key parameter {name}")))?;
            canonical.insert(*name, value);
        }
        let json = serde_json::to_vec(&canonical)?;
        Ok(b64_encode(Sha256::digest(json)))
    }

    /// Converts an RSA key to its public half.
    pub(crate) fn rsa_public(&self) -> Result<RsaPublicKey> {
        let (n, e) = self.rsa_modulus_exponent()?;
        RsaPublicKey::new(n, e).map_err(|e| Error::key_format(e.to_string()))
    }

    /// Converts an RSA key with private parameters.
    pub(crate) fn rsa_private(&self) -> Result<RsaPrivateKey> {
        let (n, e) = self.rsa_modulus_exponent()?;
        let d = self.rsa_component("d")?;
        let primes = if self.has("p") && self.has("q") {
            vec![self.rsa_component("p")?, self.rsa_component("q")?]
        } else {
            Vec::new()
        };
        RsaPrivateKey::from_components(n, e, d, primes)
            .map_err(|e| Error::key_format(e.to_string()))
    }

    /// Returns `(n, e)` as big integers.
    pub(crate) fn rsa_modulus_exponent(&self) -> Result<(BigUint, BigUint)> {
        Ok((self.rsa_component("n")?, self.rsa_component("e")?))
    }

    /// Returns one RSA parameter as a big integer.
    pub(crate) fn rsa_component(&self, name: &str) -> Result<BigUint> {
        if self.kty != KeyType::Rsa {
            return Err(Error::key_format("not an RSA key"));
        }
        Ok(BigUint::from_bytes_be(&self.decode(name)?))
    }
}

impl TryFrom<Map<String, Value>> for Key {
    type Error = Error;

    fn try_from(params: Map<String, Value>) -> Result<Self> {
        Self::new(params)
    }
}

impl Serialize for Key {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.params.serialize(serializer)
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Key")
            .field("kty", &self.kty)
            .field("kid", &self.kid())
            .field("private", &self.is_private())
            .finish_non_exhaustive()
    }
}

impl Drop for Key {
    fn drop(&mut self) {
        for value in self.params.values_mut() {
            if let Value::String(s) = value {
                s.zeroize();
            }
        }
    }
}

fn encoded_coordinates(
    x: Option<&impl AsRef<[u8]>>,
    y: Option<&impl AsRef<[u8]>>,
    d: &[u8],
) -> Result<(Vec<u8>, Vec<u8>, Zeroizing<Vec<u8>>)> {
    match (x, y) {
        (Some(x), Some(y)) => Ok((
            x.as_ref().to_vec(),
            y.as_ref().to_vec(),
            Zeroizing::new(d.to_vec()),
        )),
        _ => Err(Error::Cryptographic),
    }
}

fn okp_key(curve: Curve, x: &[u8], d: &[u8]) -> Key {
    let mut params = Map::new();
    params.insert("kty".into(), Value::from("OKP"));
    params.insert("crv".into(), Value::from(curve.name()));
    params.insert("x".into(), Value::from(b64_encode(x)));
    params.insert("d".into(), Value::from(b64_encode(d)));
    Key {
        kty: KeyType::Okp,
        params,
    }
}

/// An ordered collection of keys, as found in a JWK Set document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeySet {
    keys: Vec<Key>,
}

impl KeySet {
    /// Creates an empty key set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a `{"keys": [...]}` document.
    ///
    /// # Errors
    ///
    /// * `Error::KeyFormat` - If the document or any key in it is invalid
    pub fn from_json(json: &str) -> Result<Self> {
        let value: Value =
            serde_json::from_str(json).map_err(|e| Error::key_format(e.to_string()))?;
        let keys = value
            .get("keys")
            .and_then(Value::as_array)
            .ok_or_else(|| Error::key_format("JWK Set requires a keys array"))?;
        let keys = keys
            .iter()
            .map(|k| match k {
                Value::Object(params) => Key::new(params.clone()),
                _ => Err(Error::key_format("JWK must be a JSON object")),
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { keys })
    }

    /// Appends a key.
    pub fn push(&mut self, key: Key) {
        self.keys.push(key);
    }

    /// Appends a key, builder style.
    #[must_use]
    pub fn with_key(mut self, key: Key) -> Self {
        self.keys.push(key);
        self
    }

    /// Iterates the keys in order.
    pub fn iter(&self) -> std::slice::Iter<'_, Key> {
        self.keys.iter()
    }

    /// Number of keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Finds the first key with the given `kid`.
    #[must_use]
    pub fn get(&self, kid: &str) -> Option<&Key> {
        self.keys.iter().find(|k| k.kid() == Some(kid))
    }
}

impl From<Vec<Key>> for KeySet {
    fn from(keys: Vec<Key>) -> Self {
        Self { keys }
    }
}

impl<'a> IntoIterator for &'a KeySet {
    type Item = &'a Key;
    type IntoIter = std::slice::Iter<'a, Key>;

    fn into_iter(self) -> Self::IntoIter {
        self.keys.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_key_type_validation() {
        assert!(matches!(
            Key::from_json(r#"{"k":"AAAA"}"#),
            Err(Error::KeyFormat(_))
        ));
        assert!(matches!(
            Key::from_json(r#"{"kty":"XYZ"}"#),
            Err(Error::KeyFormat(_))
        ));
        assert!(matches!(
            Key::from_json(r#"{"kty":"RSA","n":"AQAB"}"#),
            Err(Error::KeyFormat(_))
        ));
        assert!(matches!(
            Key::from_json(r#"{"kty":"EC","crv":"P-256","x":"AA"}"#),
            Err(Error::KeyFormat(_))
        ));
        assert!(Key::from_json(r#"{"kty":"OKP","crv":"X25519","x":"AA"}"#).is_ok());
        assert!(Key::from_json("[]").is_err());
    }

    #[test]
    fn test_to_public_is_a_new_value() {
        let key = Key::generate_ec(Curve::P256).unwrap();
        let public = key.to_public().unwrap();

        assert!(key.has("d"));
        assert!(!public.has("d"));
        assert!(!public.is_private());
        assert_eq!(key.get_str("x"), public.get_str("x"));
        assert!(Key::from_secret(b"secret").to_public().is_err());
    }

    #[test]
    fn test_generated_curves() {
        for curve in [Curve::P256, Curve::P384, Curve::P521, Curve::X25519] {
            let key = Key::generate_ec(curve).unwrap();
            assert_eq!(key.curve().unwrap(), curve);
            assert_eq!(key.decode("x").unwrap().len(), curve.coordinate_size());
            assert_eq!(key.decode("d").unwrap().len(), curve.coordinate_size());
        }
        assert!(Key::generate_ec(Curve::Ed25519).is_err());
        assert_eq!(Key::generate_ed25519().curve().unwrap(), Curve::Ed25519);
    }

    #[test]
    fn test_curve_must_match_key_type() {
        let key = Key::from_json(r#"{"kty":"EC","crv":"X25519","x":"AA","y":"AA"}"#).unwrap();
        assert!(matches!(key.curve(), Err(Error::KeyFormat(_))));
        let key = Key::from_json(r#"{"kty":"EC","crv":"secp256k1","x":"AA","y":"AA"}"#).unwrap();
        assert!(matches!(key.curve(), Err(Error::KeyFormat(_))));
    }

    #[test]
    fn test_thumbprint_rfc7638() {
        // RFC 7638, section 3.1
        let key = Key::new(
            json!({
                "kty": "RSA",
                "n": "0vx7agoebGcQSuuPiLJXZptN9nndrQmbXEps2aiAFbWhM78LhWx4cbbfAAtVT86zwu1RK7aPFFxuhDR1L6tSoc_BJECPebWKRXjBZCiFV4n3oknjhMstn64tZ_2W-5JsGY4Hc5n9yBXArwl93lqt7_RN5w6Cf0h4QyQ5v-65YGjQR0_FDW2QvzqY368QQMicAtaSqzs8KJZgnYb9c7d0zgdAZHzu6qMQvRL5hajrn1n91CbOpbISD08qNLyrdkt-bFTWhAI4vMQFh6WeZu0fM4lFd2NcRwr3XPksINHaQ-G_xBniIqbw0Ls1jF44-csFCur-kEgU8awapJzKnqDKgw",
                "e": "AQAB",
                "alg": "RS256",
                "kid": "2011-04-29"
            })
            .as_object()
            .unwrap()
            .clone(),
        )
        .unwrap();
        assert_eq!(
            key.thumbprint().unwrap(),
            "NzbLsXh8uDCcd-6MNwXF4W_7noWXFZAfHkxZsRGC9Xs"
        );
    }

    #[test]
    fn test_rsa_export_roundtrip() {
        let private = RsaPrivateKey::new(&mut OsRng, 1024).unwrap();
        let key = Key::from_rsa(&private);

        for name in ["n", "e", "d", "p", "q", "dp", "dq", "qi"] {
            assert!(key.has(name), "missing {name}");
        }
        assert_eq!(key.rsa_private().unwrap(), private);
        assert_eq!(
            key.to_public().unwrap().rsa_public().unwrap(),
            private.to_public_key()
        );
    }

    #[test]
    fn test_debug_hides_material() {
        let key = Key::from_secret(b"super secret value");
        let debug = format!("{key:?}");
        assert!(!debug.contains(&b64_encode(b"super secret value")));
    }

    #[test]
    fn test_key_set() {
        let json = r#"{"keys":[
            {"kty":"oct","kid":"a","k":"AAAAAAAAAAAAAAAAAAAAAA"},
            {"kty":"OKP","kid":"b","crv":"X25519","x":"hSDwCYkwp1R0i33ctD73Wg2_Og0mOBr066SpjqqbTmo"}
        ]}"#;
        let set = KeySet::from_json(json).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.get("b").unwrap().key_type(), KeyType::Okp);
        assert!(set.get("c").is_none());
        assert!(KeySet::from_json(r#"{"keys":[{"kty":"oct"}]}"#).is_err());
        assert!(KeySet::from_json("{}").is_err());
    }
}

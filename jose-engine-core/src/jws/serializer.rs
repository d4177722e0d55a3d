//! JWS wire formats.
//!
//! The payload member follows the `b64` header: base64url text normally,
//! the raw payload when `b64` is false. It is empty in the compact form and
//! absent in the JSON forms when the payload is detached.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{Jws, Signature};
use crate::error::{Error, Result};
use crate::header::Header;
use crate::jwe::Serialization;
use crate::utils::{b64_decode, b64_encode};

#[derive(Serialize, Deserialize)]
struct SignatureJson {
    #[serde(skip_serializing_if = "Option::is_none")]
    protected: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    header: Option<Header>,
    signature: String,
}

#[derive(Serialize, Deserialize)]
struct JwsJson {
    #[serde(skip_serializing_if = "Option::is_none")]
    payload: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    protected: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    header: Option<Header>,
    #[serde(skip_serializing_if = "Option::is_none")]
    signature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    signatures: Option<Vec<SignatureJson>>,
}

impl Signature {
    fn to_json(&self) -> SignatureJson {
        SignatureJson {
            protected: (!self.encoded_protected.is_empty()).then(|| self.encoded_protected.clone()),
            header: (!self.header.is_empty()).then(|| self.header.clone()),
            signature: b64_encode(&self.signature),
        }
    }

    fn from_parts(protected: Option<&str>, header: Option<Header>, signature: &str) -> Result<Self> {
        let (decoded, encoded) = match protected {
            Some(encoded) => (Header::decode(encoded)?, encoded.to_string()),
            None => (Header::new(), String::new()),
        };
        Ok(Self {
            protected: decoded,
            encoded_protected: encoded,
            header: header.unwrap_or_default(),
            signature: b64_decode("signature", signature)?,
        })
    }
}

/// Decodes a payload member according to `b64`.
fn decode_payload(payload: &str, encoded: bool) -> Result<Vec<u8>> {
    if encoded {
        b64_decode("payload", payload)
    } else {
        Ok(payload.as_bytes().to_vec())
    }
}

impl Jws {
    /// Produces wire text.
    ///
    /// `signature_index` selects the signature for the compact and flattened
    /// forms and is ignored by the general form.
    ///
    /// # Errors
    ///
    /// * `Error::Structural` - If the index is out of range, the compact
    ///   form is asked for a signature with an unprotected header or an
    ///   unencoded payload containing `.`, or an unencoded payload is not
    ///   UTF-8
    /// * `Error::Serialization` - If JSON encoding fails
    pub fn serialize(&self, format: Serialization, signature_index: usize) -> Result<String> {
        match format {
            Serialization::Compact => self.to_compact(signature_index),
            Serialization::JsonFlattened => {
                let signature = self.signature_at(signature_index)?.to_json();
                let json = JwsJson {
                    payload: self.payload_member()?,
                    protected: signature.protected,
                    header: signature.header,
                    signature: Some(signature.signature),
                    signatures: None,
                };
                Ok(serde_json::to_string(&json)?)
            }
            Serialization::JsonGeneral => {
                let json = JwsJson {
                    payload: self.payload_member()?,
                    protected: None,
                    header: None,
                    signature: None,
                    signatures: Some(self.signatures.iter().map(Signature::to_json).collect()),
                };
                Ok(serde_json::to_string(&json)?)
            }
        }
    }

    fn payload_member(&self) -> Result<Option<String>> {
        let Some(payload) = &self.payload else {
            return Ok(None);
        };
        if self.is_payload_encoded() {
            Ok(Some(b64_encode(payload)))
        } else {
            String::from_utf8(payload.clone())
                .map(Some)
                .map_err(|_| Error::structural("unencoded payload must be UTF-8"))
        }
    }

    fn to_compact(&self, signature_index: usize) -> Result<String> {
        let signature = self.signature_at(signature_index)?;
        if !signature.header.is_empty() {
            return Err(Error::structural(
                "compact serialization cannot carry an unprotected header",
            ));
        }
        let payload = self.payload_member()?.unwrap_or_default();
        if !self.is_payload_encoded() && payload.contains('.') {
            return Err(Error::structural(
                "an unencoded payload containing '.' cannot be compact-serialized",
            ));
        }
        Ok(format!(
            "{}.{}.{}",
            signature.encoded_protected,
            payload,
            b64_encode(&signature.signature)
        ))
    }

    /// Parses the compact form. An empty payload part is read as detached.
    ///
    /// # Errors
    ///
    /// * `Error::Structural` - If there are not exactly three parts, a part
    ///   is not strict base64url or the protected header is malformed
    pub fn from_compact(compact: &str) -> Result<Self> {
        let parts: Vec<&str> = compact.split('.').collect();
        let [protected, payload, signature] = parts.as_slice() else {
            return Err(Error::structural(format!(
                "compact JWS has {} parts, expected 3",
                parts.len()
            )));
        };
        if protected.is_empty() {
            return Err(Error::structural("compact JWS requires a protected header"));
        }
        let signature = Signature::from_parts(Some(*protected), None, signature)?;
        let encoded = super::payload_encoding(&signature.protected, &signature.header)?;
        let payload = if payload.is_empty() {
            None
        } else {
            Some(decode_payload(payload, encoded)?)
        };
        Ok(Self {
            payload,
            signatures: vec![signature],
        })
    }

    /// Parses the flattened or general JSON form.
    ///
    /// # Errors
    ///
    /// * `Error::Structural` - If the document is not a JWS object, mixes
    ///   the flattened and general forms, the signatures disagree on `b64`,
    ///   or a member is malformed
    pub fn from_json(json: &str) -> Result<Self> {
        let parsed: JwsJson = serde_json::from_str(json)
            .map_err(|e| Error::structural(format!("invalid JWS JSON: {e}")))?;

        let flattened =
            parsed.protected.is_some() || parsed.header.is_some() || parsed.signature.is_some();
        let signatures = match (parsed.signatures, parsed.signature) {
            (Some(_), _) if flattened => {
                return Err(Error::structural(
                    "JWS JSON mixes flattened and general members",
                ))
            }
            (Some(signatures), _) if signatures.is_empty() => {
                return Err(Error::structural("JWS signatures array is empty"))
            }
            (Some(signatures), _) => signatures
                .into_iter()
                .map(|s| Signature::from_parts(s.protected.as_deref(), s.header, &s.signature))
                .collect::<Result<Vec<_>>>()?,
            (None, Some(signature)) => vec![Signature::from_parts(
                parsed.protected.as_deref(),
                parsed.header,
                &signature,
            )?],
            (None, None) => return Err(Error::structural("JWS has no signature")),
        };

        let mut encoded = None;
        for signature in &signatures {
            let b64 = super::payload_encoding(&signature.protected, &signature.header)?;
            if *encoded.get_or_insert(b64) != b64 {
                return Err(Error::structural("signatures disagree on b64"));
            }
        }
        let payload = parsed
            .payload
            .map(|payload| decode_payload(&payload, encoded.unwrap_or(true)))
            .transpose()?;

        Ok(Self {
            payload,
            signatures,
        })
    }
}

impl FromStr for Jws {
    type Err = Error;

    /// Parses any serialization, detected from the first character.
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.starts_with('{') {
            Self::from_json(trimmed)
        } else {
            Self::from_compact(trimmed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jws::JwsBuilder;
    use crate::key::Key;
    use crate::registry::AlgorithmRegistry;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};

    const RFC7515_A1: &str = "eyJ0eXAiOiJKV1QiLA0KICJhbGciOiJIUzI1NiJ9.\
        eyJpc3MiOiJqb2UiLA0KICJleHAiOjEzMDA4MTkzODAsDQogImh0dHA6Ly9leGFtcGxlLmNvbS9pc19yb290Ijp0cnVlfQ.\
        dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";

    fn unencoded() -> Header {
        Header::new()
            .with("alg", "HS256")
            .with("b64", false)
            .with("crit", json!(["b64"]))
    }

    #[test]
    fn test_compact_roundtrip_is_byte_identical() {
        let jws = Jws::from_compact(RFC7515_A1).unwrap();
        assert_eq!(jws.signatures()[0].protected().get_str("typ"), Some("JWT"));
        assert!(jws.payload().unwrap().starts_with(b"{\"iss\":\"joe\""));
        assert_eq!(jws.serialize(Serialization::Compact, 0).unwrap(), RFC7515_A1);
    }

    #[test]
    fn test_unencoded_payload_with_dot_is_not_compact() {
        let registry = AlgorithmRegistry::with_defaults().unwrap();
        let key = Key::generate_oct(256).unwrap();
        let jws = JwsBuilder::new(&registry)
            .payload(b"$.02".to_vec(), false)
            .add_signature(&key, unencoded(), Header::new())
            .build()
            .unwrap();

        assert!(matches!(
            jws.serialize(Serialization::Compact, 0),
            Err(Error::Structural(_))
        ));
        let flattened = jws.serialize(Serialization::JsonFlattened, 0).unwrap();
        let value: Value = serde_json::from_str(&flattened).unwrap();
        assert_eq!(value["payload"], "$.02");
        assert_eq!(flattened.parse::<Jws>().unwrap(), jws);
    }

    #[test]
    fn test_detached_forms() {
        let registry = AlgorithmRegistry::with_defaults().unwrap();
        let key = Key::generate_oct(256).unwrap();
        let jws = JwsBuilder::new(&registry)
            .payload(b"$.02".to_vec(), true)
            .add_signature(&key, unencoded(), Header::new())
            .build()
            .unwrap();

        let compact = jws.serialize(Serialization::Compact, 0).unwrap();
        assert_eq!(compact.split('.').nth(1), Some(""));
        assert_eq!(Jws::from_compact(&compact).unwrap(), jws);

        let general = jws.serialize(Serialization::JsonGeneral, 0).unwrap();
        let value: Value = serde_json::from_str(&general).unwrap();
        assert!(value.get("payload").is_none());
        assert_eq!(general.parse::<Jws>().unwrap(), jws);
    }

    #[test]
    fn test_general_form_keeps_every_signature() {
        let registry = AlgorithmRegistry::with_defaults().unwrap();
        let first = Key::generate_oct(256).unwrap();
        let second = Key::generate_ed25519();
        let jws = JwsBuilder::new(&registry)
            .payload(b"{\"sub\":\"1\"}".to_vec(), false)
            .add_signature(&first, Header::new().with("alg", "HS256"), Header::new().with("kid", "a"))
            .add_signature(&second, Header::new().with("alg", "EdDSA"), Header::new())
            .build()
            .unwrap();

        let general = jws.serialize(Serialization::JsonGeneral, 0).unwrap();
        let value: Value = serde_json::from_str(&general).unwrap();
        assert_eq!(value["signatures"].as_array().unwrap().len(), 2);
        assert_eq!(value["signatures"][0]["header"]["kid"], "a");
        assert!(value["signatures"][1].get("header").is_none());
        assert_eq!(general.parse::<Jws>().unwrap(), jws);

        assert!(matches!(
            jws.serialize(Serialization::Compact, 0),
            Err(Error::Structural(_))
        ));
        let compact = jws.serialize(Serialization::Compact, 1).unwrap();
        assert_eq!(compact.split('.').count(), 3);
    }

    #[test]
    fn test_parse_rejects_malformed_input() {
        assert!(matches!(Jws::from_compact("a.b"), Err(Error::Structural(_))));
        assert!(matches!(
            Jws::from_compact(".cGF5bG9hZA.c2ln"),
            Err(Error::Structural(_))
        ));
        assert!(matches!(Jws::from_json(r#"{"payload":"eA"}"#), Err(Error::Structural(_))));
        assert!(matches!(
            Jws::from_json(r#"{"signature":"c2ln","signatures":[]}"#),
            Err(Error::Structural(_))
        ));
    }
}

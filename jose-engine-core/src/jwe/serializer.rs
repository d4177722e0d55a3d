//! JWE wire formats.
//!
//! - Compact: `protected.encrypted_key.iv.ciphertext.tag`
//! - JSON flattened: one recipient, its members at the top level
//! - JSON general: a `recipients` array
//!
//! Parsing keeps the protected header text exactly as received, so a parsed
//! token serializes back to the same compact string.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{Jwe, Recipient};
use crate::error::{Error, Result};
use crate::header::Header;
use crate::utils::{b64_decode, b64_encode};

/// Wire format of a JWE or JWS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Serialization {
    /// Dot-separated base64url parts
    Compact,
    /// JSON object with a single recipient or signature
    JsonFlattened,
    /// JSON object with an array of recipients or signatures
    JsonGeneral,
}

#[derive(Serialize, Deserialize)]
struct RecipientJson {
    #[serde(skip_serializing_if = "Option::is_none")]
    header: Option<Header>,
    #[serde(skip_serializing_if = "Option::is_none")]
    encrypted_key: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct JweJson {
    #[serde(skip_serializing_if = "Option::is_none")]
    protected: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    unprotected: Option<Header>,
    #[serde(skip_serializing_if = "Option::is_none")]
    header: Option<Header>,
    #[serde(skip_serializing_if = "Option::is_none")]
    encrypted_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    recipients: Option<Vec<RecipientJson>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    aad: Option<String>,
    iv: String,
    ciphertext: String,
    tag: String,
}

fn non_empty_header(header: &Header) -> Option<Header> {
    (!header.is_empty()).then(|| header.clone())
}

fn non_empty_b64(data: &[u8]) -> Option<String> {
    (!data.is_empty()).then(|| b64_encode(data))
}

impl Recipient {
    fn to_json(&self) -> RecipientJson {
        RecipientJson {
            header: non_empty_header(&self.header),
            encrypted_key: non_empty_b64(&self.encrypted_key),
        }
    }

    fn from_json(json: RecipientJson) -> Result<Self> {
        let encrypted_key = match json.encrypted_key {
            Some(encoded) => b64_decode("encrypted_key", &encoded)?,
            None => Vec::new(),
        };
        Ok(Self::new(json.header.unwrap_or_default(), encrypted_key))
    }
}

impl Jwe {
    /// Produces wire text.
    ///
    /// `recipient_index` selects the recipient for the compact and flattened
    /// forms and is ignored by the general form.
    ///
    /// # Errors
    ///
    /// * `Error::Structural` - If the index is out of range, or the compact
    ///   form is asked for a token with unprotected headers, AAD or no
    ///   protected header
    /// * `Error::Serialization` - If JSON encoding fails
    pub fn serialize(&self, format: Serialization, recipient_index: usize) -> Result<String> {
        match format {
            Serialization::Compact => self.to_compact(recipient_index),
            Serialization::JsonFlattened => {
                let recipient = self.recipient(recipient_index)?.to_json();
                let mut json = self.json_base();
                json.header = recipient.header;
                json.encrypted_key = recipient.encrypted_key;
                Ok(serde_json::to_string(&json)?)
            }
            Serialization::JsonGeneral => {
                let mut json = self.json_base();
                json.recipients = Some(self.recipients.iter().map(Recipient::to_json).collect());
                Ok(serde_json::to_string(&json)?)
            }
        }
    }

    fn to_compact(&self, recipient_index: usize) -> Result<String> {
        let recipient = self.recipient(recipient_index)?;
        if !recipient.header.is_empty() || !self.shared_header.is_empty() {
            return Err(Error::structural(
                "compact serialization cannot carry unprotected headers",
            ));
        }
        if self.aad.is_some() {
            return Err(Error::structural("compact serialization cannot carry AAD"));
        }
        if self.encoded_protected_header.is_empty() {
            return Err(Error::structural(
                "compact serialization requires a protected header",
            ));
        }
        Ok(format!(
            "{}.{}.{}.{}.{}",
            self.encoded_protected_header,
            b64_encode(&recipient.encrypted_key),
            b64_encode(&self.iv),
            b64_encode(&self.ciphertext),
            b64_encode(&self.tag)
        ))
    }

    fn json_base(&self) -> JweJson {
        JweJson {
            protected: (!self.encoded_protected_header.is_empty())
                .then(|| self.encoded_protected_header.clone()),
            unprotected: non_empty_header(&self.shared_header),
            header: None,
            encrypted_key: None,
            recipients: None,
            aad: self.aad.as_deref().map(b64_encode),
            iv: b64_encode(&self.iv),
            ciphertext: b64_encode(&self.ciphertext),
            tag: b64_encode(&self.tag),
        }
    }

    /// Parses the compact form.
    ///
    /// # Errors
    ///
    /// * `Error::Structural` - If there are not exactly five parts, a part
    ///   is not strict base64url or the protected header is not a JSON object
    pub fn from_compact(compact: &str) -> Result<Self> {
        let parts: Vec<&str> = compact.split('.').collect();
        let [protected, encrypted_key, iv, ciphertext, tag] = parts.as_slice() else {
            return Err(Error::structural(format!(
                "compact JWE has {} parts, expected 5",
                parts.len()
            )));
        };
        Ok(Self {
            shared_protected_header: Header::decode(protected)?,
            encoded_protected_header: (*protected).to_string(),
            shared_header: Header::new(),
            recipients: vec![Recipient::new(
                Header::new(),
                b64_decode("encrypted_key", encrypted_key)?,
            )],
            aad: None,
            iv: b64_decode("iv", iv)?,
            ciphertext: b64_decode("ciphertext", ciphertext)?,
            tag: b64_decode("tag", tag)?,
        })
    }

    /// Parses the flattened or general JSON form.
    ///
    /// # Errors
    ///
    /// * `Error::Structural` - If the document is not a JWE object, mixes
    ///   the flattened and general forms, or a member is malformed
    pub fn from_json(json: &str) -> Result<Self> {
        let parsed: JweJson = serde_json::from_str(json)
            .map_err(|e| Error::structural(format!("invalid JWE JSON: {e}")))?;

        let flattened = parsed.header.is_some() || parsed.encrypted_key.is_some();
        let recipients = match parsed.recipients {
            Some(_) if flattened => {
                return Err(Error::structural(
                    "JWE JSON mixes flattened and general members",
                ))
            }
            Some(recipients) if recipients.is_empty() => {
                return Err(Error::structural("JWE recipients array is empty"))
            }
            Some(recipients) => recipients
                .into_iter()
                .map(Recipient::from_json)
                .collect::<Result<Vec<_>>>()?,
            None => vec![Recipient::from_json(RecipientJson {
                header: parsed.header,
                encrypted_key: parsed.encrypted_key,
            })?],
        };

        let (shared_protected_header, encoded_protected_header) = match parsed.protected {
            Some(encoded) => (Header::decode(&encoded)?, encoded),
            None => (Header::new(), String::new()),
        };
        let aad = parsed
            .aad
            .map(|encoded| b64_decode("aad", &encoded))
            .transpose()?;

        Ok(Self {
            ciphertext: b64_decode("ciphertext", &parsed.ciphertext)?,
            iv: b64_decode("iv", &parsed.iv)?,
            tag: b64_decode("tag", &parsed.tag)?,
            aad,
            shared_protected_header,
            encoded_protected_header,
            shared_header: parsed.unprotected.unwrap_or_default(),
            recipients,
        })
    }
}

impl FromStr for Jwe {
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
    use crate::jwe::JweBuilder;
    use crate::key::Key;
    use crate::registry::AlgorithmRegistry;
    use pretty_assertions::assert_eq;
    use serde_json::Value;

    const RFC7516_A3: &str = "eyJhbGciOiJBMTI4S1ciLCJlbmMiOiJBMTI4Q0JDLUhTMjU2In0.\
        6KB707dM9YTIgHtLvtgWQ8mKwboJW3of9locizkDTHzBC2IlrT1oOQ.\
        AxY8DCtDaGlsbGljb3RoZQ.\
        KDlTtXchhZTGufMYmOYGS4HffxPSUrfmqCHXaI9wOGY.\
        U0m_YmjN04DJvceFICbCVQ";

    #[test]
    fn test_compact_roundtrip_is_byte_identical() {
        let jwe = Jwe::from_compact(RFC7516_A3).unwrap();
        assert_eq!(jwe.shared_protected_header().get_str("alg"), Some("A128KW"));
        assert_eq!(jwe.recipients().len(), 1);
        assert_eq!(jwe.recipients()[0].encrypted_key().len(), 40);
        assert_eq!(jwe.serialize(Serialization::Compact, 0).unwrap(), RFC7516_A3);
    }

    #[test]
    fn test_compact_rejects_malformed_input() {
        assert!(matches!(Jwe::from_compact("a.b.c"), Err(Error::Structural(_))));
        let padded = RFC7516_A3.replace("U0m_YmjN04DJvceFICbCVQ", "U0m_YmjN04DJvceFICbCVQ==");
        assert!(matches!(Jwe::from_compact(&padded), Err(Error::Structural(_))));
        let bad_header = RFC7516_A3.replacen("eyJ", "W10", 1);
        assert!(matches!(Jwe::from_compact(&bad_header), Err(Error::Structural(_))));
    }

    #[test]
    fn test_general_and_flattened_forms() {
        let registry = AlgorithmRegistry::with_defaults().unwrap();
        let first = Key::generate_oct(128).unwrap();
        let second = Key::generate_oct(256).unwrap();
        let jwe = JweBuilder::new(&registry)
            .payload(b"two recipients".to_vec())
            .shared_protected_header(Header::new().with("enc", "A128CBC-HS256"))
            .shared_header(Header::new().with("jku", "https://server.example.com/keys.jwks"))
            .aad(b"extra".to_vec())
            .add_recipient(&first, Header::new().with("alg", "A128KW").with("kid", "1"))
            .add_recipient(&second, Header::new().with("alg", "A256KW").with("kid", "2"))
            .build()
            .unwrap();

        let general = jwe.serialize(Serialization::JsonGeneral, 0).unwrap();
        let value: Value = serde_json::from_str(&general).unwrap();
        assert_eq!(value["recipients"].as_array().unwrap().len(), 2);
        assert_eq!(value["recipients"][1]["header"]["kid"], "2");
        assert_eq!(value["unprotected"]["jku"], "https://server.example.com/keys.jwks");
        assert_eq!(value["aad"], "ZXh0cmE");
        assert_eq!(general.parse::<Jwe>().unwrap(), jwe);

        let flattened = jwe.serialize(Serialization::JsonFlattened, 1).unwrap();
        let value: Value = serde_json::from_str(&flattened).unwrap();
        assert!(value.get("recipients").is_none());
        assert_eq!(value["header"]["alg"], "A256KW");
        let parsed: Jwe = flattened.parse().unwrap();
        assert_eq!(parsed.recipients().len(), 1);
        assert_eq!(parsed.recipients()[0], jwe.recipients()[1]);

        assert!(matches!(
            jwe.serialize(Serialization::Compact, 0),
            Err(Error::Structural(_))
        ));
        assert!(matches!(
            jwe.serialize(Serialization::JsonFlattened, 2),
            Err(Error::Structural(_))
        ));
    }

    #[test]
    fn test_direct_omits_encrypted_key() {
        let registry = AlgorithmRegistry::with_defaults().unwrap();
        let key = Key::generate_oct(128).unwrap();
        let jwe = JweBuilder::new(&registry)
            .payload(b"direct".to_vec())
            .shared_protected_header(Header::new().with("alg", "dir").with("enc", "A128GCM"))
            .add_recipient(&key, Header::new())
            .build()
            .unwrap();

        let flattened = jwe.serialize(Serialization::JsonFlattened, 0).unwrap();
        let value: Value = serde_json::from_str(&flattened).unwrap();
        assert!(value.get("encrypted_key").is_none());
        assert!(value.get("header").is_none());

        let compact = jwe.serialize(Serialization::Compact, 0).unwrap();
        assert_eq!(compact.split('.').nth(1), Some(""));
    }

    #[test]
    fn test_json_rejects_mixed_forms() {
        let mixed = r#"{"protected":"eyJlbmMiOiJBMTI4R0NNIn0","encrypted_key":"AAAA",
            "recipients":[{}],"iv":"AAAA","ciphertext":"AAAA","tag":"AAAA"}"#;
        assert!(matches!(Jwe::from_json(mixed), Err(Error::Structural(_))));
        assert!(matches!(Jwe::from_json("[]"), Err(Error::Structural(_))));
        assert!(matches!(
            Jwe::from_json(r#"{"iv":"AAAA","ciphertext":"AAAA"}"#),
            Err(Error::Structural(_))
        ));
    }
}

//! Shared fixtures and end-to-end tests.

use std::sync::OnceLock;

use pretty_assertions::assert_eq;
use rand_core::OsRng;
use rsa::RsaPrivateKey;
use serde_json::json;

use crate::config::EngineConfig;
use crate::error::Error;
use crate::header::Header;
use crate::jwe::{Jwe, JweBuilder, JweDecrypter, Serialization};
use crate::jws::{Jws, JwsBuilder, JwsVerifier};
use crate::key::{Curve, Key, KeySet};
use crate::registry::AlgorithmRegistry;

/// A 2048-bit RSA key, generated once per test run.
pub(crate) fn rsa_key() -> &'static Key {
    static KEY: OnceLock<Key> = OnceLock::new();
    KEY.get_or_init(|| {
        let private = RsaPrivateKey::new(&mut OsRng, 2048).unwrap();
        Key::from_rsa(&private)
    })
}

/// Routes `tracing` output to the test harness. Set `RUST_LOG` to see it.
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

const RFC7515_HS256_KEY: &str = r#"{"kty":"oct","k":"AyM1SysPpbyDfgZld3umj1qzKObwVMkoqQ-EstJQLr_T-1qS0gZH75aKtMN3Yj0iPS4hcgUuTwjAzZr1Z9CAow"}"#;

#[test]
fn test_rfc7516_a3_decrypts() {
    init_tracing();
    let token = "eyJhbGciOiJBMTI4S1ciLCJlbmMiOiJBMTI4Q0JDLUhTMjU2In0.\
        6KB707dM9YTIgHtLvtgWQ8mKwboJW3of9locizkDTHzBC2IlrT1oOQ.\
        AxY8DCtDaGlsbGljb3RoZQ.\
        KDlTtXchhZTGufMYmOYGS4HffxPSUrfmqCHXaI9wOGY.\
        U0m_YmjN04DJvceFICbCVQ";
    let key = Key::from_json(r#"{"kty":"oct","k":"GawgguFyGrWKav7AX4VKUg"}"#).unwrap();
    let registry = AlgorithmRegistry::with_defaults().unwrap();

    let jwe: Jwe = token.parse().unwrap();
    let decrypted = JweDecrypter::new(&registry)
        .decrypt_with_key(&jwe, &key)
        .unwrap();
    assert_eq!(decrypted.payload, b"Live long and prosper.".to_vec());

    let other = Key::from_json(r#"{"kty":"oct","k":"AAAAAAAAAAAAAAAAAAAAAA"}"#).unwrap();
    assert!(matches!(
        JweDecrypter::new(&registry).decrypt_with_key(&jwe, &other),
        Err(Error::Cryptographic)
    ));
}

#[test]
fn test_rfc7515_a1_verifies() {
    let token = "eyJ0eXAiOiJKV1QiLA0KICJhbGciOiJIUzI1NiJ9.\
        eyJpc3MiOiJqb2UiLA0KICJleHAiOjEzMDA4MTkzODAsDQogImh0dHA6Ly9leGFtcGxlLmNvbS9pc19yb290Ijp0cnVlfQ.\
        dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
    let key = Key::from_json(RFC7515_HS256_KEY).unwrap();
    let registry = AlgorithmRegistry::with_defaults().unwrap();

    let jws: Jws = token.parse().unwrap();
    assert!(JwsVerifier::new(&registry)
        .verify_with_key(&jws, &key, 0, None)
        .is_ok());
}

#[test]
fn test_rfc7797_unencoded_detached_payload() {
    let key = Key::from_json(RFC7515_HS256_KEY).unwrap();
    let registry = AlgorithmRegistry::with_defaults().unwrap();
    let token = "eyJhbGciOiJIUzI1NiIsImI2NCI6ZmFsc2UsImNyaXQiOlsiYjY0Il19..\
        A5dxf2s96_n5FLueVuW1Z_vh161FwXZC4YLPff6dmDY";

    let jws: Jws = token.parse().unwrap();
    assert_eq!(jws.payload(), None);
    let verifier = JwsVerifier::new(&registry);
    assert!(verifier.verify_with_key(&jws, &key, 0, Some(b"$.02")).is_ok());

    let rebuilt = JwsBuilder::new(&registry)
        .payload(b"$.02".to_vec(), true)
        .add_signature(
            &key,
            Header::new()
                .with("alg", "HS256")
                .with("b64", false)
                .with("crit", json!(["b64"])),
            Header::new(),
        )
        .build()
        .unwrap();
    assert_eq!(rebuilt.serialize(Serialization::Compact, 0).unwrap(), token);
}

#[test]
fn test_multi_recipient_mixed_algorithms() {
    init_tracing();
    let registry = AlgorithmRegistry::with_defaults().unwrap();
    let rsa_public = rsa_key().to_public().unwrap();
    let agreement = Key::generate_ec(Curve::P256).unwrap();
    let agreement_public = agreement.to_public().unwrap();
    let password = Key::from_password("Thus from my lips, by yours, my sin is purged.");
    let gcm = Key::generate_oct(128).unwrap();

    let jwe = JweBuilder::new(&registry)
        .payload(b"one payload, four recipients".to_vec())
        .shared_protected_header(Header::new().with("enc", "A256GCM"))
        .shared_header(Header::new().with("cty", "text/plain"))
        .aad(b"authenticated".to_vec())
        .add_recipient(&rsa_public, Header::new().with("alg", "RSA-OAEP-256"))
        .add_recipient(&agreement_public, Header::new().with("alg", "ECDH-ES+A128KW"))
        .add_recipient(&password, Header::new().with("alg", "PBES2-HS256+A128KW"))
        .add_recipient(&gcm, Header::new().with("alg", "A128GCMKW"))
        .build()
        .unwrap();

    // Per-recipient parameters stay with their recipient.
    assert!(jwe.recipients()[1].header().contains("epk"));
    assert!(jwe.recipients()[2].header().contains("p2s"));
    assert!(jwe.recipients()[3].header().contains("tag"));
    assert!(!jwe.shared_protected_header().contains("epk"));

    let token = jwe.serialize(Serialization::JsonGeneral, 0).unwrap();
    let parsed: Jwe = token.parse().unwrap();
    let decrypter = JweDecrypter::new(&registry);
    for (index, key) in [rsa_key(), &agreement, &password, &gcm].into_iter().enumerate() {
        let decrypted = decrypter.decrypt_with_key(&parsed, key).unwrap();
        assert_eq!(decrypted.payload, b"one payload, four recipients".to_vec());
        assert_eq!(decrypted.recipient_index, index);
    }

    let keys = KeySet::new()
        .with_key(Key::generate_oct(128).unwrap())
        .with_key(gcm.clone());
    let decrypted = decrypter.decrypt_with_key_set(&parsed, &keys).unwrap();
    assert_eq!((decrypted.recipient_index, decrypted.key_index), (3, 1));

    // The flattened form of a single recipient still decrypts for it.
    let flattened = jwe.serialize(Serialization::JsonFlattened, 2).unwrap();
    let single: Jwe = flattened.parse().unwrap();
    assert_eq!(single.recipients().len(), 1);
    assert!(decrypter.decrypt_with_key(&single, &password).is_ok());
    assert!(decrypter.decrypt_with_key(&single, &gcm).is_err());
}

#[test]
fn test_general_roundtrip_for_one_to_five_recipients() {
    let registry = AlgorithmRegistry::with_defaults().unwrap();
    let aes = Key::generate_oct(128).unwrap();
    let rsa_public = rsa_key().to_public().unwrap();
    let ec = Key::generate_ec(Curve::P384).unwrap();
    let ec_public = ec.to_public().unwrap();
    let password = Key::from_password("correct horse battery staple");
    let x25519 = Key::generate_x25519();
    let x25519_public = x25519.to_public().unwrap();
    let sender = Key::generate_x25519();

    // (alg, encryption key, decryption key)
    let recipients: [(&str, &Key, &Key); 5] = [
        ("A128KW", &aes, &aes),
        ("RSA-OAEP", &rsa_public, rsa_key()),
        ("ECDH-ES+A192KW", &ec_public, &ec),
        ("PBES2-HS384+A192KW", &password, &password),
        ("ECDH-SS+A256KW", &x25519_public, &x25519),
    ];

    for count in 1..=recipients.len() {
        let mut builder = JweBuilder::new(&registry)
            .payload(b"general round trip".to_vec())
            .shared_protected_header(Header::new().with("enc", "A192GCM"));
        for &(alg, encryption_key, _) in &recipients[..count] {
            let header = Header::new().with("alg", alg);
            builder = if alg.starts_with("ECDH-SS") {
                builder.add_recipient_with_sender(encryption_key, header, &sender)
            } else {
                builder.add_recipient(encryption_key, header)
            };
        }
        let token = builder
            .build()
            .unwrap()
            .serialize(Serialization::JsonGeneral, 0)
            .unwrap();

        let parsed: Jwe = token.parse().unwrap();
        assert_eq!(parsed.recipients().len(), count);
        assert_eq!(parsed.serialize(Serialization::JsonGeneral, 0).unwrap(), token);

        let decrypter = JweDecrypter::new(&registry);
        for (index, &(_, _, decryption_key)) in recipients[..count].iter().enumerate() {
            let decrypted = decrypter.decrypt_with_key(&parsed, decryption_key).unwrap();
            assert_eq!(decrypted.payload, b"general round trip".to_vec());
            assert_eq!(decrypted.recipient_index, index, "{count} recipients");
        }
    }
}

#[test]
fn test_ecdh_es_direct_agreement() {
    let registry = AlgorithmRegistry::with_defaults().unwrap();
    let recipient = Key::generate_x25519();
    let public = recipient.to_public().unwrap();

    let jwe = JweBuilder::new(&registry)
        .payload(b"agreed".to_vec())
        .shared_protected_header(
            Header::new()
                .with("alg", "ECDH-ES")
                .with("enc", "A128CBC-HS256")
                .with("apu", "QWxpY2U")
                .with("apv", "Qm9i"),
        )
        .add_recipient(&public, Header::new())
        .build()
        .unwrap();

    assert!(jwe.recipients()[0].encrypted_key().is_empty());
    assert_eq!(
        jwe.shared_protected_header().get("epk").and_then(|epk| epk.get("crv")),
        Some(&json!("X25519"))
    );

    let token = jwe.serialize(Serialization::Compact, 0).unwrap();
    assert_eq!(token.split('.').nth(1), Some(""));
    let parsed: Jwe = token.parse().unwrap();
    let decrypter = JweDecrypter::new(&registry);
    assert_eq!(
        decrypter.decrypt_with_key(&parsed, &recipient).unwrap().payload,
        b"agreed".to_vec()
    );
    assert!(matches!(
        decrypter.decrypt_with_key(&parsed, &public),
        Err(Error::Cryptographic)
    ));
    assert!(matches!(
        decrypter.decrypt_with_key(&parsed, &Key::generate_x25519()),
        Err(Error::Cryptographic)
    ));
}

#[test]
fn test_rsa1_5_can_be_disabled() {
    let config = EngineConfig {
        allow_rsa1_5: false,
        ..EngineConfig::default()
    };
    let restricted = AlgorithmRegistry::from_config(&config).unwrap();
    let permissive = AlgorithmRegistry::with_defaults().unwrap();
    let public = rsa_key().to_public().unwrap();
    let header = Header::new().with("alg", "RSA1_5").with("enc", "A128GCM");

    let refused = JweBuilder::new(&restricted)
        .payload(b"legacy".to_vec())
        .shared_protected_header(header.clone())
        .add_recipient(&public, Header::new())
        .build();
    assert!(matches!(refused, Err(Error::UnsupportedAlgorithm(_))));

    let jwe = JweBuilder::new(&permissive)
        .payload(b"legacy".to_vec())
        .shared_protected_header(header)
        .add_recipient(&public, Header::new())
        .build()
        .unwrap();
    assert!(matches!(
        JweDecrypter::new(&restricted).decrypt_with_key(&jwe, rsa_key()),
        Err(Error::UnsupportedAlgorithm(_))
    ));
    assert_eq!(
        JweDecrypter::new(&permissive)
            .decrypt_with_key(&jwe, rsa_key())
            .unwrap()
            .payload,
        b"legacy".to_vec()
    );
}

#[test]
fn test_software_curve_backend_interoperates() {
    let software = AlgorithmRegistry::from_config(&EngineConfig {
        curve_backend: crate::config::CurveBackend::Software,
        ..EngineConfig::default()
    })
    .unwrap();
    let native = AlgorithmRegistry::with_defaults().unwrap();
    let recipient = Key::generate_ec(Curve::P384).unwrap();
    let public = recipient.to_public().unwrap();

    let jwe = JweBuilder::new(&software)
        .payload(b"either backend".to_vec())
        .shared_protected_header(Header::new().with("alg", "ECDH-ES+A256KW").with("enc", "A256GCM"))
        .add_recipient(&public, Header::new())
        .build()
        .unwrap();
    assert_eq!(
        JweDecrypter::new(&native)
            .decrypt_with_key(&jwe, &recipient)
            .unwrap()
            .payload,
        b"either backend".to_vec()
    );
}

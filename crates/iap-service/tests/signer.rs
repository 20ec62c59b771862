//! Outbound tokens built from merchant configuration and a key file on disk.

use std::path::PathBuf;

use iap::jws;
use iap::{IapError, MerchantConfig, ProviderProfile, RequestContext};
use p256::ecdsa::signature::Verifier;
use p256::ecdsa::Signature;

fn write_key(name: &str) -> PathBuf {
    let key = rcgen::KeyPair::generate().unwrap();
    let path = std::env::temp_dir().join(format!("iap-{}-{name}.p8", std::process::id()));
    std::fs::write(&path, key.serialize_pem()).unwrap();
    path
}

fn merchant(path: PathBuf) -> MerchantConfig {
    MerchantConfig {
        kid: "2X9R4HXF34".to_string(),
        issuer_id: "57246542-96fe-1a63-e053-0824d011072a".to_string(),
        app_id: "com.example.app".to_string(),
        private_key_path: Some(path),
        ..MerchantConfig::default()
    }
}

#[test]
fn test_apple_token_from_key_file() {
    let path = write_key("apple");
    let signer = ProviderProfile::apple().signer(&merchant(path.clone())).unwrap();
    let token = signer
        .sign(&RequestContext::new("GET", "/inApps/v1/history/1", Vec::new()))
        .unwrap();
    std::fs::remove_file(path).ok();

    let decoded = jws::decode(&token).unwrap();
    assert_eq!(decoded.header["alg"], "ES256");
    assert_eq!(decoded.header["kid"], "2X9R4HXF34");
    assert_eq!(decoded.header["typ"], "JWT");
    assert_eq!(decoded.payload["aud"], "appstoreconnect-v1");
    assert_eq!(decoded.payload["bid"], "com.example.app");
    assert!(decoded.payload.get("x5c").is_none());

    let signature = Signature::from_slice(&decoded.signature).unwrap();
    signer
        .verifying_key()
        .verify(decoded.signing_input().as_bytes(), &signature)
        .unwrap();
}

#[test]
fn test_huawei_digest_follows_request_body() {
    let path = write_key("huawei");
    let signer = ProviderProfile::huawei().signer(&merchant(path.clone())).unwrap();
    std::fs::remove_file(path).ok();

    let first = signer
        .sign(&RequestContext::new("POST", "/order/v2/confirm", b"{\"a\":1}".to_vec()))
        .unwrap();
    let second = signer
        .sign(&RequestContext::new("POST", "/order/v2/confirm", b"{\"a\":2}".to_vec()))
        .unwrap();

    let first = jws::decode(&first).unwrap().payload;
    let second = jws::decode(&second).unwrap().payload;
    assert_eq!(first["aud"], "iap-v1");
    assert_eq!(first["aid"], "com.example.app");
    assert_ne!(first["digest"], second["digest"]);
    assert_eq!(first["digest"].as_str().unwrap().len(), 64);
}

#[test]
fn test_missing_key_file_fails_before_signing() {
    let config = merchant(PathBuf::from("/nonexistent/iap/AuthKey.p8"));
    let err = ProviderProfile::apple().signer(&config).unwrap_err();
    assert!(matches!(err, IapError::SignerConfig(_)));
}

#[test]
fn test_garbage_key_file_is_config_error() {
    let path = std::env::temp_dir().join(format!("iap-{}-garbage.p8", std::process::id()));
    std::fs::write(&path, "not a key").unwrap();
    let err = ProviderProfile::apple().signer(&merchant(path.clone())).unwrap_err();
    std::fs::remove_file(path).ok();
    assert!(matches!(err, IapError::SignerConfig(_)));
}

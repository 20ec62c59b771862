//! Runtime-generated certificate chains and signed tokens for tests.
//!
//! Enabled with the `test-fixtures` feature. Every helper panics on failure.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use p256::ecdsa::signature::Signer;
use p256::ecdsa::{Signature, SigningKey};
use p256::pkcs8::DecodePrivateKey;
use rcgen::{
    BasicConstraints, Certificate, CertificateParams, CustomExtension, DnType, IsCa, Issuer,
    KeyPair,
};
use serde_json::{json, Value};

use crate::constants::{ALGORITHM_ES256, APPLE_LEAF_CERT_OID, HEADER_ALG, HEADER_X5C};
use crate::jws::{self, JsonMap};

/// How a [`TestChain`] is built.
#[derive(Debug, Clone)]
pub struct ChainOptions {
    /// Marker extension added to the leaf; `None` leaves it out.
    pub leaf_oid: Option<String>,
    /// Sign the leaf with a key other than the presented intermediate's.
    pub leaf_from_foreign_intermediate: bool,
    /// Sign the intermediate with a key other than the presented root's.
    pub intermediate_from_foreign_root: bool,
}

impl Default for ChainOptions {
    fn default() -> Self {
        Self {
            leaf_oid: Some(APPLE_LEAF_CERT_OID.to_string()),
            leaf_from_foreign_intermediate: false,
            intermediate_from_foreign_root: false,
        }
    }
}

/// Leaf, intermediate and root DER plus the leaf signing key.
pub struct TestChain {
    pub leaf: Vec<u8>,
    pub intermediate: Vec<u8>,
    pub root: Vec<u8>,
    leaf_key: SigningKey,
}

impl TestChain {
    pub fn generate() -> Self {
        Self::with_options(ChainOptions::default())
    }

    pub fn with_options(options: ChainOptions) -> Self {
        let (root, root_issuer) = ca("IAP Test Root", None);
        let (intermediate, intermediate_issuer) = if options.intermediate_from_foreign_root {
            let (_, foreign) = ca("IAP Foreign Root", None);
            ca("IAP Test Intermediate", Some(&foreign))
        } else {
            ca("IAP Test Intermediate", Some(&root_issuer))
        };

        let leaf_key = KeyPair::generate().expect("generate leaf key");
        let mut params = params("IAP Test Leaf");
        if let Some(oid) = &options.leaf_oid {
            params
                .custom_extensions
                .push(CustomExtension::from_oid_content(&oid_arcs(oid), vec![0x05, 0x00]));
        }
        let leaf = if options.leaf_from_foreign_intermediate {
            let (_, foreign) = ca("IAP Foreign Intermediate", Some(&root_issuer));
            params.signed_by(&leaf_key, &foreign)
        } else {
            params.signed_by(&leaf_key, &intermediate_issuer)
        }
        .expect("sign leaf certificate");

        let signing_key =
            SigningKey::from_pkcs8_der(&leaf_key.serialize_der()).expect("leaf key is P-256");

        Self {
            leaf: leaf.der().to_vec(),
            intermediate: intermediate.der().to_vec(),
            root: root.der().to_vec(),
            leaf_key: signing_key,
        }
    }

    /// The chain as an `x5c` header value.
    pub fn x5c(&self) -> Vec<String> {
        [&self.leaf, &self.intermediate, &self.root]
            .iter()
            .map(|der| STANDARD.encode(der))
            .collect()
    }

    pub fn root_base64(&self) -> String {
        STANDARD.encode(&self.root)
    }

    /// Default ES256 header carrying this chain.
    pub fn header(&self) -> JsonMap {
        let mut header = JsonMap::new();
        header.insert(HEADER_ALG.into(), Value::from(ALGORITHM_ES256));
        header.insert(HEADER_X5C.into(), json!(self.x5c()));
        header
    }

    /// Sign `payload` with the leaf key, raw `r || s` signature.
    pub fn sign(&self, payload: &Value) -> String {
        self.sign_with_header(self.header(), payload)
    }

    pub fn sign_with_header(&self, header: JsonMap, payload: &Value) -> String {
        let input = jws::signing_input(&header, &as_map(payload)).expect("serialize token");
        let signature: Signature = self.leaf_key.sign(input.as_bytes());
        format!("{input}.{}", jws::encode_segment(&signature.to_bytes()))
    }

    /// Sign `payload` with a DER-encoded signature instead of `r || s`.
    pub fn sign_der(&self, payload: &Value) -> String {
        let input = jws::signing_input(&self.header(), &as_map(payload)).expect("serialize token");
        let signature: Signature = self.leaf_key.sign(input.as_bytes());
        format!("{input}.{}", jws::encode_segment(signature.to_der().as_bytes()))
    }
}

/// Base64 DER of a self-signed root unrelated to any [`TestChain`].
pub fn unrelated_root_base64() -> String {
    let (cert, _) = ca("IAP Unrelated Root", None);
    STANDARD.encode(cert.der())
}

fn params(common_name: &str) -> CertificateParams {
    let mut params = CertificateParams::default();
    params
        .distinguished_name
        .push(DnType::CommonName, common_name);
    params
}

fn ca(common_name: &str, issuer: Option<&Issuer<'static, KeyPair>>) -> (Certificate, Issuer<'static, KeyPair>) {
    let key = KeyPair::generate().expect("generate CA key");
    let mut params = params(common_name);
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    let cert = match issuer {
        Some(issuer) => params.signed_by(&key, issuer),
        None => params.self_signed(&key),
    }
    .expect("sign CA certificate");
    (cert, Issuer::new(params, key))
}

fn oid_arcs(oid: &str) -> Vec<u64> {
    oid.split('.')
        .map(|arc| arc.parse().expect("numeric OID arc"))
        .collect()
}

fn as_map(value: &Value) -> JsonMap {
    value.as_object().cloned().expect("payload must be a JSON object")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_x5c_is_leaf_intermediate_root() {
        let chain = TestChain::generate();
        let x5c = chain.x5c();
        assert_eq!(x5c.len(), 3);
        assert_eq!(STANDARD.decode(&x5c[0]).unwrap(), chain.leaf);
        assert_eq!(STANDARD.decode(&x5c[2]).unwrap(), chain.root);
    }

    #[test]
    fn test_signed_token_decodes() {
        let chain = TestChain::generate();
        let token = chain.sign(&json!({"k": "v"}));
        let decoded = jws::decode(&token).unwrap();
        assert_eq!(decoded.payload["k"], "v");
        assert_eq!(decoded.signature.len(), 64);
    }

    #[test]
    fn test_oid_arcs() {
        assert_eq!(oid_arcs("1.2.840.113635.100.6.11.1"), vec![1, 2, 840, 113635, 100, 6, 11, 1]);
    }
}

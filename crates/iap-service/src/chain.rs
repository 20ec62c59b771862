//! X.509 trust-chain verification for `x5c`-signed compact tokens.
//!
//! A token is accepted only when, in this order:
//! 1. its `alg` header equals the configured algorithm,
//! 2. the leaf certificate is signed by the intermediate, the intermediate by the
//!    root, and the root by the externally trusted root when one is configured,
//! 3. the leaf carries the configured marker extension,
//! 4. the ES256 signature over the received `header.payload` text verifies against
//!    the leaf public key.
//!
//! Revocation (CRL/OCSP) is not checked; this path performs no network I/O.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use p256::ecdsa::signature::Verifier;
use p256::ecdsa::{DerSignature, Signature, VerifyingKey};
use p256::pkcs8::DecodePublicKey;
use x509_parser::certificate::X509Certificate;
use x509_parser::parse_x509_certificate;
use x509_parser::pem::parse_x509_pem;

use crate::constants::{ALGORITHM_ES256, X5C_CHAIN_LEN};
use crate::error::{ChainLink, IapError};
use crate::jws::{self, JsonMap};

/// Length of a fixed-width ES256 `r || s` signature.
pub const ES256_RAW_SIGNATURE_LEN: usize = 64;

/// Verification settings for one integration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationConfig {
    pub algorithm: String,
    /// Dotted OID of the extension the leaf certificate must carry.
    pub leaf_cert_oid: String,
    /// Return payloads without any cryptographic check. Local inspection only.
    pub unsafe_mode: bool,
    /// DER of the externally trusted root, if pinned.
    pub trusted_root: Option<Vec<u8>>,
}

impl VerificationConfig {
    /// ES256 verification requiring `leaf_cert_oid` on the leaf.
    pub fn new(leaf_cert_oid: impl Into<String>) -> Self {
        Self {
            algorithm: ALGORITHM_ES256.to_string(),
            leaf_cert_oid: leaf_cert_oid.into(),
            unsafe_mode: false,
            trusted_root: None,
        }
    }

    /// Pin the chain to a trusted root given as PEM or bare base64 DER.
    pub fn with_trusted_root(mut self, certificate: &str) -> Result<Self, IapError> {
        self.trusted_root = Some(certificate_der(certificate)?);
        Ok(self)
    }

    /// Skip every cryptographic check and return decoded payloads as-is.
    ///
    /// # Security
    /// Tokens accepted in this mode prove nothing about their origin. Never
    /// enable this on a path that serves real notifications.
    pub fn insecure_unsafe_mode(mut self) -> Self {
        self.unsafe_mode = true;
        self
    }
}

/// Leaf, intermediate and root certificates as DER, in verification order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateChain {
    pub leaf: Vec<u8>,
    pub intermediate: Vec<u8>,
    pub root: Vec<u8>,
}

impl CertificateChain {
    /// Build a chain from an `x5c` header value.
    pub fn from_x5c(x5c: &[String]) -> Result<Self, IapError> {
        let [leaf, intermediate, root] = x5c else {
            return Err(IapError::MalformedToken(format!(
                "x5c must hold {X5C_CHAIN_LEN} certificates, found {}",
                x5c.len()
            )));
        };
        Ok(Self {
            leaf: certificate_der(leaf)?,
            intermediate: certificate_der(intermediate)?,
            root: certificate_der(root)?,
        })
    }

    /// Parse all three certificates.
    pub fn parse(&self) -> Result<ParsedChain<'_>, IapError> {
        Ok(ParsedChain {
            leaf: parse_certificate(&self.leaf, ChainLink::Leaf)?,
            intermediate: parse_certificate(&self.intermediate, ChainLink::Intermediate)?,
            root: parse_certificate(&self.root, ChainLink::Root)?,
        })
    }
}

/// Parsed view borrowing from a [`CertificateChain`].
pub struct ParsedChain<'a> {
    pub leaf: X509Certificate<'a>,
    pub intermediate: X509Certificate<'a>,
    pub root: X509Certificate<'a>,
}

impl ParsedChain<'_> {
    /// Check each issuer signature, leaf first.
    pub fn verify_links(&self, trusted_root: Option<&[u8]>) -> Result<(), IapError> {
        self.leaf
            .verify_signature(Some(self.intermediate.public_key()))
            .map_err(|e| {
                IapError::chain(ChainLink::Leaf, format!("not signed by intermediate: {e}"))
            })?;

        self.intermediate
            .verify_signature(Some(self.root.public_key()))
            .map_err(|e| {
                IapError::chain(ChainLink::Intermediate, format!("not signed by root: {e}"))
            })?;

        if let Some(trusted_der) = trusted_root {
            let trusted = parse_certificate(trusted_der, ChainLink::Root)?;
            self.root
                .verify_signature(Some(trusted.public_key()))
                .map_err(|e| {
                    IapError::chain(ChainLink::Root, format!("not signed by trusted root: {e}"))
                })?;
        }
        Ok(())
    }
}

/// Verifier bound to one [`VerificationConfig`]. Holds no per-call state.
#[derive(Debug, Clone)]
pub struct SignedDataVerifier {
    config: VerificationConfig,
}

impl SignedDataVerifier {
    pub fn new(config: VerificationConfig) -> Self {
        if config.unsafe_mode {
            tracing::warn!("signed data verifier created in unsafe mode, signatures are NOT checked");
        }
        Self { config }
    }

    pub fn config(&self) -> &VerificationConfig {
        &self.config
    }

    /// Decode and verify `token`, returning its payload.
    pub fn verify(&self, token: &str) -> Result<JsonMap, IapError> {
        verify(token, &self.config)
    }
}

/// Decode and verify a compact token against `config`.
pub fn verify(token: &str, config: &VerificationConfig) -> Result<JsonMap, IapError> {
    let decoded = jws::decode(token)?;
    if config.unsafe_mode {
        return Ok(decoded.payload);
    }

    let header = decoded.typed_header()?;
    let (Some(alg), Some(x5c)) = (header.alg.as_deref(), header.x5c.as_deref()) else {
        return Err(IapError::MalformedToken(
            "header is missing x5c or alg".to_string(),
        ));
    };
    if alg != config.algorithm {
        return Err(IapError::AlgorithmMismatch {
            expected: config.algorithm.clone(),
            found: alg.to_string(),
        });
    }
    if config.algorithm != ALGORITHM_ES256 {
        return Err(IapError::Config(format!(
            "unsupported verification algorithm '{}'",
            config.algorithm
        )));
    }

    let chain = CertificateChain::from_x5c(x5c)?;
    let parsed = chain.parse()?;
    parsed.verify_links(config.trusted_root.as_deref())?;
    verify_extension(&parsed.leaf, &config.leaf_cert_oid)?;
    verify_signature(&parsed.leaf, decoded.signing_input(), &decoded.signature)?;

    Ok(decoded.payload)
}

/// Require the extension identified by the dotted `oid` on `certificate`.
pub fn verify_extension(certificate: &X509Certificate<'_>, oid: &str) -> Result<(), IapError> {
    let present = certificate
        .extensions()
        .iter()
        .any(|ext| ext.oid.to_id_string() == oid);
    if present {
        Ok(())
    } else {
        Err(IapError::MissingExtension(oid.to_string()))
    }
}

/// Verify an ES256 signature over `signing_input` with the leaf's public key.
pub fn verify_signature(
    leaf: &X509Certificate<'_>,
    signing_input: &str,
    signature: &[u8],
) -> Result<(), IapError> {
    let key = VerifyingKey::from_public_key_der(leaf.public_key().raw).map_err(|e| {
        IapError::chain(ChainLink::Leaf, format!("leaf key is not a P-256 key: {e}"))
    })?;
    let der = der_signature(signature)?;
    key.verify(signing_input.as_bytes(), &der)
        .map_err(|_| IapError::SignatureMismatch)
}

/// Convert an ES256 signature to the ASN.1 `SEQUENCE { r INTEGER, s INTEGER }` form.
///
/// JWS transmits fixed-width `r || s`; that form is transcoded. Anything else is
/// parsed as DER directly.
pub fn der_signature(raw: &[u8]) -> Result<DerSignature, IapError> {
    if raw.len() == ES256_RAW_SIGNATURE_LEN {
        let fixed = Signature::from_slice(raw).map_err(|_| IapError::SignatureMismatch)?;
        return Ok(fixed.to_der());
    }
    DerSignature::try_from(raw).map_err(|_| IapError::SignatureMismatch)
}

/// Decode a certificate given as PEM or as bare (standard) base64 DER.
pub fn certificate_der(text: &str) -> Result<Vec<u8>, IapError> {
    let trimmed = text.trim();
    if trimmed.starts_with("-----BEGIN") {
        let (_, pem) = parse_x509_pem(trimmed.as_bytes())
            .map_err(|e| IapError::MalformedToken(format!("invalid PEM certificate: {e}")))?;
        return Ok(pem.contents);
    }
    let compact: String = trimmed.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| IapError::MalformedToken(format!("invalid base64 certificate: {e}")))
}

fn parse_certificate(der: &[u8], link: ChainLink) -> Result<X509Certificate<'_>, IapError> {
    parse_x509_certificate(der)
        .map(|(_, cert)| cert)
        .map_err(|e| IapError::chain(link, format!("unparseable certificate: {e}")))
}

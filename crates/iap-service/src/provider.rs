//! Per-platform field names, endpoints and token templates.

use serde::Serialize;

use crate::chain::{SignedDataVerifier, VerificationConfig};
use crate::config::{Environment, MerchantConfig};
use crate::constants::{
    APPLE_AUDIENCE, APPLE_LEAF_CERT_OID, APPLE_PRODUCTION_URL, APPLE_SANDBOX_URL, CLAIM_AUD,
    CLAIM_EXP, CLAIM_IAT, CLAIM_ISS, HEADER_ALG, HEADER_KID, HEADER_TYP, HUAWEI_AUDIENCE,
    HUAWEI_URL, TOKEN_TTL_SECS, TOKEN_TYPE,
};
use crate::error::IapError;
use crate::signer::{ClaimSet, ClaimValue, PrivateKey, TokenSigner};

/// Which claim layout outbound tokens use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Apple,
    Huawei,
}

/// Describes one platform integration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderProfile {
    pub name: String,
    pub kind: ProviderKind,
    /// Envelope field holding the signed notification.
    pub envelope_field: String,
    pub type_field: String,
    pub subtype_field: String,
    /// Dotted paths of signed fields nested inside a verified notification.
    pub nested_fields: Vec<String>,
    pub audience: String,
    pub token_ttl_secs: u64,
    pub default_leaf_oid: Option<String>,
    pub production_url: String,
    pub sandbox_url: String,
}

impl ProviderProfile {
    pub fn apple() -> Self {
        Self {
            name: "apple".to_string(),
            kind: ProviderKind::Apple,
            envelope_field: "signedPayload".to_string(),
            type_field: "notificationType".to_string(),
            subtype_field: "subtype".to_string(),
            nested_fields: vec![
                "data.signedTransactionInfo".to_string(),
                "data.signedRenewalInfo".to_string(),
            ],
            audience: APPLE_AUDIENCE.to_string(),
            token_ttl_secs: TOKEN_TTL_SECS,
            default_leaf_oid: Some(APPLE_LEAF_CERT_OID.to_string()),
            production_url: APPLE_PRODUCTION_URL.to_string(),
            sandbox_url: APPLE_SANDBOX_URL.to_string(),
        }
    }

    pub fn huawei() -> Self {
        Self {
            name: "huawei".to_string(),
            kind: ProviderKind::Huawei,
            envelope_field: "jwsNotification".to_string(),
            type_field: "notificationType".to_string(),
            subtype_field: "notificationSubtype".to_string(),
            nested_fields: Vec::new(),
            audience: HUAWEI_AUDIENCE.to_string(),
            token_ttl_secs: TOKEN_TTL_SECS,
            default_leaf_oid: None,
            production_url: HUAWEI_URL.to_string(),
            sandbox_url: HUAWEI_URL.to_string(),
        }
    }

    /// Look up a built-in profile by name.
    pub fn by_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "apple" => Some(Self::apple()),
            "huawei" => Some(Self::huawei()),
            _ => None,
        }
    }

    pub fn base_url(&self, environment: Environment) -> &str {
        match environment {
            Environment::Production => &self.production_url,
            Environment::Sandbox => &self.sandbox_url,
        }
    }

    /// Outbound header template: `{alg, kid, typ}`.
    pub fn token_header(&self, config: &MerchantConfig) -> ClaimSet {
        ClaimSet::new()
            .with(HEADER_ALG, config.algorithm.as_str())
            .with(HEADER_KID, config.kid.as_str())
            .with(HEADER_TYP, TOKEN_TYPE)
    }

    /// Outbound claims template. Time claims and the Huawei body digest are
    /// computed on every sign.
    pub fn token_claims(&self, config: &MerchantConfig) -> ClaimSet {
        let claims = ClaimSet::new()
            .with(CLAIM_ISS, config.issuer_id.as_str())
            .with(CLAIM_AUD, self.audience.as_str())
            .with(CLAIM_IAT, ClaimValue::issued_at())
            .with(CLAIM_EXP, ClaimValue::expires_in(self.token_ttl_secs));
        match self.kind {
            ProviderKind::Apple => claims.with("bid", config.app_id.as_str()),
            ProviderKind::Huawei => claims
                .with("aid", config.app_id.as_str())
                .with("digest", ClaimValue::body_digest()),
        }
    }

    /// Load the merchant key and bind it to this provider's templates.
    pub fn signer(&self, config: &MerchantConfig) -> Result<TokenSigner, IapError> {
        let path = config.private_key_path.as_ref().ok_or_else(|| {
            IapError::SignerConfig(format!("{}: private key path is not configured", self.name))
        })?;
        let key = PrivateKey::from_file(path)?;
        Ok(TokenSigner::new(
            self.token_header(config),
            self.token_claims(config),
            key,
        ))
    }

    /// Verification settings, falling back to this provider's default leaf OID.
    pub fn verification_config(
        &self,
        config: &MerchantConfig,
    ) -> Result<VerificationConfig, IapError> {
        let oid = if config.leaf_cert_oid.is_empty() {
            self.default_leaf_oid.clone().ok_or_else(|| {
                IapError::Config(format!("{}: leaf certificate OID is not configured", self.name))
            })?
        } else {
            config.leaf_cert_oid.clone()
        };

        let mut verification = VerificationConfig::new(oid);
        verification.algorithm = config.algorithm.clone();
        match &config.trusted_root {
            Some(root) => verification.with_trusted_root(root),
            None => Ok(verification),
        }
    }

    pub fn verifier(&self, config: &MerchantConfig) -> Result<SignedDataVerifier, IapError> {
        Ok(SignedDataVerifier::new(self.verification_config(config)?))
    }
}

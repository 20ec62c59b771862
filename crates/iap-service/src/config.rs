use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    ALGORITHM_ES256, DEFAULT_MAX_RETRY_ATTEMPTS, DEFAULT_RETRY_ON_STATUS, DEFAULT_TIMEOUT_SECS,
};
use crate::error::IapError;

/// Platform environment a merchant talks to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Production,
    Sandbox,
}

impl FromStr for Environment {
    type Err = IapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(Environment::Production),
            "sandbox" => Ok(Environment::Sandbox),
            other => Err(IapError::Config(format!("unknown environment '{other}'"))),
        }
    }
}

/// Credentials and tuning for one merchant on one platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerchantConfig {
    /// Key id placed in the outbound token header.
    #[serde(default)]
    pub kid: String,
    #[serde(default)]
    pub issuer_id: String,
    /// Apple bundle id or Huawei app id.
    #[serde(default)]
    pub app_id: String,
    /// PEM private key used for outbound tokens. Not needed to receive notifications.
    #[serde(default)]
    pub private_key_path: Option<PathBuf>,
    /// Extension required on the leaf of inbound chains. Empty means the provider default.
    #[serde(default)]
    pub leaf_cert_oid: String,
    #[serde(default = "default_algorithm")]
    pub algorithm: String,
    #[serde(default)]
    pub environment: Environment,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retry_attempts")]
    pub max_retry_attempts: u32,
    #[serde(default = "default_retry_on_status")]
    pub retry_on_status: Vec<u16>,
    /// Pinned root certificate, PEM or base64 DER.
    #[serde(default)]
    pub trusted_root: Option<String>,
}

fn default_algorithm() -> String {
    ALGORITHM_ES256.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_max_retry_attempts() -> u32 {
    DEFAULT_MAX_RETRY_ATTEMPTS
}

fn default_retry_on_status() -> Vec<u16> {
    DEFAULT_RETRY_ON_STATUS.to_vec()
}

impl Default for MerchantConfig {
    fn default() -> Self {
        Self {
            kid: String::new(),
            issuer_id: String::new(),
            app_id: String::new(),
            private_key_path: None,
            leaf_cert_oid: String::new(),
            algorithm: default_algorithm(),
            environment: Environment::default(),
            timeout_secs: default_timeout_secs(),
            max_retry_attempts: default_max_retry_attempts(),
            retry_on_status: default_retry_on_status(),
            trusted_root: None,
        }
    }
}

impl MerchantConfig {
    /// Read `<PREFIX>_KID`, `<PREFIX>_ISSUER_ID`, `<PREFIX>_APP_ID`,
    /// `<PREFIX>_PRIVATE_KEY_PATH`, `<PREFIX>_LEAF_CERT_OID`, `<PREFIX>_ALGORITHM`,
    /// `<PREFIX>_ENVIRONMENT`, `<PREFIX>_TIMEOUT_SECS`, `<PREFIX>_MAX_RETRY_ATTEMPTS`,
    /// `<PREFIX>_RETRY_ON_STATUS` (comma separated) and `<PREFIX>_TRUSTED_ROOT`.
    /// Unset variables keep their defaults.
    pub fn from_env(prefix: &str) -> Result<Self, IapError> {
        Self::from_lookup(prefix, |key| std::env::var(key).ok())
    }

    /// Like [`MerchantConfig::from_env`] with a custom variable source.
    pub fn from_lookup(
        prefix: &str,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, IapError> {
        let var = |name: &str| {
            lookup(&format!("{prefix}_{name}"))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut config = Self::default();
        if let Some(v) = var("KID") {
            config.kid = v;
        }
        if let Some(v) = var("ISSUER_ID") {
            config.issuer_id = v;
        }
        if let Some(v) = var("APP_ID") {
            config.app_id = v;
        }
        config.private_key_path = var("PRIVATE_KEY_PATH").map(PathBuf::from);
        if let Some(v) = var("LEAF_CERT_OID") {
            config.leaf_cert_oid = v;
        }
        if let Some(v) = var("ALGORITHM") {
            config.algorithm = v;
        }
        if let Some(v) = var("ENVIRONMENT") {
            config.environment = v.parse()?;
        }
        if let Some(v) = var("TIMEOUT_SECS") {
            config.timeout_secs = parse_number(prefix, "TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = var("MAX_RETRY_ATTEMPTS") {
            config.max_retry_attempts = parse_number(prefix, "MAX_RETRY_ATTEMPTS", &v)?;
        }
        if let Some(v) = var("RETRY_ON_STATUS") {
            config.retry_on_status = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| parse_number(prefix, "RETRY_ON_STATUS", s))
                .collect::<Result<_, _>>()?;
        }
        config.trusted_root = var("TRUSTED_ROOT");
        Ok(config)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn should_retry(&self, status: u16) -> bool {
        self.retry_on_status.contains(&status)
    }
}

fn parse_number<T: FromStr>(prefix: &str, name: &str, value: &str) -> Result<T, IapError> {
    value
        .parse()
        .map_err(|_| IapError::Config(format!("{prefix}_{name} is not a valid number: '{value}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = MerchantConfig::default();
        assert_eq!(config.algorithm, "ES256");
        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.timeout(), Duration::from_secs(10));
        assert_eq!(config.max_retry_attempts, 3);
        assert!(config.should_retry(429));
        assert!(config.should_retry(500));
        assert!(!config.should_retry(503));
    }

    #[test]
    fn test_from_lookup_reads_prefixed_vars() {
        let config = MerchantConfig::from_lookup(
            "APPLE",
            lookup(&[
                ("APPLE_KID", "2X9R4HXF34"),
                ("APPLE_ISSUER_ID", "57246542-96fe-1a63-e053-0824d011072a"),
                ("APPLE_APP_ID", "com.example.app"),
                ("APPLE_PRIVATE_KEY_PATH", "/etc/iap/AuthKey.p8"),
                ("APPLE_ENVIRONMENT", "sandbox"),
                ("APPLE_TIMEOUT_SECS", "5"),
                ("APPLE_RETRY_ON_STATUS", "429, 502,503"),
                ("HUAWEI_KID", "ignored"),
            ]),
        )
        .unwrap();
        assert_eq!(config.kid, "2X9R4HXF34");
        assert_eq!(config.app_id, "com.example.app");
        assert_eq!(config.private_key_path, Some(PathBuf::from("/etc/iap/AuthKey.p8")));
        assert_eq!(config.environment, Environment::Sandbox);
        assert_eq!(config.timeout_secs, 5);
        assert_eq!(config.retry_on_status, vec![429, 502, 503]);
        assert_eq!(config.max_retry_attempts, 3);
        assert!(config.trusted_root.is_none());
    }

    #[test]
    fn test_from_lookup_rejects_bad_number() {
        let err =
            MerchantConfig::from_lookup("HUAWEI", lookup(&[("HUAWEI_TIMEOUT_SECS", "soon")]))
                .unwrap_err();
        assert!(err.to_string().contains("HUAWEI_TIMEOUT_SECS"));
    }

    #[test]
    fn test_from_lookup_rejects_unknown_environment() {
        assert!(
            MerchantConfig::from_lookup("APPLE", lookup(&[("APPLE_ENVIRONMENT", "staging")]))
                .is_err()
        );
    }

    #[test]
    fn test_deserialize_fills_defaults() {
        let config: MerchantConfig =
            serde_json::from_str(r#"{"kid":"K","leaf_cert_oid":"1.2.3","environment":"sandbox"}"#)
                .unwrap();
        assert_eq!(config.kid, "K");
        assert_eq!(config.environment, Environment::Sandbox);
        assert_eq!(config.retry_on_status, vec![429, 500]);
        assert_eq!(config.algorithm, "ES256");
    }
}

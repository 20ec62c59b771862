//! Build the server state from environment configuration.
//!
//! `IAP_PROVIDERS` (default `apple`) lists the enabled providers. Each one
//! reads its merchant settings from `<PROVIDER>_*` variables, see
//! [`iap::MerchantConfig::from_env`]. `IAP_ACCEPT_EVENTS` lists the
//! notification keys to acknowledge as `provider:TYPE[.SUBTYPE]`, comma
//! separated; every other notification is answered with 500.

use std::collections::HashMap;

use iap::{
    Dispatcher, HandlerRegistry, IapError, MerchantConfig, ProviderProfile, RegistryBuilder,
};

use crate::state::AppState;

/// Server settings read at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootstrapConfig {
    pub providers: Vec<String>,
    /// `(provider, key)` pairs to acknowledge.
    pub accept_events: Vec<(String, String)>,
    pub metrics_token: Option<Vec<u8>>,
    pub public_metrics: bool,
}

impl BootstrapConfig {
    pub fn from_env() -> Result<Self, IapError> {
        let providers = std::env::var("IAP_PROVIDERS")
            .ok()
            .map(|v| split_list(&v))
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| vec!["apple".to_string()]);

        let accept_events = match std::env::var("IAP_ACCEPT_EVENTS") {
            Ok(v) => parse_accept_events(&v)?,
            Err(_) => Vec::new(),
        };

        let metrics_token = std::env::var("METRICS_TOKEN")
            .ok()
            .filter(|s| !s.is_empty())
            .map(|s| s.into_bytes());

        let public_metrics = std::env::var("IAP_PUBLIC_METRICS")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        Ok(Self {
            providers,
            accept_events,
            metrics_token,
            public_metrics,
        })
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_ascii_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Parse `apple:SUBSCRIBED.INITIAL_BUY,huawei:ORDER` into `(provider, key)` pairs.
pub fn parse_accept_events(value: &str) -> Result<Vec<(String, String)>, IapError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|entry| match entry.split_once(':') {
            Some((provider, key)) if !provider.trim().is_empty() && !key.trim().is_empty() => {
                Ok((provider.trim().to_ascii_lowercase(), key.trim().to_string()))
            }
            _ => Err(IapError::Config(format!(
                "IAP_ACCEPT_EVENTS entry '{entry}' is not provider:KEY"
            ))),
        })
        .collect()
}

/// Registry acknowledging every key in `keys`. `TYPE.SUBTYPE` splits at the first dot.
pub fn acknowledging_registry<'a>(keys: impl IntoIterator<Item = &'a str>) -> HandlerRegistry {
    keys.into_iter()
        .fold(RegistryBuilder::new(), |builder, key| {
            let (notification_type, subtype) = match key.split_once('.') {
                Some((t, s)) => (t, Some(s)),
                None => (key, None),
            };
            let logged_key = key.to_string();
            builder.on(notification_type, subtype, move |provider, _payload| {
                tracing::info!(provider = %provider, key = %logged_key, "notification acknowledged");
                Ok(true)
            })
        })
        .build()
}

/// Build one dispatcher per configured provider.
///
/// `merchant` supplies the settings for a provider given its env prefix
/// (`APPLE`, `HUAWEI`).
pub fn build_state(
    config: &BootstrapConfig,
    merchant: impl Fn(&str) -> Result<MerchantConfig, IapError>,
) -> Result<AppState, IapError> {
    let mut dispatchers = HashMap::new();

    for name in &config.providers {
        let profile = ProviderProfile::by_name(name)
            .ok_or_else(|| IapError::Config(format!("unknown provider '{name}'")))?;
        let merchant_config = merchant(&name.to_ascii_uppercase())?;
        let verifier = profile.verifier(&merchant_config)?;

        let registry = acknowledging_registry(
            config
                .accept_events
                .iter()
                .filter(|(provider, _)| provider == name)
                .map(|(_, key)| key.as_str()),
        );
        if registry.is_empty() {
            tracing::warn!(provider = %name, "no accepted events configured, every notification will be retried");
        } else {
            tracing::info!(provider = %name, events = ?registry.keys(), "provider configured");
        }

        dispatchers.insert(profile.name.clone(), Dispatcher::new(profile, verifier, registry));
    }

    if config.metrics_token.is_none() && config.public_metrics {
        tracing::warn!("IAP_PUBLIC_METRICS=true, /metrics is publicly accessible");
    }

    Ok(AppState {
        dispatchers,
        metrics_token: config.metrics_token.clone(),
        public_metrics: config.public_metrics,
    })
}

use std::collections::HashMap;

use iap::Dispatcher;

/// Shared application state for the notification server.
pub struct AppState {
    /// Dispatcher per provider name (`apple`, `huawei`).
    pub dispatchers: HashMap<String, Dispatcher>,
    /// Bearer token for /metrics.
    pub metrics_token: Option<Vec<u8>>,
    /// Serve /metrics without a token when none is configured.
    pub public_metrics: bool,
}

impl AppState {
    /// Configured provider names, sorted.
    pub fn providers(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.dispatchers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

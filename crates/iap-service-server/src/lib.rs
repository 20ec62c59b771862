//! Webhook server for signed in-app purchase notifications.
//!
//! Each configured provider gets its own [`iap::Dispatcher`]; the server only
//! maps HTTP requests onto it and turns the acknowledgement into a status code.
//!
//! # Modules
//!
//! - [`routes`]: HTTP endpoints (notify, health, metrics)
//! - [`state`]: Shared [`AppState`](state::AppState), frozen before serving
//! - [`bootstrap`]: Builds the state from environment configuration
//! - [`metrics`]: Prometheus metrics for notification handling

pub mod bootstrap;
pub mod metrics;
pub mod routes;
pub mod state;

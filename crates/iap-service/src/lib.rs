//! Server-side toolkit for in-app purchase platforms.
//!
//! Both directions of a platform integration revolve around ES256 compact
//! tokens:
//!
//! - **Outbound** ([`TokenSigner`]): every server API call carries a freshly
//!   signed `Authorization: Bearer <token>` whose claims may be computed from
//!   the request itself (e.g. a body digest).
//! - **Inbound** ([`Dispatcher`]): webhook notifications are signed tokens with
//!   an `x5c` certificate chain. They are verified against that chain and the
//!   required leaf extension ([`SignedDataVerifier`]) before a registered
//!   handler sees the payload.
//!
//! # Quick example (notifications)
//!
//! ```no_run
//! use iap::{Dispatcher, MerchantConfig, ProviderProfile, RegistryBuilder};
//!
//! # fn main() -> Result<(), iap::IapError> {
//! let profile = ProviderProfile::apple();
//! let verifier = profile.verifier(&MerchantConfig::from_env("APPLE")?)?;
//! let registry = RegistryBuilder::new()
//!     .on("SUBSCRIBED", Some("INITIAL_BUY"), |_provider, payload| {
//!         println!("new subscriber: {payload:?}");
//!         Ok(true)
//!     })
//!     .build();
//!
//! let dispatcher = Dispatcher::new(profile, verifier, registry);
//! let ack = dispatcher.dispatch(br#"{"signedPayload":"..."}"#);
//! println!("respond with {}", ack.status_code());
//! # Ok(())
//! # }
//! ```

// Core types
pub mod constants;
pub mod error;

// Token codec, verification and signing
pub mod chain;
pub mod digest;
pub mod jws;
pub mod security;
pub mod signer;

// Notifications and platform profiles
pub mod config;
pub mod notify;
pub mod provider;

// HTTP client
#[cfg(feature = "full")]
pub mod http_client;

#[cfg(any(test, feature = "test-fixtures"))]
pub mod fixtures;

// Re-exports
pub use chain::{CertificateChain, SignedDataVerifier, VerificationConfig};
pub use config::{Environment, MerchantConfig};
pub use constants::*;
pub use error::{ChainLink, IapError};
pub use jws::{CompactToken, JsonMap, TokenHeader};
pub use notify::{
    composite_key, dispatch, Acknowledgement, Dispatcher, HandlerError, HandlerRegistry,
    NotificationHandler, RegistryBuilder,
};
pub use provider::{ProviderKind, ProviderProfile};
pub use signer::{ClaimSet, ClaimValue, PrivateKey, RequestContext, TokenSigner};

#[cfg(feature = "full")]
pub use http_client::{decode_signed_fields, ApiResponse, ServerApiClient};

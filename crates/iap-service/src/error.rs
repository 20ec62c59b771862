use std::fmt;

use thiserror::Error;

/// Link of the `x5c` certificate chain that failed verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainLink {
    Leaf,
    Intermediate,
    Root,
}

impl fmt::Display for ChainLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ChainLink::Leaf => "leaf",
            ChainLink::Intermediate => "intermediate",
            ChainLink::Root => "root",
        })
    }
}

/// Errors returned by token, verification, signing and dispatch operations.
#[derive(Debug, Error)]
pub enum IapError {
    #[error("malformed token: {0}")]
    MalformedToken(String),

    #[error("algorithm mismatch: expected '{expected}', got '{found}'")]
    AlgorithmMismatch { expected: String, found: String },

    #[error("{link} certificate verification failed: {reason}")]
    ChainVerification { link: ChainLink, reason: String },

    #[error("leaf certificate is missing required extension {0}")]
    MissingExtension(String),

    #[error("signature mismatch")]
    SignatureMismatch,

    #[error("no handler registered for '{0}'")]
    HandlerNotFound(String),

    #[error("handler failed: {0}")]
    HandlerFailure(String),

    #[error("signer configuration error: {0}")]
    SignerConfig(String),

    #[error("invalid notification: {0}")]
    InvalidNotification(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("http error: {0}")]
    Http(String),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl IapError {
    /// Shorthand for a chain failure on the given link.
    pub fn chain(link: ChainLink, reason: impl Into<String>) -> Self {
        IapError::ChainVerification {
            link,
            reason: reason.into(),
        }
    }

    /// True for the errors produced by the trust-chain verifier.
    pub fn is_verification_failure(&self) -> bool {
        matches!(
            self,
            IapError::MalformedToken(_)
                | IapError::AlgorithmMismatch { .. }
                | IapError::ChainVerification { .. }
                | IapError::MissingExtension(_)
                | IapError::SignatureMismatch
        )
    }
}

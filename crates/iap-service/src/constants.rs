/// The only signature algorithm supported for both directions.
pub const ALGORITHM_ES256: &str = "ES256";

/// Conventional `typ` header value.
pub const TOKEN_TYPE: &str = "JWT";

pub const HEADER_ALG: &str = "alg";
pub const HEADER_KID: &str = "kid";
pub const HEADER_TYP: &str = "typ";
pub const HEADER_X5C: &str = "x5c";

pub const CLAIM_ISS: &str = "iss";
pub const CLAIM_AUD: &str = "aud";
pub const CLAIM_IAT: &str = "iat";
pub const CLAIM_EXP: &str = "exp";

/// Number of certificates expected in `x5c`: leaf, intermediate, root.
pub const X5C_CHAIN_LEN: usize = 3;

/// Lifetime of outbound authentication tokens, in seconds.
pub const TOKEN_TTL_SECS: u64 = 3600;

/// Scheme prefix of the outbound `Authorization` header.
pub const BEARER_PREFIX: &str = "Bearer ";

/// Marker extension carried by App Store receipt-signing leaf certificates.
pub const APPLE_LEAF_CERT_OID: &str = "1.2.840.113635.100.6.11.1";

pub const APPLE_PRODUCTION_URL: &str = "https://api.storekit.itunes.apple.com";
pub const APPLE_SANDBOX_URL: &str = "https://api.storekit-sandbox.itunes.apple.com";
pub const APPLE_AUDIENCE: &str = "appstoreconnect-v1";

pub const HUAWEI_URL: &str = "https://iap.cloud.huawei.com";
pub const HUAWEI_AUDIENCE: &str = "iap-v1";

/// Default outbound request timeout, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Default total attempts for one outbound call (first try included).
pub const DEFAULT_MAX_RETRY_ATTEMPTS: u32 = 3;

/// Statuses retried by default.
pub const DEFAULT_RETRY_ON_STATUS: [u16; 2] = [429, 500];

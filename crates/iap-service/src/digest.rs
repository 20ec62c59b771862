use sha2::{Digest, Sha256};

/// SHA-256 of `body`, lowercase hex encoded.
///
/// Used for request-body digest claims, so the output must match what the
/// platform computes over the same bytes.
pub fn sha256_hex(body: &[u8]) -> String {
    hex::encode(Sha256::digest(body))
}

mod hex {
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        bytes.as_ref().iter().fold(String::new(), |mut s, b| {
            use std::fmt::Write;
            let _ = write!(s, "{b:02x}");
            s
        })
    }
}

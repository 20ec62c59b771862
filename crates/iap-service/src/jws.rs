//! Compact-token codec.
//!
//! Wire form is `base64url(header-json).base64url(payload-json).base64url(signature)`
//! with padding stripped. Decoding re-pads each segment before base64 decoding and
//! keeps the received `header.payload` text verbatim, since signatures are computed
//! over those exact bytes rather than over a re-serialization.

use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::IapError;

/// JSON object as produced by decoding a header or payload segment.
pub type JsonMap = Map<String, Value>;

/// A decoded compact token.
#[derive(Debug, Clone, PartialEq)]
pub struct CompactToken {
    pub header: JsonMap,
    pub payload: JsonMap,
    pub signature: Vec<u8>,
    signing_input: String,
}

impl CompactToken {
    /// The `header.payload` text exactly as received.
    pub fn signing_input(&self) -> &str {
        &self.signing_input
    }

    /// Typed view of the well-known header fields.
    pub fn typed_header(&self) -> Result<TokenHeader, IapError> {
        serde_json::from_value(Value::Object(self.header.clone()))
            .map_err(|e| IapError::MalformedToken(format!("invalid header fields: {e}")))
    }
}

/// Well-known header fields. Unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenHeader {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub typ: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x5c: Option<Vec<String>>,
}

/// Base64url-encode one segment without padding.
pub fn encode_segment(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Decode one base64url segment, re-adding the `=` padding the wire form omits.
pub fn decode_segment(segment: &str) -> Result<Vec<u8>, IapError> {
    let mut padded = String::with_capacity(segment.len() + 3);
    padded.push_str(segment);
    let remainder = segment.len() % 4;
    if remainder != 0 {
        padded.extend(std::iter::repeat('=').take(4 - remainder));
    }
    URL_SAFE
        .decode(padded.as_bytes())
        .map_err(|e| IapError::MalformedToken(format!("invalid base64url segment: {e}")))
}

/// Build the `base64url(header).base64url(payload)` signing input.
pub fn signing_input(header: &JsonMap, payload: &JsonMap) -> Result<String, IapError> {
    let header_json = serde_json::to_vec(header)?;
    let payload_json = serde_json::to_vec(payload)?;
    Ok(format!(
        "{}.{}",
        encode_segment(&header_json),
        encode_segment(&payload_json)
    ))
}

/// Encode a header, payload and raw signature into compact form.
pub fn encode(header: &JsonMap, payload: &JsonMap, signature: &[u8]) -> Result<String, IapError> {
    let input = signing_input(header, payload)?;
    Ok(format!("{input}.{}", encode_segment(signature)))
}

/// Decode a compact token without any cryptographic check.
pub fn decode(token: &str) -> Result<CompactToken, IapError> {
    let parts: Vec<&str> = token.split('.').collect();
    let [header_b64, payload_b64, signature_b64] = parts.as_slice() else {
        return Err(IapError::MalformedToken(format!(
            "expected 3 segments, found {}",
            parts.len()
        )));
    };

    let header = decode_object(header_b64, "header")?;
    let payload = decode_object(payload_b64, "payload")?;

    if signature_b64.is_empty() {
        return Err(IapError::MalformedToken("empty signature segment".to_string()));
    }
    let signature = decode_segment(signature_b64)?;

    // Both separators exist, so the last one splits signing input from signature.
    let split = token.len() - signature_b64.len() - 1;

    Ok(CompactToken {
        header,
        payload,
        signature,
        signing_input: token[..split].to_string(),
    })
}

fn decode_object(segment: &str, name: &str) -> Result<JsonMap, IapError> {
    if segment.is_empty() {
        return Err(IapError::MalformedToken(format!("empty {name} segment")));
    }
    let bytes = decode_segment(segment)?;
    match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(IapError::MalformedToken(format!(
            "{name} is not a JSON object"
        ))),
        Err(e) => Err(IapError::MalformedToken(format!(
            "failed to parse {name} JSON: {e}"
        ))),
    }
}

//! Content digests.
//!
//! SHA-256 helpers, plus extraction of the manifest digest a cosign simple
//! signing payload vouches for.

use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{VerifyError, VerifyResult};
use crate::types::SignedPayload;

/// `critical.type` of a cosign simple signing payload.
pub const SIMPLE_SIGNING_TYPE: &str = "cosign container image signature";

/// `sha256:<hex>` of `bytes`.
pub(crate) fn sha256_hex_bytes(bytes: &[u8]) -> String {
    format!("sha256:{}", hex::encode(Sha256::digest(bytes)))
}

/// Hex part of a `sha256:<hex>` digest.
pub(crate) fn digest_hex(digest: &str) -> &str {
    digest.strip_prefix("sha256:").unwrap_or(digest)
}

/// Manifest digest claimed by a simple signing payload, if it has the
/// expected shape.
///
/// Lookups run in order `critical` → `type` → `identity` → `image` →
/// `docker-manifest-digest`; any missing or mistyped step yields `None`.
pub(crate) fn claimed_digest(payload: &Value) -> Option<&str> {
    let critical = payload.get("critical")?.as_object()?;

    let kind = critical.get("type")?.as_str()?;
    if kind != SIMPLE_SIGNING_TYPE {
        return None;
    }

    critical.get("identity")?.as_object()?;

    critical
        .get("image")?
        .as_object()?
        .get("docker-manifest-digest")?
        .as_str()
}

/// Extract the manifest digest from verified signature payloads.
///
/// Payloads are tried in the order received and the first one with a cosign
/// image signature claim wins.
pub fn extract_digest(image_ref: &str, payloads: &[SignedPayload]) -> VerifyResult<String> {
    for payload in payloads {
        let json: Value =
            serde_json::from_slice(payload.payload()).map_err(|e| VerifyError::MalformedPayload {
                reference: image_ref.to_string(),
                reason: e.to_string(),
            })?;

        debug!(image = image_ref, payload = %json, "image verification response");

        if let Some(digest) = claimed_digest(&json) {
            return Ok(digest.to_string());
        }
    }

    Err(VerifyError::DigestNotFound {
        reference: image_ref.to_string(),
    })
}

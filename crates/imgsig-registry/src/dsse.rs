//! DSSE envelope verification.
//!
//! PAE building and signature checking only; no claim or policy decisions.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

use crate::error::{RegistryError, RegistryResult};
use crate::keys::PublicVerifierKey;
use crate::types::DsseEnvelope;

/// Payload type of in-toto statements wrapped by cosign attestations.
pub const PAYLOAD_TYPE_IN_TOTO: &str = "application/vnd.in-toto+json";

/// Build DSSE Pre-Authentication Encoding (PAE).
///
/// ```text
/// PAE(type, payload) = "DSSEv1" SP LEN(type) SP type SP LEN(payload) SP payload
/// ```
pub(crate) fn build_pae(payload_type: &str, payload: &[u8]) -> Vec<u8> {
    let type_len = payload_type.len().to_string();
    let payload_len = payload.len().to_string();

    let mut pae = Vec::new();
    pae.extend_from_slice(b"DSSEv1 ");
    pae.extend_from_slice(type_len.as_bytes());
    pae.push(b' ');
    pae.extend_from_slice(payload_type.as_bytes());
    pae.push(b' ');
    pae.extend_from_slice(payload_len.as_bytes());
    pae.push(b' ');
    pae.extend_from_slice(payload);
    pae
}

/// Parse a DSSE envelope from its JSON bytes.
pub(crate) fn parse_envelope(bytes: &[u8]) -> RegistryResult<DsseEnvelope> {
    serde_json::from_slice(bytes).map_err(|e| RegistryError::NoMatchingSignatures {
        reason: format!("invalid DSSE envelope: {}", e),
    })
}

/// Verify a DSSE envelope with `key`.
///
/// Returns the base64 signature that validated and the decoded payload.
pub(crate) fn verify_envelope(
    envelope: &DsseEnvelope,
    key: &PublicVerifierKey,
) -> RegistryResult<(String, Vec<u8>)> {
    let payload_bytes =
        BASE64
            .decode(&envelope.payload)
            .map_err(|e| RegistryError::NoMatchingSignatures {
                reason: format!("invalid base64 payload: {}", e),
            })?;

    if envelope.signatures.is_empty() {
        return Err(RegistryError::NoMatchingSignatures {
            reason: "no signatures in envelope".to_string(),
        });
    }

    let pae = build_pae(&envelope.payload_type, &payload_bytes);

    let mut last_error = None;
    for sig in &envelope.signatures {
        match key.verify_b64(&pae, &sig.signature) {
            Ok(()) => return Ok((sig.signature.clone(), payload_bytes)),
            Err(e) => last_error = Some(e),
        }
    }

    Err(
        last_error.unwrap_or_else(|| RegistryError::NoMatchingSignatures {
            reason: "no valid signatures".to_string(),
        }),
    )
}

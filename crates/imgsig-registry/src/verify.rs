//! Fetch-and-verify for cosign artifacts.
//!
//! Resolves the image digest, fetches the artifact manifest tagged after it,
//! checks every layer cryptographically and then against its claims. Only
//! layers passing both become [`SignedPayload`]s.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::{debug, info};

use crate::client::{artifact_tag, ArtifactSource};
use crate::credentials::CredentialContext;
use crate::digest::digest_hex;
use crate::dsse::{parse_envelope, verify_envelope};
use crate::error::{RegistryError, RegistryResult};
use crate::keys::PublicVerifierKey;
use crate::reference::{ImageRef, Repository};
use crate::trust::TrustRoots;
use crate::types::{SignatureLayer, SignedPayload};

/// How a layer's signature is laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifierKind {
    /// Signature annotation over the raw blob (cosign signatures).
    Plain,
    /// Blob is a DSSE envelope signed over its PAE (cosign attestations).
    Dsse,
}

/// Claims a cryptographically valid layer must also satisfy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimVerifier {
    /// Simple signing payload naming the image digest, with every required
    /// annotation present in `optional`.
    SimpleSigning { annotations: BTreeMap<String, String> },
    /// In-toto statement with a subject whose `sha256` is the image digest.
    IntotoSubject,
}

/// Everything a verification needs besides the image.
#[derive(Debug, Clone)]
pub struct CheckOpts<'a> {
    /// Pre-resolved root pool. Raw-key verification does not consult it.
    pub trust_roots: &'a TrustRoots,
    pub verifier: PublicVerifierKey,
    pub kind: VerifierKind,
    pub signature_repository: Repository,
    pub credentials: &'a CredentialContext,
    pub claim_verifier: ClaimVerifier,
    /// `sig` or `att`.
    pub tag_suffix: &'a str,
}

/// Fetch the artifacts of `image` and return the payloads that verify.
///
/// Payloads keep manifest order. Fails with
/// [`RegistryError::NoMatchingSignatures`] when no layer passes.
pub async fn verify<S>(
    source: &S,
    image: &ImageRef,
    opts: &CheckOpts<'_>,
) -> RegistryResult<Vec<SignedPayload>>
where
    S: ArtifactSource + ?Sized,
{
    let digest = source.resolve_digest(image, opts.credentials).await?;
    let tag = artifact_tag(&digest, opts.tag_suffix);

    debug!(
        image = %image,
        digest = %digest,
        repository = %opts.signature_repository,
        tag = %tag,
        key_id = %opts.verifier.key_id(),
        trust_roots = opts.trust_roots.len(),
        "verifying image artifacts"
    );

    let layers = source
        .fetch_layers(&opts.signature_repository, &tag, opts.credentials)
        .await?;

    if layers.is_empty() {
        return Err(RegistryError::NoMatchingSignatures {
            reason: format!("no layers in {}", tag),
        });
    }

    let mut verified = Vec::new();
    let mut rejected = Vec::new();
    for layer in &layers {
        match verify_layer(layer, opts, &digest) {
            Ok(payload) => verified.push(payload),
            Err(e) => {
                debug!(layer = %layer.digest, error = %e, "rejected layer");
                rejected.push(e.to_string());
            }
        }
    }

    if verified.is_empty() {
        return Err(RegistryError::NoMatchingSignatures {
            reason: format!("{} candidate(s) rejected: {}", rejected.len(), rejected.join("; ")),
        });
    }

    info!(
        image = %image,
        verified = verified.len(),
        rejected = rejected.len(),
        "verified image artifacts"
    );
    Ok(verified)
}

fn verify_layer(
    layer: &SignatureLayer,
    opts: &CheckOpts<'_>,
    digest: &str,
) -> RegistryResult<SignedPayload> {
    let (signature, signed) = match opts.kind {
        VerifierKind::Plain => {
            let signature = layer
                .signature()
                .ok_or_else(|| RegistryError::NoMatchingSignatures {
                    reason: "layer has no signature annotation".to_string(),
                })?;
            opts.verifier.verify_b64(&layer.payload, signature)?;
            (signature.to_string(), layer.payload.clone())
        }
        VerifierKind::Dsse => {
            let envelope = parse_envelope(&layer.payload)?;
            verify_envelope(&envelope, &opts.verifier)?
        }
    };

    check_claims(&opts.claim_verifier, &signed, digest)?;

    // Attestation consumers decode the envelope themselves
    Ok(SignedPayload::new(layer.payload.clone(), signature))
}

fn check_claims(claims: &ClaimVerifier, signed: &[u8], digest: &str) -> RegistryResult<()> {
    let reject = |reason: String| RegistryError::NoMatchingSignatures { reason };

    let json: Value = serde_json::from_slice(signed)
        .map_err(|e| reject(format!("signed payload is not JSON: {}", e)))?;

    match claims {
        ClaimVerifier::SimpleSigning { annotations } => {
            let claimed = json
                .get("critical")
                .and_then(|c| c.get("image"))
                .and_then(|i| i.get("docker-manifest-digest"))
                .and_then(Value::as_str);
            if claimed != Some(digest) {
                return Err(reject(format!(
                    "payload digest {} does not match {}",
                    claimed.unwrap_or("<none>"),
                    digest
                )));
            }

            let optional = json.get("optional").and_then(Value::as_object);
            for (key, expected) in annotations {
                let actual = optional.and_then(|o| o.get(key)).and_then(Value::as_str);
                if actual != Some(expected.as_str()) {
                    return Err(reject(format!("missing or incorrect annotation {}", key)));
                }
            }
            Ok(())
        }
        ClaimVerifier::IntotoSubject => {
            let hex = digest_hex(digest);
            let matches = json
                .get("subject")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
                .filter_map(|s| s.get("digest")?.get("sha256")?.as_str())
                .any(|d| d == hex);
            if matches {
                Ok(())
            } else {
                Err(reject(format!("no subject matches digest {}", digest)))
            }
        }
    }
}

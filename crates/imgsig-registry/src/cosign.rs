//! Signature and attestation verification entry points.
//!
//! Both paths decode the key, parse the image, resolve the signature
//! repository and only then touch the registry. Registry failures are
//! classified into not-found, mismatch or a generic verification failure.

use std::collections::BTreeMap;

use tracing::info;

use crate::attestation::{decode_statements, DecodedStatement};
use crate::client::{ArtifactSource, RegistryClient, ATTESTATION_TAG_SUFFIX, SIGNATURE_TAG_SUFFIX};
use crate::credentials::CredentialContext;
use crate::digest::extract_digest;
use crate::error::{classify, VerifyError, VerifyResult};
use crate::keys::PublicVerifierKey;
use crate::reference::ImageRef;
use crate::resolver::resolve_signature_repository;
use crate::trust::TrustRoots;
use crate::types::{RegistryConfig, SignedPayload};
use crate::verify::{verify, CheckOpts, ClaimVerifier, VerifierKind};

/// Extra requirements for signature verification.
#[derive(Debug, Clone, Default)]
pub struct VerifySignatureOptions {
    /// Annotations the signed payload's `optional` section must carry.
    pub annotations: BTreeMap<String, String>,
}

impl VerifySignatureOptions {
    /// Require `key` = `value` in the signed payload.
    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }
}

/// Verifies cosign signatures and attestations read from an
/// [`ArtifactSource`].
///
/// ```no_run
/// use imgsig_registry::{Cosign, CredentialContext};
///
/// # async fn example(key: &[u8]) -> Result<(), imgsig_registry::VerifyError> {
/// let cosign = Cosign::from_env()?;
/// let credentials = CredentialContext::from_env()?;
///
/// let digest = cosign
///     .verify_signature(&credentials, "registry.example/app:v1", key, "")
///     .await?;
/// println!("verified {}", digest);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Cosign<S = RegistryClient> {
    source: S,
    trust_roots: TrustRoots,
}

impl Cosign<RegistryClient> {
    /// Verifier backed by an OCI registry client.
    pub fn from_config(config: RegistryConfig) -> VerifyResult<Self> {
        let client = RegistryClient::new(config).map_err(|e| VerifyError::Config {
            message: e.to_string(),
        })?;
        Ok(Self::new(client))
    }

    /// Verifier configured from environment (see [`RegistryConfig::from_env`]).
    pub fn from_env() -> VerifyResult<Self> {
        Self::from_config(RegistryConfig::from_env())
    }
}

impl<S: ArtifactSource> Cosign<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            trust_roots: TrustRoots::new(),
        }
    }

    /// Set the pre-resolved trust root pool.
    pub fn with_trust_roots(mut self, trust_roots: TrustRoots) -> Self {
        self.trust_roots = trust_roots;
        self
    }

    /// Verify the signature of `image_ref` with the PEM public key `key` and
    /// return the signed manifest digest.
    ///
    /// `repository` overrides where signatures are read from; `""` means the
    /// image's own repository.
    pub async fn verify_signature(
        &self,
        credentials: &CredentialContext,
        image_ref: &str,
        key: &[u8],
        repository: &str,
    ) -> VerifyResult<String> {
        self.verify_signature_with(
            credentials,
            image_ref,
            key,
            repository,
            &VerifySignatureOptions::default(),
        )
        .await
    }

    /// [`Cosign::verify_signature`] with required annotations.
    pub async fn verify_signature_with(
        &self,
        credentials: &CredentialContext,
        image_ref: &str,
        key: &[u8],
        repository: &str,
        options: &VerifySignatureOptions,
    ) -> VerifyResult<String> {
        let claim_verifier = ClaimVerifier::SimpleSigning {
            annotations: options.annotations.clone(),
        };
        let verified = self
            .fetch_verified(
                credentials,
                image_ref,
                key,
                repository,
                VerifierKind::Plain,
                claim_verifier,
                SIGNATURE_TAG_SUFFIX,
            )
            .await
            .inspect_err(|e| info!(image = image_ref, error = %e, "image verification failed"))?;

        extract_digest(image_ref, &verified)
    }

    /// Verify the attestations of `image_ref` with the PEM public key `key`
    /// and return them as decoded in-toto statements, in manifest order.
    pub async fn fetch_attestations(
        &self,
        credentials: &CredentialContext,
        image_ref: &str,
        key: &[u8],
        repository: &str,
    ) -> VerifyResult<Vec<DecodedStatement>> {
        let verified = self
            .fetch_verified(
                credentials,
                image_ref,
                key,
                repository,
                VerifierKind::Dsse,
                ClaimVerifier::IntotoSubject,
                ATTESTATION_TAG_SUFFIX,
            )
            .await
            .inspect_err(|e| info!(image = image_ref, error = %e, "failed to fetch attestations"))?;

        decode_statements(&verified)
    }

    #[allow(clippy::too_many_arguments)]
    async fn fetch_verified(
        &self,
        credentials: &CredentialContext,
        image_ref: &str,
        key: &[u8],
        repository: &str,
        kind: VerifierKind,
        claim_verifier: ClaimVerifier,
        tag_suffix: &str,
    ) -> VerifyResult<Vec<SignedPayload>> {
        let verifier = PublicVerifierKey::from_pem(key)?;
        let image = ImageRef::parse(image_ref)?;
        let signature_repository = resolve_signature_repository(&image, repository)?;

        let opts = CheckOpts {
            trust_roots: &self.trust_roots,
            verifier,
            kind,
            signature_repository,
            credentials,
            claim_verifier,
            tag_suffix,
        };

        verify(&self.source, &image, &opts)
            .await
            .map_err(|e| classify(image_ref, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attestation::COSIGN_CUSTOM_PROVENANCE_V01;
    use crate::client::artifact_tag;
    use crate::error::Outcome;
    use crate::test_support::*;
    use serde_json::{json, Value};

    const IMAGE: &str = "registry.example/app:v1";
    const REPO: &str = "registry.example/app";

    fn sig_tag() -> String {
        artifact_tag(IMAGE_DIGEST, SIGNATURE_TAG_SUFFIX)
    }

    fn att_tag() -> String {
        artifact_tag(IMAGE_DIGEST, ATTESTATION_TAG_SUFFIX)
    }

    fn signed_source(key: &p256::ecdsa::SigningKey, repository: &str) -> FakeSource {
        FakeSource::new(IMAGE_DIGEST).with_layers(
            repository,
            &sig_tag(),
            vec![signature_layer(key, simple_signing(IMAGE_DIGEST, Value::Null))],
        )
    }

    #[tokio::test]
    async fn test_verify_signature_returns_digest() {
        let key = signing_key();
        let cosign = Cosign::new(signed_source(&key, REPO));

        let digest = cosign
            .verify_signature(&CredentialContext::anonymous(), IMAGE, public_pem(&key).as_bytes(), "")
            .await
            .unwrap();

        assert_eq!(digest, IMAGE_DIGEST);
    }

    #[tokio::test]
    async fn test_verify_signature_other_key() {
        let signer = signing_key();
        let other = signing_key();
        let cosign = Cosign::new(signed_source(&signer, REPO));

        let err = cosign
            .verify_signature(&CredentialContext::anonymous(), IMAGE, public_pem(&other).as_bytes(), "")
            .await
            .unwrap_err();

        assert!(matches!(err, VerifyError::SignatureMismatch { .. }));
        assert_eq!(err.outcome(), Outcome::Mismatch);
    }

    #[tokio::test]
    async fn test_verify_signature_unsigned() {
        let key = signing_key();
        let cosign = Cosign::new(FakeSource::new(IMAGE_DIGEST));

        let err = cosign
            .verify_signature(&CredentialContext::anonymous(), IMAGE, public_pem(&key).as_bytes(), "")
            .await
            .unwrap_err();

        assert!(matches!(err, VerifyError::NotFound { .. }));
        assert_eq!(err.to_string(), format!("signature not found for {}", IMAGE));
    }

    #[tokio::test]
    async fn test_verify_signature_override_repository() {
        let key = signing_key();
        let cosign = Cosign::new(signed_source(&key, "sigs.example/team/signatures"));

        let digest = cosign
            .verify_signature(
                &CredentialContext::anonymous(),
                IMAGE,
                public_pem(&key).as_bytes(),
                "sigs.example/team/signatures",
            )
            .await
            .unwrap();

        assert_eq!(digest, IMAGE_DIGEST);
        assert_eq!(
            cosign.source.fetched(),
            vec![format!("sigs.example/team/signatures:{}", sig_tag())]
        );
    }

    #[tokio::test]
    async fn test_bad_inputs_fail_before_fetch() {
        let key = signing_key();
        let cosign = Cosign::new(signed_source(&key, REPO));
        let credentials = CredentialContext::anonymous();

        let err = cosign
            .verify_signature(&credentials, IMAGE, b"not a key", "")
            .await
            .unwrap_err();
        assert!(matches!(err, VerifyError::KeyDecode { .. }));

        let err = cosign
            .verify_signature(&credentials, "Registry.Example/APP:v1", public_pem(&key).as_bytes(), "")
            .await
            .unwrap_err();
        assert!(matches!(err, VerifyError::ImageRefParse { .. }));

        let err = cosign
            .verify_signature(&credentials, IMAGE, public_pem(&key).as_bytes(), "sigs.example/app:v1")
            .await
            .unwrap_err();
        assert!(matches!(err, VerifyError::RepositoryParse { .. }));

        assert!(cosign.source.fetched().is_empty());
    }

    #[tokio::test]
    async fn test_verify_signature_required_annotations() {
        let key = signing_key();
        let source = FakeSource::new(IMAGE_DIGEST).with_layers(
            REPO,
            &sig_tag(),
            vec![signature_layer(
                &key,
                simple_signing(IMAGE_DIGEST, json!({ "env": "prod" })),
            )],
        );
        let cosign = Cosign::new(source);
        let credentials = CredentialContext::anonymous();
        let pem = public_pem(&key);

        let ok = VerifySignatureOptions::default().with_annotation("env", "prod");
        assert!(cosign
            .verify_signature_with(&credentials, IMAGE, pem.as_bytes(), "", &ok)
            .await
            .is_ok());

        let wrong = VerifySignatureOptions::default().with_annotation("env", "dev");
        let err = cosign
            .verify_signature_with(&credentials, IMAGE, pem.as_bytes(), "", &wrong)
            .await
            .unwrap_err();
        assert_eq!(err.outcome(), Outcome::Mismatch);
    }

    #[tokio::test]
    async fn test_fetch_attestations_custom_provenance() {
        let key = signing_key();
        let stmt = statement(
            IMAGE_DIGEST,
            COSIGN_CUSTOM_PROVENANCE_V01,
            json!({ "Data": "{\"foo\":1}", "Timestamp": "2021-09-01T00:00:00Z" }),
        );
        let source = FakeSource::new(IMAGE_DIGEST).with_layers(
            REPO,
            &att_tag(),
            vec![attestation_layer(&key, &stmt)],
        );
        let cosign = Cosign::new(source);

        let statements = cosign
            .fetch_attestations(&CredentialContext::anonymous(), IMAGE, public_pem(&key).as_bytes(), "")
            .await
            .unwrap();

        assert_eq!(statements.len(), 1);
        assert_eq!(statements[0]["predicate"]["Data"], json!({ "foo": 1 }));
    }

    #[tokio::test]
    async fn test_fetch_attestations_not_found() {
        let key = signing_key();
        let cosign = Cosign::new(signed_source(&key, REPO));

        let err = cosign
            .fetch_attestations(&CredentialContext::anonymous(), IMAGE, public_pem(&key).as_bytes(), "")
            .await
            .unwrap_err();

        assert_eq!(err.outcome(), Outcome::NotFound);
    }

    #[tokio::test]
    async fn test_verify_signature_by_digest() {
        let key = signing_key();
        let cosign = Cosign::new(signed_source(&key, REPO));
        let image = format!("{}@{}", REPO, IMAGE_DIGEST);

        let digest = cosign
            .verify_signature(&CredentialContext::anonymous(), &image, public_pem(&key).as_bytes(), "")
            .await
            .unwrap();

        assert_eq!(digest, IMAGE_DIGEST);
    }
}

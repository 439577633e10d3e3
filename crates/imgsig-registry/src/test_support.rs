//! Fixtures shared by unit tests: signing keys, cosign layers and an
//! in-memory artifact source.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use p256::ecdsa::signature::Signer;
use p256::ecdsa::{Signature, SigningKey};
use pkcs8::{EncodePublicKey, LineEnding};
use serde_json::{json, Value};

use crate::client::ArtifactSource;
use crate::credentials::CredentialContext;
use crate::digest::{digest_hex, sha256_hex_bytes, SIMPLE_SIGNING_TYPE};
use crate::dsse::{build_pae, PAYLOAD_TYPE_IN_TOTO};
use crate::error::{RegistryError, RegistryResult};
use crate::keys::PublicVerifierKey;
use crate::reference::{ImageRef, Repository};
use crate::types::{SignatureLayer, SIGNATURE_ANNOTATION};

pub(crate) const IMAGE_DIGEST: &str =
    "sha256:4a1c4b21597c1b4415bdbecb28a3296c6b5e23ca4f9feeb599860a1dac6a0108";

pub(crate) fn signing_key() -> SigningKey {
    SigningKey::random(&mut rand::thread_rng())
}

pub(crate) fn public_pem(key: &SigningKey) -> String {
    key.verifying_key()
        .to_public_key_pem(LineEnding::LF)
        .unwrap()
}

pub(crate) fn verifier(key: &SigningKey) -> PublicVerifierKey {
    PublicVerifierKey::from_pem(public_pem(key).as_bytes()).unwrap()
}

fn sign_b64(key: &SigningKey, message: &[u8]) -> String {
    let signature: Signature = key.sign(message);
    BASE64.encode(signature.to_der().as_bytes())
}

/// Simple signing payload for `digest` with `optional` annotations.
pub(crate) fn simple_signing(digest: &str, optional: Value) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "critical": {
            "identity": { "docker-reference": "registry.example/app" },
            "image": { "docker-manifest-digest": digest },
            "type": SIMPLE_SIGNING_TYPE
        },
        "optional": optional
    }))
    .unwrap()
}

/// Signature layer whose annotation signs `payload` with `key`.
pub(crate) fn signature_layer(key: &SigningKey, payload: Vec<u8>) -> SignatureLayer {
    let mut annotations = BTreeMap::new();
    annotations.insert(SIGNATURE_ANNOTATION.to_string(), sign_b64(key, &payload));
    SignatureLayer {
        media_type: "application/vnd.dev.cosign.simplesigning.v1+json".to_string(),
        digest: sha256_hex_bytes(&payload),
        payload,
        annotations,
    }
}

/// In-toto statement about `digest`.
pub(crate) fn statement(digest: &str, predicate_type: &str, predicate: Value) -> Value {
    json!({
        "_type": "https://in-toto.io/Statement/v0.1",
        "predicateType": predicate_type,
        "subject": [
            { "name": "registry.example/app", "digest": { "sha256": digest_hex(digest) } }
        ],
        "predicate": predicate
    })
}

/// DSSE envelope bytes wrapping `statement`, signed with `key`.
pub(crate) fn envelope(key: &SigningKey, statement: &Value) -> Vec<u8> {
    let payload = serde_json::to_vec(statement).unwrap();
    let signature = sign_b64(key, &build_pae(PAYLOAD_TYPE_IN_TOTO, &payload));
    serde_json::to_vec(&json!({
        "payloadType": PAYLOAD_TYPE_IN_TOTO,
        "payload": BASE64.encode(&payload),
        "signatures": [ { "keyid": "", "sig": signature } ]
    }))
    .unwrap()
}

/// Attestation layer carrying a signed envelope around `statement`.
pub(crate) fn attestation_layer(key: &SigningKey, statement: &Value) -> SignatureLayer {
    let payload = envelope(key, statement);
    let mut annotations = BTreeMap::new();
    annotations.insert(SIGNATURE_ANNOTATION.to_string(), String::new());
    SignatureLayer {
        media_type: "application/vnd.dsse.envelope.v1+json".to_string(),
        digest: sha256_hex_bytes(&payload),
        payload,
        annotations,
    }
}

/// In-memory [`ArtifactSource`]: one image digest, artifacts keyed by
/// `<repository>:<tag>`.
#[derive(Debug)]
pub(crate) struct FakeSource {
    digest: String,
    artifacts: HashMap<String, RegistryResult<Vec<SignatureLayer>>>,
    fetched: Mutex<Vec<String>>,
}

impl FakeSource {
    pub(crate) fn new(digest: &str) -> Self {
        Self {
            digest: digest.to_string(),
            artifacts: HashMap::new(),
            fetched: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn with_layers(mut self, repository: &str, tag: &str, layers: Vec<SignatureLayer>) -> Self {
        self.artifacts
            .insert(format!("{}:{}", repository, tag), Ok(layers));
        self
    }

    pub(crate) fn with_error(mut self, repository: &str, tag: &str, err: RegistryError) -> Self {
        self.artifacts
            .insert(format!("{}:{}", repository, tag), Err(err));
        self
    }

    /// `<repository>:<tag>` of every artifact fetch, in order.
    pub(crate) fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl ArtifactSource for FakeSource {
    async fn resolve_digest(
        &self,
        image: &ImageRef,
        _credentials: &CredentialContext,
    ) -> RegistryResult<String> {
        Ok(image.digest().unwrap_or(&self.digest).to_string())
    }

    async fn fetch_layers(
        &self,
        repository: &Repository,
        tag: &str,
        _credentials: &CredentialContext,
    ) -> RegistryResult<Vec<SignatureLayer>> {
        let key = format!("{}:{}", repository, tag);
        self.fetched.lock().unwrap().push(key.clone());
        self.artifacts
            .get(&key)
            .cloned()
            .unwrap_or_else(|| {
                Err(RegistryError::Api {
                    code: "MANIFEST_UNKNOWN".to_string(),
                    message: "manifest unknown".to_string(),
                })
            })
    }
}

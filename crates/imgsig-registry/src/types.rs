//! Wire types for the OCI distribution API and cosign artifacts.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Annotation carrying the base64 signature of a cosign signature layer.
pub const SIGNATURE_ANNOTATION: &str = "dev.cosignproject.cosign/signature";

/// Media types accepted when requesting manifests.
pub const MANIFEST_ACCEPT: &str = "application/vnd.oci.image.manifest.v1+json, \
     application/vnd.docker.distribution.manifest.v2+json, \
     application/vnd.oci.image.index.v1+json, \
     application/vnd.docker.distribution.manifest.list.v2+json";

/// OCI image manifest (only the fields cosign artifacts use).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OciManifest {
    #[serde(rename = "schemaVersion")]
    pub schema_version: u32,

    #[serde(default, rename = "mediaType", skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Descriptor>,

    #[serde(default)]
    pub layers: Vec<Descriptor>,
}

/// Content descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Descriptor {
    #[serde(rename = "mediaType")]
    pub media_type: String,

    pub digest: String,

    pub size: u64,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

/// Error body returned by distribution API endpoints.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ApiErrors {
    #[serde(default)]
    pub errors: Vec<ApiErrorEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ApiErrorEntry {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

/// One layer of a cosign signature or attestation manifest, with its blob.
///
/// Nothing here has been verified yet.
#[derive(Debug, Clone)]
pub struct SignatureLayer {
    /// Layer media type.
    pub media_type: String,

    /// Layer digest as listed in the manifest.
    pub digest: String,

    /// Blob content.
    pub payload: Vec<u8>,

    /// Layer annotations.
    pub annotations: BTreeMap<String, String>,
}

impl SignatureLayer {
    /// Base64 signature annotation, if present and non-empty.
    pub fn signature(&self) -> Option<&str> {
        self.annotations
            .get(SIGNATURE_ANNOTATION)
            .map(String::as_str)
            .filter(|s| !s.is_empty())
    }
}

/// A payload whose signature validated against the supplied key.
///
/// Only the verifier constructs these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedPayload {
    payload: Vec<u8>,
    signature: String,
}

impl SignedPayload {
    pub(crate) fn new(payload: Vec<u8>, signature: String) -> Self {
        Self { payload, signature }
    }

    /// Verified payload bytes.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Base64 signature that validated the payload.
    pub fn signature(&self) -> &str {
        &self.signature
    }
}

/// DSSE envelope structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DsseEnvelope {
    /// Payload type (e.g., "application/vnd.in-toto+json").
    #[serde(rename = "payloadType")]
    pub payload_type: String,

    /// Base64-encoded payload.
    pub payload: String,

    /// Signatures.
    pub signatures: Vec<DsseSignature>,
}

/// DSSE signature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DsseSignature {
    /// Key ID (cosign leaves this empty).
    #[serde(rename = "keyid", default)]
    pub key_id: String,

    /// Base64-encoded signature.
    #[serde(rename = "sig")]
    pub signature: String,
}

/// Registry client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Registries reached over plain HTTP.
    #[serde(default)]
    pub insecure_registries: Vec<String>,

    /// Docker `config.json` used for credentials.
    #[serde(default)]
    pub docker_config: Option<std::path::PathBuf>,
}

fn default_timeout() -> u64 {
    30
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            insecure_registries: Vec::new(),
            docker_config: None,
        }
    }
}

impl RegistryConfig {
    /// Create config from environment variables.
    ///
    /// | Variable | Description |
    /// |----------|-------------|
    /// | `IMGSIG_REGISTRY_TIMEOUT` | Request timeout in seconds |
    /// | `IMGSIG_INSECURE_REGISTRIES` | Comma-separated plain HTTP registries |
    /// | `IMGSIG_DOCKER_CONFIG` | Docker config path for credentials |
    pub fn from_env() -> Self {
        Self {
            timeout_secs: std::env::var("IMGSIG_REGISTRY_TIMEOUT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_timeout),
            insecure_registries: std::env::var("IMGSIG_INSECURE_REGISTRIES")
                .map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),
            docker_config: std::env::var_os("IMGSIG_DOCKER_CONFIG").map(Into::into),
        }
    }

    /// Set the request timeout.
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Add a registry reached over plain HTTP.
    pub fn with_insecure_registry(mut self, registry: impl Into<String>) -> Self {
        self.insecure_registries.push(registry.into());
        self
    }

    /// Set the docker config path.
    pub fn with_docker_config(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.docker_config = Some(path.into());
        self
    }
}

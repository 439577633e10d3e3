//! OCI registry client for cosign artifacts.
//!
//! Public API: no status code knowledge. All HTTP/status mapping in http.rs.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::Method;
use tracing::debug;

use crate::credentials::{CredentialContext, RegistryAuth};
use crate::digest::sha256_hex_bytes;
use crate::error::{RegistryError, RegistryResult};
use crate::reference::{ImageRef, Repository};
use crate::types::{OciManifest, RegistryConfig, SignatureLayer, MANIFEST_ACCEPT};

mod helpers;
mod http;

pub use helpers::{artifact_tag, ATTESTATION_TAG_SUFFIX, SIGNATURE_TAG_SUFFIX};
use http::{HttpBackend, Resource};

const USER_AGENT_VALUE: &str = concat!("imgsig-registry/", env!("CARGO_PKG_VERSION"));
const DOCKER_CONTENT_DIGEST: &str = "docker-content-digest";

/// Where cosign artifacts are read from.
///
/// [`RegistryClient`] is the production implementation; tests substitute
/// in-memory sources.
#[async_trait]
pub trait ArtifactSource: Send + Sync {
    /// Resolve the manifest digest (`sha256:<hex>`) of `image`.
    async fn resolve_digest(
        &self,
        image: &ImageRef,
        credentials: &CredentialContext,
    ) -> RegistryResult<String>;

    /// Fetch the layers (with blobs) of the artifact manifest tagged `tag`
    /// in `repository`, in manifest order.
    async fn fetch_layers(
        &self,
        repository: &Repository,
        tag: &str,
        credentials: &CredentialContext,
    ) -> RegistryResult<Vec<SignatureLayer>>;
}

/// Registry client speaking the OCI distribution API.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    http: HttpBackend,
}

impl RegistryClient {
    pub fn new(config: RegistryConfig) -> RegistryResult<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(default_headers)
            .build()
            .map_err(|e| RegistryError::Network {
                message: format!("failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            http: HttpBackend { client, config },
        })
    }

    pub fn from_env() -> RegistryResult<Self> {
        Self::new(RegistryConfig::from_env())
    }

    /// Fetch a manifest by tag or digest. Returns the manifest and its digest.
    pub async fn fetch_manifest(
        &self,
        repository: &Repository,
        reference: &str,
        auth: &RegistryAuth,
    ) -> RegistryResult<(OciManifest, String)> {
        let url = self.manifest_url(repository, reference);
        debug!(url = %url, "fetching manifest");

        let response = self
            .http
            .request(
                Method::GET,
                &url,
                Some(MANIFEST_ACCEPT),
                repository,
                auth,
                Resource::Manifest,
            )
            .await?;

        let header_digest = content_digest(response.headers());
        let body = response.bytes().await.map_err(|e| RegistryError::Network {
            message: format!("failed to read manifest body: {}", e),
        })?;

        let computed = sha256_hex_bytes(&body);
        if reference.starts_with("sha256:") && computed != reference {
            return Err(RegistryError::InvalidResponse {
                message: format!(
                    "manifest digest mismatch: requested {}, got {}",
                    reference, computed
                ),
            });
        }
        if let Some(claimed) = &header_digest {
            if claimed != &computed {
                debug!(claimed = %claimed, computed = %computed, "registry digest header differs from body");
            }
        }

        let manifest: OciManifest =
            serde_json::from_slice(&body).map_err(|e| RegistryError::InvalidResponse {
                message: format!("failed to parse manifest: {}", e),
            })?;

        Ok((manifest, computed))
    }

    /// Fetch a blob and check it against `digest`.
    pub async fn fetch_blob(
        &self,
        repository: &Repository,
        digest: &str,
        auth: &RegistryAuth,
    ) -> RegistryResult<Vec<u8>> {
        let url = format!(
            "{}/v2/{}/blobs/{}",
            self.http.registry_url(repository),
            repository.path(),
            digest
        );
        debug!(url = %url, "fetching blob");

        let response = self
            .http
            .request(Method::GET, &url, None, repository, auth, Resource::Blob)
            .await?;

        let body = response.bytes().await.map_err(|e| RegistryError::Network {
            message: format!("failed to read blob body: {}", e),
        })?;

        let computed = sha256_hex_bytes(&body);
        if computed != digest {
            return Err(RegistryError::InvalidResponse {
                message: format!("blob digest mismatch: expected {}, got {}", digest, computed),
            });
        }

        Ok(body.to_vec())
    }

    fn manifest_url(&self, repository: &Repository, reference: &str) -> String {
        format!(
            "{}/v2/{}/manifests/{}",
            self.http.registry_url(repository),
            repository.path(),
            reference
        )
    }
}

#[async_trait]
impl ArtifactSource for RegistryClient {
    async fn resolve_digest(
        &self,
        image: &ImageRef,
        credentials: &CredentialContext,
    ) -> RegistryResult<String> {
        if let Some(digest) = image.digest() {
            return Ok(digest.to_string());
        }

        let repository = image.repository();
        let auth = credentials.auth_for(repository.registry());
        let url = self.manifest_url(repository, image.identifier());
        debug!(url = %url, "resolving image digest");

        let response = self
            .http
            .request(
                Method::HEAD,
                &url,
                Some(MANIFEST_ACCEPT),
                repository,
                &auth,
                Resource::Manifest,
            )
            .await?;

        if let Some(digest) = content_digest(response.headers()) {
            return Ok(digest);
        }

        // Registry did not report a digest on HEAD; hash the manifest body
        let (_, digest) = self
            .fetch_manifest(repository, image.identifier(), &auth)
            .await?;
        Ok(digest)
    }

    async fn fetch_layers(
        &self,
        repository: &Repository,
        tag: &str,
        credentials: &CredentialContext,
    ) -> RegistryResult<Vec<SignatureLayer>> {
        let auth = credentials.auth_for(repository.registry());
        let (manifest, _) = self.fetch_manifest(repository, tag, &auth).await?;

        let mut layers = Vec::with_capacity(manifest.layers.len());
        for descriptor in manifest.layers {
            let payload = self
                .fetch_blob(repository, &descriptor.digest, &auth)
                .await?;
            layers.push(SignatureLayer {
                media_type: descriptor.media_type,
                digest: descriptor.digest,
                payload,
                annotations: descriptor.annotations,
            });
        }

        Ok(layers)
    }
}

fn content_digest(headers: &HeaderMap) -> Option<String> {
    headers
        .get(DOCKER_CONTENT_DIGEST)
        .and_then(|v| v.to_str().ok())
        .filter(|v| v.starts_with("sha256:"))
        .map(String::from)
}

//! Cosign signature and attestation verification for OCI images.
//!
//! This crate checks that a container image carries a valid cosign signature
//! or in-toto attestation made with a given ECDSA (P-256 or P-384) public key:
//!
//! - Signature artifacts (`sha256-<hex>.sig`) verified over the simple signing
//!   payload, yielding the signed manifest digest
//! - Attestation artifacts (`sha256-<hex>.att`) verified as DSSE envelopes,
//!   yielding decoded in-toto statements
//! - Artifacts read from the image's repository or an override repository
//! - Failures classified as not found, mismatch or inconclusive
//!
//! # Quick Start
//!
//! ```no_run
//! use imgsig_registry::{Cosign, CredentialContext, Outcome};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let key = std::fs::read("cosign.pub")?;
//! let cosign = Cosign::from_env()?;
//! let credentials = CredentialContext::from_env()?;
//!
//! match cosign
//!     .verify_signature(&credentials, "registry.example/app:v1", &key, "")
//!     .await
//! {
//!     Ok(digest) => println!("signed: {}", digest),
//!     Err(e) if e.outcome() == Outcome::NotFound => println!("unsigned"),
//!     Err(e) => return Err(e.into()),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Authentication
//!
//! Registry credentials come from a [`CredentialContext`], built once and
//! shared by every call:
//!
//! - [`CredentialContext::from_env`] reads a docker `config.json`
//! - [`CredentialContext::initialize`] merges image pull secrets resolved by a
//!   [`SecretSource`]
//!
//! # Configuration
//!
//! | Environment Variable | Description |
//! |---------------------|-------------|
//! | `IMGSIG_REGISTRY_TIMEOUT` | Request timeout in seconds (default: 30) |
//! | `IMGSIG_INSECURE_REGISTRIES` | Comma-separated registries reached over plain HTTP |
//! | `IMGSIG_DOCKER_CONFIG` | Docker `config.json` used for credentials |
//! | `DOCKER_CONFIG` | Directory of the default docker `config.json` |

pub mod attestation;
pub mod client;
pub mod cosign;
pub mod credentials;
mod digest;
mod dsse;
pub mod error;
pub mod keys;
pub mod reference;
pub mod resolver;
pub mod trust;
pub mod types;
pub mod verify;

#[cfg(test)]
mod test_support;

// Re-export main types
pub use attestation::{
    decode_statement, decode_statements, DecodedStatement, Predicate, Statement, Subject,
    COSIGN_CUSTOM_PROVENANCE_V01,
};
pub use client::{
    artifact_tag, ArtifactSource, RegistryClient, ATTESTATION_TAG_SUFFIX, SIGNATURE_TAG_SUFFIX,
};
pub use cosign::{Cosign, VerifySignatureOptions};
pub use credentials::{
    AnonymousKeychain, CredentialContext, DockerConfigKeychain, Keychain, KeychainOptions,
    RegistryAuth, SecretSource,
};
pub use digest::{extract_digest, SIMPLE_SIGNING_TYPE};
pub use dsse::PAYLOAD_TYPE_IN_TOTO;
pub use error::{classify, Outcome, RegistryError, RegistryResult, VerifyError, VerifyResult};
pub use keys::PublicVerifierKey;
pub use reference::{ImageRef, Repository};
pub use resolver::resolve_signature_repository;
pub use trust::TrustRoots;
pub use types::{
    Descriptor, DsseEnvelope, DsseSignature, OciManifest, RegistryConfig, SignatureLayer,
    SignedPayload, SIGNATURE_ANNOTATION,
};
pub use verify::{verify, CheckOpts, ClaimVerifier, VerifierKind};

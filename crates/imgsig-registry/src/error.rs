//! Error types for signature and attestation verification.
//!
//! Two layers:
//! - [`RegistryError`] describes what went wrong talking to a registry or
//!   checking an artifact. Its message text is what the failure table matches.
//! - [`VerifyError`] is the taxonomy callers see. [`VerifyError::outcome`]
//!   collapses it to the three-way split policy code relies on.

/// Errors returned to callers of the verification API.
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    /// The public key bytes are not a usable PEM EC key.
    #[error("failed to decode PEM public key: {reason}")]
    KeyDecode { reason: String },

    /// The image reference could not be parsed.
    #[error("failed to parse image reference {reference}: {reason}")]
    ImageRefParse { reference: String, reason: String },

    /// The signature repository override could not be parsed.
    #[error("failed to parse signature repository {repository}: {reason}")]
    RepositoryParse { repository: String, reason: String },

    /// No signature or attestation artifact exists for the image.
    #[error("signature not found for {reference}")]
    NotFound { reference: String },

    /// Artifacts exist but none validates against the supplied key.
    #[error("signature mismatch for {reference}")]
    SignatureMismatch { reference: String },

    /// Any other transport or verification failure.
    #[error("verification failed for {reference}: {source}")]
    Verification {
        reference: String,
        #[source]
        source: RegistryError,
    },

    /// A verified attestation payload is not a DSSE envelope with a payload field.
    #[error("failed to decode attestation envelope: {reason}")]
    PayloadDecode { reason: String },

    /// The DSSE payload is not a base64-encoded in-toto statement.
    #[error("failed to decode in-toto statement: {reason}")]
    StatementDecode { reason: String },

    /// A cosign custom provenance predicate has no `Data` field.
    #[error("missing predicate data in {predicate_type}")]
    MissingPredicateData { predicate_type: String },

    /// No verified payload carries a cosign image digest claim.
    #[error("digest not found for {reference}")]
    DigestNotFound { reference: String },

    /// A verified signature payload is not valid JSON.
    #[error("malformed signature payload for {reference}: {reason}")]
    MalformedPayload { reference: String, reason: String },

    /// Configuration error (credentials, client construction).
    #[error("configuration error: {message}")]
    Config { message: String },
}

/// The caller-facing classification of a failed verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// No signature or attestation was found ("unsigned").
    NotFound,
    /// Something is signed, but not by the supplied key.
    Mismatch,
    /// Inconclusive; callers fail closed.
    Failed,
}

impl VerifyError {
    /// Three-way split of the error for policy decisions.
    pub fn outcome(&self) -> Outcome {
        match self {
            Self::NotFound { .. } => Outcome::NotFound,
            Self::SignatureMismatch { .. } => Outcome::Mismatch,
            _ => Outcome::Failed,
        }
    }

    /// Exit code for CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NotFound { .. } => 1,
            Self::SignatureMismatch { .. } => 2,

            Self::Verification { .. }
            | Self::PayloadDecode { .. }
            | Self::StatementDecode { .. }
            | Self::MissingPredicateData { .. }
            | Self::DigestNotFound { .. }
            | Self::MalformedPayload { .. } => 3,

            // Bad input or setup
            Self::KeyDecode { .. }
            | Self::ImageRefParse { .. }
            | Self::RepositoryParse { .. }
            | Self::Config { .. } => 4,
        }
    }
}

impl VerifyError {
    /// A caller-imposed deadline expired while verifying `reference`.
    pub fn deadline(reference: impl Into<String>) -> Self {
        Self::Verification {
            reference: reference.into(),
            source: RegistryError::Network {
                message: "deadline exceeded".to_string(),
            },
        }
    }
}

/// Bare `?` conversion; prefer [`VerifyError::deadline`] when the reference is at hand.
impl From<tokio::time::error::Elapsed> for VerifyError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Self::deadline("unknown")
    }
}

/// Registry and artifact-level errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RegistryError {
    /// The registry answered with a distribution API error (4xx with an
    /// `errors` body, or a bare 404).
    #[error("{code}: {message}")]
    Api { code: String, message: String },

    /// Authentication failed or a token could not be obtained.
    #[error("unauthorized: {message}")]
    Unauthorized { message: String },

    /// Artifacts were found but none passed verification.
    #[error("no matching signatures: {reason}")]
    NoMatchingSignatures { reason: String },

    /// Network error.
    #[error("network error: {message}")]
    Network { message: String },

    /// Invalid response from registry.
    #[error("invalid response: {message}")]
    InvalidResponse { message: String },
}

impl From<reqwest::Error> for RegistryError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network {
            message: err.to_string(),
        }
    }
}

/// How a registry failure is reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FailureKind {
    NotFound,
    Mismatch,
}

/// Substrings of a registry failure that identify its kind. First match wins;
/// anything unmatched is a generic verification failure.
const FAILURE_TABLE: &[(&str, FailureKind)] = &[
    ("MANIFEST_UNKNOWN", FailureKind::NotFound),
    ("manifest unknown", FailureKind::NotFound),
    ("NAME_UNKNOWN", FailureKind::NotFound),
    ("no matching signatures", FailureKind::Mismatch),
];

pub(crate) fn classify_message(message: &str) -> Option<FailureKind> {
    FAILURE_TABLE
        .iter()
        .find(|(needle, _)| message.contains(needle))
        .map(|(_, kind)| *kind)
}

/// Map a registry failure for `reference` into the caller taxonomy.
///
/// `NoMatchingSignatures` is a mismatch whatever its reason text says.
pub fn classify(reference: &str, err: RegistryError) -> VerifyError {
    let kind = match &err {
        RegistryError::NoMatchingSignatures { .. } => Some(FailureKind::Mismatch),
        other => classify_message(&other.to_string()),
    };
    match kind {
        Some(FailureKind::NotFound) => VerifyError::NotFound {
            reference: reference.to_string(),
        },
        Some(FailureKind::Mismatch) => VerifyError::SignatureMismatch {
            reference: reference.to_string(),
        },
        None => VerifyError::Verification {
            reference: reference.to_string(),
            source: err,
        },
    }
}

/// Result type for verification operations.
pub type VerifyResult<T> = Result<T, VerifyError>;

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

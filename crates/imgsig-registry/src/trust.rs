//! Trust root pool.
//!
//! Certificate authorities accepted for certificate-based signatures. The pool
//! is resolved by the caller (e.g. Fulcio roots shipped with the deployment)
//! and handed to the verifier as-is. Raw-key verification does not consult it.

use crate::error::{VerifyError, VerifyResult};

const CERTIFICATE_TAG: &str = "CERTIFICATE";

/// Pre-resolved pool of root certificates (DER).
#[derive(Debug, Clone, Default)]
pub struct TrustRoots {
    certificates: Vec<Vec<u8>>,
}

impl TrustRoots {
    /// An empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every `CERTIFICATE` block from a PEM bundle.
    ///
    /// Other PEM blocks are ignored. A bundle with no certificates is an error.
    pub fn from_pem_bundle(bundle: &[u8]) -> VerifyResult<Self> {
        let blocks = pem::parse_many(bundle).map_err(|e| VerifyError::Config {
            message: format!("invalid trust root bundle: {}", e),
        })?;

        let certificates: Vec<Vec<u8>> = blocks
            .into_iter()
            .filter(|block| block.tag() == CERTIFICATE_TAG)
            .map(|block| block.into_contents())
            .collect();

        if certificates.is_empty() {
            return Err(VerifyError::Config {
                message: "trust root bundle contains no certificates".to_string(),
            });
        }

        Ok(Self { certificates })
    }

    /// DER-encoded root certificates.
    pub fn certificates(&self) -> &[Vec<u8>] {
        &self.certificates
    }

    pub fn len(&self) -> usize {
        self.certificates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.certificates.is_empty()
    }
}

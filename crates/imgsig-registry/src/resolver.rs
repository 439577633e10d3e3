//! Signature repository resolution.
//!
//! Signatures and attestations normally live next to the image. Deployments
//! that keep them elsewhere pass an override repository, which always wins.

use tracing::debug;

use crate::error::VerifyResult;
use crate::reference::{ImageRef, Repository};

/// Repository holding the signature/attestation artifacts for `image`.
///
/// An empty (or whitespace-only) `override_repository` means "use the image's
/// own repository".
pub fn resolve_signature_repository(
    image: &ImageRef,
    override_repository: &str,
) -> VerifyResult<Repository> {
    if override_repository.trim().is_empty() {
        return Ok(image.repository().clone());
    }

    let repository = Repository::parse(override_repository)?;
    debug!(
        image = %image,
        signature_repository = %repository,
        "using signature repository override"
    );
    Ok(repository)
}

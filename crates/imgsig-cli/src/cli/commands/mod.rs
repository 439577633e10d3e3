pub mod attestations;
pub mod dispatch;
pub mod verify;

pub use dispatch::dispatch;

use anyhow::{Context, Result};
use imgsig_registry::{Cosign, CredentialContext, TrustRoots, VerifyError};

use super::args::{RegistryArgs, TargetArgs};
use crate::exit_codes;

/// Registry client, credentials and key bytes for one command.
pub(crate) struct Session {
    pub cosign: Cosign,
    pub credentials: CredentialContext,
    pub key: Vec<u8>,
}

impl Session {
    pub(crate) fn open(registry: &RegistryArgs, target: &TargetArgs) -> Result<Self> {
        let key = std::fs::read(&target.key)
            .with_context(|| format!("failed to read public key: {}", target.key.display()))?;

        let config = registry.to_config();
        let credentials =
            CredentialContext::from_config(&config).context("failed to load registry credentials")?;
        let mut cosign = Cosign::from_config(config).context("failed to create registry client")?;

        if let Some(path) = &target.trust_roots {
            let bundle = std::fs::read(path)
                .with_context(|| format!("failed to read trust roots: {}", path.display()))?;
            cosign = cosign.with_trust_roots(TrustRoots::from_pem_bundle(&bundle)?);
        }

        Ok(Self {
            cosign,
            credentials,
            key,
        })
    }
}

/// Map a command failure to an exit code, printing it unless quiet.
pub(crate) fn failure_code(err: &anyhow::Error, quiet: bool) -> i32 {
    if !quiet {
        eprintln!("error: {err:#}");
    }
    match err.downcast_ref::<VerifyError>() {
        Some(verify_err) => verify_err.exit_code(),
        None => exit_codes::INPUT_ERROR,
    }
}

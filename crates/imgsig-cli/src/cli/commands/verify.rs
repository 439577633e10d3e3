//! `imgsig verify` - Verify an image signature.

use anyhow::Result;

use imgsig_registry::VerifySignatureOptions;

use super::{failure_code, Session};
use crate::cli::args::{RegistryArgs, VerifyArgs};
use crate::exit_codes::SUCCESS;

pub async fn cmd_verify(registry: &RegistryArgs, args: VerifyArgs) -> i32 {
    match run_verify(registry, &args).await {
        Ok(digest) => {
            if !args.target.quiet {
                println!("{digest}");
            }
            SUCCESS
        }
        Err(e) => failure_code(&e, args.target.quiet),
    }
}

async fn run_verify(registry: &RegistryArgs, args: &VerifyArgs) -> Result<String> {
    let session = Session::open(registry, &args.target)?;

    let options = args
        .annotations
        .iter()
        .fold(VerifySignatureOptions::default(), |options, (key, value)| {
            options.with_annotation(key, value)
        });

    let digest = session
        .cosign
        .verify_signature_with(
            &session.credentials,
            &args.target.image,
            &session.key,
            &args.target.repository,
            &options,
        )
        .await?;

    tracing::info!(image = %args.target.image, digest = %digest, "signature verified");
    Ok(digest)
}

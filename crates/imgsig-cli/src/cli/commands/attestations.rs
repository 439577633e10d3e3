//! `imgsig attestations` - Verify and print image attestations.

use anyhow::{Context, Result};
use serde_json::Value;

use imgsig_registry::DecodedStatement;

use super::{failure_code, Session};
use crate::cli::args::{AttestationsArgs, RegistryArgs};
use crate::exit_codes::SUCCESS;

pub async fn cmd_attestations(registry: &RegistryArgs, args: AttestationsArgs) -> i32 {
    match run_attestations(registry, &args).await {
        Ok(output) => {
            if !args.target.quiet {
                println!("{output}");
            }
            SUCCESS
        }
        Err(e) => failure_code(&e, args.target.quiet),
    }
}

async fn run_attestations(registry: &RegistryArgs, args: &AttestationsArgs) -> Result<String> {
    let session = Session::open(registry, &args.target)?;

    let statements = session
        .cosign
        .fetch_attestations(
            &session.credentials,
            &args.target.image,
            &session.key,
            &args.target.repository,
        )
        .await?;

    let selected = filter_predicate_type(statements, args.predicate_type.as_deref());
    tracing::info!(
        image = %args.target.image,
        statements = selected.len(),
        "attestations verified"
    );

    serde_json::to_string_pretty(&selected).context("failed to serialize statements")
}

fn filter_predicate_type(
    statements: Vec<DecodedStatement>,
    predicate_type: Option<&str>,
) -> Vec<DecodedStatement> {
    match predicate_type {
        None => statements,
        Some(wanted) => statements
            .into_iter()
            .filter(|s| s.get("predicateType").and_then(Value::as_str) == Some(wanted))
            .collect(),
    }
}

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use imgsig_registry::RegistryConfig;

#[derive(Parser, Debug)]
#[command(
    name = "imgsig",
    version,
    about = "Verify cosign signatures and in-toto attestations of container images"
)]
pub struct Cli {
    #[command(flatten)]
    pub registry: RegistryArgs,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Verify an image signature and print the signed digest
    Verify(VerifyArgs),
    /// Verify image attestations and print the decoded statements
    Attestations(AttestationsArgs),
    Version,
}

/// Registry access shared by all commands.
#[derive(Args, Debug, Clone, Default)]
pub struct RegistryArgs {
    /// Docker config.json with registry credentials
    #[arg(long, global = true, env = "IMGSIG_DOCKER_CONFIG")]
    pub docker_config: Option<PathBuf>,

    /// Registry request timeout in seconds
    #[arg(long, global = true, env = "IMGSIG_REGISTRY_TIMEOUT", default_value_t = 30)]
    pub timeout: u64,

    /// Registry reached over plain HTTP (repeatable)
    #[arg(
        long = "insecure-registry",
        global = true,
        env = "IMGSIG_INSECURE_REGISTRIES",
        value_delimiter = ','
    )]
    pub insecure_registries: Vec<String>,
}

impl RegistryArgs {
    pub fn to_config(&self) -> RegistryConfig {
        let mut config = RegistryConfig::default().with_timeout_secs(self.timeout);
        for registry in &self.insecure_registries {
            config = config.with_insecure_registry(registry.clone());
        }
        if let Some(path) = &self.docker_config {
            config = config.with_docker_config(path.clone());
        }
        config
    }
}

/// Image, key and signature location shared by both checks.
#[derive(Args, Debug, Clone)]
pub struct TargetArgs {
    /// Image reference (host/repo[:tag|@digest])
    pub image: String,

    /// Public key file (PEM, ECDSA P-256 or P-384)
    #[arg(long)]
    pub key: PathBuf,

    /// PEM bundle of trusted root certificates
    #[arg(long)]
    pub trust_roots: Option<PathBuf>,

    /// Repository holding signatures, if not the image's own
    #[arg(long, env = "IMGSIG_SIGNATURE_REPOSITORY", default_value = "")]
    pub repository: String,

    /// Quiet mode - only exit code, no output
    #[arg(long, short)]
    pub quiet: bool,
}

#[derive(Args, Debug, Clone)]
pub struct VerifyArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Required annotation in the signed payload (key=value, repeatable)
    #[arg(long = "annotation", short = 'a', value_parser = parse_annotation)]
    pub annotations: Vec<(String, String)>,
}

#[derive(Args, Debug, Clone)]
pub struct AttestationsArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Only print statements with this predicate type
    #[arg(long)]
    pub predicate_type: Option<String>,
}

fn parse_annotation(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected key=value, got '{}'", s)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_parse_verify() {
        let cli = Cli::try_parse_from([
            "imgsig",
            "verify",
            "registry.example/app:v1",
            "--key",
            "cosign.pub",
            "-a",
            "env=prod",
            "--insecure-registry",
            "localhost:5000",
        ])
        .unwrap();

        match cli.cmd {
            Command::Verify(args) => {
                assert_eq!(args.target.image, "registry.example/app:v1");
                assert_eq!(args.target.key, PathBuf::from("cosign.pub"));
                assert_eq!(
                    args.annotations,
                    vec![("env".to_string(), "prod".to_string())]
                );
            }
            other => panic!("expected verify, got {other:?}"),
        }
        assert_eq!(cli.registry.insecure_registries, vec!["localhost:5000"]);
    }

    #[test]
    fn test_parse_attestations() {
        let cli = Cli::try_parse_from([
            "imgsig",
            "attestations",
            "registry.example/app:v1",
            "--key",
            "cosign.pub",
            "--predicate-type",
            "https://slsa.dev/provenance/v0.2",
            "--repository",
            "registry.example/sigs",
        ])
        .unwrap();

        match cli.cmd {
            Command::Attestations(args) => {
                assert_eq!(args.target.repository, "registry.example/sigs");
                assert_eq!(
                    args.predicate_type.as_deref(),
                    Some("https://slsa.dev/provenance/v0.2")
                );
            }
            other => panic!("expected attestations, got {other:?}"),
        }
    }

    #[test]
    fn test_bad_annotation_rejected() {
        let result = Cli::try_parse_from([
            "imgsig",
            "verify",
            "registry.example/app:v1",
            "--key",
            "cosign.pub",
            "-a",
            "=prod",
        ]);
        assert!(result.is_err());
        assert!(parse_annotation("novalue").is_err());
        assert_eq!(
            parse_annotation("a=b=c").unwrap(),
            ("a".to_string(), "b=c".to_string())
        );
    }

    #[test]
    #[serial]
    fn test_repository_from_env() {
        std::env::set_var("IMGSIG_SIGNATURE_REPOSITORY", "registry.example/signatures");
        let cli = Cli::try_parse_from(["imgsig", "verify", "app", "--key", "k.pub"]).unwrap();
        std::env::remove_var("IMGSIG_SIGNATURE_REPOSITORY");

        match cli.cmd {
            Command::Verify(args) => {
                assert_eq!(args.target.repository, "registry.example/signatures")
            }
            other => panic!("expected verify, got {other:?}"),
        }
    }

    #[test]
    #[serial]
    fn test_registry_config() {
        std::env::remove_var("IMGSIG_REGISTRY_TIMEOUT");
        let cli = Cli::try_parse_from([
            "imgsig",
            "--timeout",
            "5",
            "--docker-config",
            "/tmp/config.json",
            "version",
        ])
        .unwrap();

        let config = cli.registry.to_config();
        assert_eq!(config.timeout_secs, 5);
        assert_eq!(
            config.docker_config,
            Some(PathBuf::from("/tmp/config.json"))
        );
    }
}

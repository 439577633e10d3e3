use super::super::args::*;
use crate::exit_codes::SUCCESS;

pub async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    match cli.cmd {
        Command::Verify(args) => Ok(super::verify::cmd_verify(&cli.registry, args).await),
        Command::Attestations(args) => {
            Ok(super::attestations::cmd_attestations(&cli.registry, args).await)
        }
        Command::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(SUCCESS)
        }
    }
}

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::Instrument;
use ventus_cli::{Cli, ConsoleGate, Session};
use ventus_core::AttestError;
use ventus_crypto::SoftwareKeyStore;
use ventus_logging::{LogConfig, RunContextGuard, VentusSubscriberBuilder, run_span};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut log_config = if cli.pretty {
        LogConfig::development()
    } else {
        LogConfig::default()
    };
    log_config.level = cli.log_level.clone();
    log_config.console.level = None;
    let _log_guard = match VentusSubscriberBuilder::new().with_config(log_config).try_init() {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("warning: logging disabled: {e}");
            None
        }
    };

    match run(&cli).await {
        Ok(output) => {
            if !output.is_empty() {
                println!("{output}");
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            match err.downcast_ref::<AttestError>() {
                Some(attest) => eprintln!("error [{}]: {err:#}", attest.kind()),
                None => eprintln!("error: {err:#}"),
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &Cli) -> anyhow::Result<String> {
    let config = cli.attest_config()?;
    let store = Arc::new(SoftwareKeyStore::open(cli.key_dir.clone()));
    let gate = Arc::new(ConsoleGate::stdin().auto_grant(cli.command.pre_approved()));
    let session = Session::new(store, gate, &config)?;

    let _ctx = RunContextGuard::fresh(&config.key_tag);
    session.run(&cli.command).instrument(run_span()).await
}

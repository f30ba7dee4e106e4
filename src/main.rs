use clap::Parser;
use ssh_copy_id::{
    cli::Cli,
    core::{error::DeployError, logging::init_logging},
    deployment::{connection::SshConnector, deployment::Deployer, prompt::TerminalPrompt},
};
use std::process::ExitCode;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    // the signal branch is polled first so Ctrl-C is caught before any work starts
    let result = tokio::select! {
        biased;
        _ = tokio::signal::ctrl_c() => Err(anyhow::Error::from(DeployError::Interrupted)),
        result = run(cli) => result,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if matches!(e.downcast_ref::<DeployError>(), Some(DeployError::Interrupted)) => {
            println!("\nInterrupted");
            ExitCode::from(130)
        }
        Err(e) => {
            tracing::debug!(error = ?e, "Deployment failed");
            println!("ERROR: {}", e);
            ExitCode::from(1)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = cli.load_config()?;
    // key generation can take seconds; keep the runtime free for the signal
    let request = tokio::task::spawn_blocking(move || cli.to_request(&config)).await??;
    tracing::debug!(request = ?request, "Parsed deployment request");

    let deployer = Deployer::new(request);
    deployer
        .deploy_key(&SshConnector::new(), &mut TerminalPrompt)
        .await?;
    Ok(())
}

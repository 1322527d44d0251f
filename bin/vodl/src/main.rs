use clap::Parser;
use tokio_util::sync::CancellationToken;

mod commands;

#[derive(Parser, Clone)]
#[clap(version, author, about)]
struct VodlArgs {
    /// Debug output
    #[clap(long, global = true, alias = "debug")]
    verbose: bool,

    #[clap(subcommand)]
    command: commands::VodlCommand,
}

fn init_logger(verbose: bool) {
    let default = if verbose {
        tracing_subscriber::filter::LevelFilter::DEBUG
    } else {
        tracing_subscriber::filter::LevelFilter::INFO
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(default.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// First Ctrl-C cancels `token`, the second one exits immediately.
fn spawn_ctrlc_handler(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        tracing::info!("Ctrl-C received, stopping downloader.");
        token.cancel();

        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl-C received again, force exit.");
            std::process::exit(1);
        }
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = VodlArgs::parse();
    init_logger(args.verbose);

    let cancel = CancellationToken::new();
    spawn_ctrlc_handler(cancel.clone());

    args.command.run(cancel).await
}

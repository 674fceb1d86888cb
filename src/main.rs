//! `mockgate` - Scenario-routed HTTP mock server for end-to-end tests

use clap::Parser;

use mockgate::cli::args::Cli;
use mockgate::cli::commands;
use mockgate::error::ExitCode;
use mockgate::observability::init_logging;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if !cli.quiet {
        init_logging(cli.log_format, cli.verbose, cli.color);
    }

    // A second signal while the server drains forces an exit.
    tokio::spawn(async {
        wait_for_signal().await;
        eprintln!("\nShutting down gracefully... (press Ctrl+C again to force)");
        let code = wait_for_signal().await;
        std::process::exit(code);
    });

    let result = commands::dispatch(cli).await;

    match result {
        Ok(()) => std::process::exit(ExitCode::SUCCESS),
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(e.exit_code());
        }
    }
}

/// Waits for SIGINT or SIGTERM and returns the matching exit code.
async fn wait_for_signal() -> i32 {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
            return tokio::select! {
                _ = tokio::signal::ctrl_c() => ExitCode::INTERRUPTED,
                _ = sigterm.recv() => ExitCode::TERMINATED,
            };
        }
    }
    let _ = tokio::signal::ctrl_c().await;
    ExitCode::INTERRUPTED
}

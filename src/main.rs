use std::process::ExitCode;

use tracing_subscriber::EnvFilter;

use book_sync::config::Settings;
use book_sync::error::EXIT_CONFIG;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let s = match Settings::from_env() {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "invalid configuration");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    tracing::info!(
        pair = %s.pair,
        depth = s.depth,
        retention = ?s.retention,
        backend = ?s.storage_backend,
        "poll-and-sync starting"
    );

    match book_sync::run(&s).await {
        Ok(report) => {
            tracing::info!(
                key = %report.target.key,
                outcome = ?report.outcome,
                bids = report.bids,
                asks = report.asks,
                "run complete"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(
                class = e.class(),
                retriable = e.is_retriable(),
                error = %e,
                "run failed"
            );
            ExitCode::from(e.exit_code())
        }
    }
}

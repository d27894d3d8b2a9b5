use stepflow_worker::config::WorkerConfig;
use stepflow_worker::runner::CommandRunner;
use stepflow_worker::worker::PullWorker;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "stepflow_worker=debug".into());
    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    if json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    // --- Configuration ---
    let config = match WorkerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Invalid worker configuration");
            std::process::exit(1);
        }
    };
    tracing::info!(
        service_id = %config.service_id,
        pod_name = %config.pod_name,
        backend = %config.backend_url(),
        "Loaded worker configuration",
    );

    let Some(runner) = CommandRunner::new(
        &config.invocation_args,
        &config.working_dir,
        config.runner_timeout(),
    ) else {
        tracing::error!("INVOCATION_ARGS is empty");
        std::process::exit(1);
    };

    let mut worker = PullWorker::new(&config, runner);

    // --- Priming ---
    if let Err(e) = worker.prime().await {
        tracing::error!(error = %e, "Exiting, the service could not be primed");
        std::process::exit(1);
    }

    // --- Pull loop ---
    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            shutdown_signal().await;
            cancel.cancel();
        }
    });

    worker.run(cancel).await;
    tracing::info!("Worker exited");
}

/// Wait for SIGINT or SIGTERM. The in-flight item is allowed to finish.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received SIGINT, stopping after the current item"),
        () = terminate => tracing::info!("Received SIGTERM, stopping after the current item"),
    }
}

use approvals::{
    create_router, init_telemetry,
    registry::{catalog, SyncOptions},
    shutdown_telemetry,
    store::Store,
    AppState, Config,
};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = init_telemetry(&config) {
        eprintln!("Failed to install log subscriber: {e}");
    }

    info!(
        service = "approvals",
        version = env!("CARGO_PKG_VERSION"),
        environment = ?config.server.environment,
        "Starting server"
    );

    for issue in config.validate_for_production() {
        warn!(issue = %issue, "Configuration warning");
    }

    let registry = catalog::build().unwrap_or_else(|e| {
        error!(error = %e, "Schema declaration is invalid");
        std::process::exit(1);
    });

    info!(
        database = %config.database.redacted_url(),
        max_connections = config.database.max_connections,
        "Connecting to database"
    );

    let store = Store::connect(&config.database, registry).unwrap_or_else(|e| {
        error!(error = %e, "Failed to create database pool");
        std::process::exit(1);
    });

    let retry = config.retry.policy();
    if let Err(e) = store.run_with_retry(&retry, "startup.ping", |s| s.ping()).await {
        error!(error = %e, "Database unreachable");
        std::process::exit(1);
    }

    let options = SyncOptions {
        destructive: config.sync.destructive,
    };
    match store.run("startup.synchronize", move |s| s.synchronize(options)).await {
        Ok(plan) => info!(changes = plan.actions.len(), "Schema ready"),
        Err(e) => {
            error!(error = %e, "Schema synchronization failed");
            std::process::exit(1);
        }
    }

    let state = AppState::new(store, &config);
    let app = create_router(state, &config);

    let http_addr = config.server_addr();
    let listener = tokio::net::TcpListener::bind(&http_addr)
        .await
        .unwrap_or_else(|e| {
            error!(error = %e, address = %http_addr, "Failed to bind HTTP server");
            std::process::exit(1);
        });

    info!(
        http_address = %http_addr,
        docs_url = %format!("http://{}/swagger-ui", http_addr),
        "HTTP server ready"
    );

    let result = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await;

    if let Err(e) = result {
        error!(error = %e, "HTTP server error");
    }

    shutdown_telemetry();

    info!("Server shutdown complete");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for CTRL+C");
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
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("Shutdown signal received");
}

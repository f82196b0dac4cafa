use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use optipress_core::{
    create_event_sink, load_config, validate_config, ArtifactStore, BatchScheduler,
    ConversionMode, ConverterFactory, MediaLibrary, Optimizer, SinkEvent, SqliteStateStore,
    StateStore,
};

use optipress_server::api::create_router;
use optipress_server::state::AppState;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Buffer size for the event sink channel
const EVENT_BUFFER_SIZE: usize = 1000;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Determine config path
    let config_path = std::env::var("OPTIPRESS_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration
    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    info!("Configuration loaded successfully");
    info!("Media root: {:?}", config.media.root);
    info!("Database path: {:?}", config.database.path);
    info!("Conversion mode: {:?}", config.conversion.mode);

    // Create the state store
    let store: Arc<dyn StateStore> = Arc::new(
        SqliteStateStore::new(&config.database.path).context("Failed to open state store")?,
    );
    info!("State store initialized");

    // Create the event sink and spawn its writer task
    let (events, writer) = create_event_sink(EVENT_BUFFER_SIZE);
    let writer_handle = tokio::spawn(writer.run());

    events
        .emit(SinkEvent::ServiceStarted {
            version: VERSION.to_string(),
        })
        .await;

    // Converter candidates, probed lazily in priority order
    let factory = Arc::new(ConverterFactory::new(config.converter.clone()));

    let artifacts = ArtifactStore::new(&config.media.root, config.conversion.max_file_size);
    let optimizer = Arc::new(
        Optimizer::new(
            Arc::clone(&factory),
            artifacts,
            config.conversion.clone(),
            Arc::clone(&store),
        )
        .with_events(events.clone()),
    );

    // Batch scheduler: recover any interrupted run, then start ticking
    let scheduler = Arc::new(
        BatchScheduler::new(
            config.batch.clone(),
            MediaLibrary::new(&config.media.root),
            Arc::clone(&optimizer),
            Arc::clone(&store),
        )
        .with_events(events.clone()),
    );
    scheduler.recover().await;
    scheduler.spawn_tick_loop();
    info!("Batch scheduler started");

    if config.conversion.mode == ConversionMode::CliOnly {
        info!("Serving path will not convert on demand (cli_only mode)");
    }

    // Create app state and router
    let state = Arc::new(AppState::new(
        config.clone(),
        Arc::clone(&optimizer),
        Arc::clone(&scheduler),
        events.clone(),
    ));
    let app = create_router(Arc::clone(&state));

    // Start server
    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // Run server with graceful shutdown
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    // Stop the scheduler and flush queue state
    info!("Server shutting down...");
    scheduler.shutdown().await;

    // Drop all event handle holders so the writer's channel closes.
    drop(state);
    drop(scheduler);
    drop(optimizer);
    drop(events);

    // Wait for the writer to drain remaining events
    let _ = writer_handle.await;
    info!("Event writer stopped");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

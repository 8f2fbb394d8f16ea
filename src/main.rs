use axum::http::Method;
use clap::Parser;
use lendingdesk::config::{Cli, Config, default_config_dir, default_config_path};
use lendingdesk::library::Library;
use lendingdesk::store::Store;
use lendingdesk::{AppState, router};
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let args = Cli::parse();
    let _ = dotenvy::dotenv();

    // --config decides the data directory too; otherwise ~/.lendingdesk/
    let (config_path, data_dir) = match args.config_path {
        Some(path) => {
            let path = std::path::PathBuf::from(path);
            let dir = path
                .parent()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| std::path::PathBuf::from("."));
            (path, dir)
        }
        None => (default_config_path(), default_config_dir()),
    };

    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        eprintln!("failed to create data directory {:?}: {}", data_dir, e);
        std::process::exit(1);
    }

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    tracing::info!("lendingdesk.svc starting");

    let cfg = if config_path.exists() {
        Config::new(&config_path.to_string_lossy()).unwrap_or_else(|e| {
            tracing::error!(error = %e, path = ?config_path, "failed to load config file");
            std::process::exit(1);
        })
    } else {
        tracing::warn!(path = ?config_path, "config file not found, using defaults");
        Config::default()
    };

    let store = Store::new(&cfg, &data_dir).await.unwrap_or_else(|e| {
        tracing::error!(error = %e, "failed to setup store");
        std::process::exit(1);
    });
    tracing::info!(backend = store.kind(), max_loans = cfg.lending.max_loans, "store ready");

    let state = AppState::new(Library::new(store, cfg.lending.clone()));
    let address = format!("0.0.0.0:{}", cfg.app.get_port());

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers(Any);

    let app = router(state).layer(cors);

    let listener = tokio::net::TcpListener::bind(&address).await.unwrap_or_else(|e| {
        tracing::error!(error = %e, "failed to setup tcp listener");
        std::process::exit(1);
    });

    tracing::info!("lendingdesk.svc running on {}", &address);
    tokio::select! {
        result = axum::serve(listener, app) => {
            if let Err(err) = result {
                tracing::error!(error = %err, "server error");
                std::process::exit(1);
            }
        }
        _ = signal::ctrl_c() => {
            tracing::info!("ctrl+c signal received, shutting down");
        }
    }

    tracing::info!("lendingdesk.svc going off");
}

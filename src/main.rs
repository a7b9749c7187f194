use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use tokio::signal;
use tracing::{error, info, warn};

use bookstore_api as api;
use bookstore_api::repositories::{SeaOrmCartStore, SeaOrmCatalogStore, SeaOrmOrderStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = api::config::load_config().context("failed to load configuration")?;
    api::config::init_tracing(&cfg.log_level, cfg.log_json);

    // Gateways first: missing credentials must stop startup before anything binds
    let adapters = api::services::PaymentAdapters::from_config(&cfg.payments)
        .context("payment gateways are not configured")?;

    // Init DB
    let db_pool = api::db::establish_connection(&api::db::DbConfig::from(&cfg)).await?;
    if cfg.auto_migrate {
        api::db::run_migrations(&db_pool).await.map_err(|e| {
            error!("Failed running migrations: {}", e);
            e
        })?;
    }
    let db_arc = Arc::new(db_pool);

    // Init events
    let (event_sender, event_rx) = api::events::EventSender::channel(1024);
    tokio::spawn(api::events::process_events(event_rx));

    let auth_service = Arc::new(api::auth::AuthService::new(api::auth::AuthConfig::new(
        cfg.jwt_secret.clone(),
        cfg.jwt_issuer.clone(),
        Duration::from_secs(cfg.jwt_expiration_secs),
    )));

    // Aggregate app services used by HTTP handlers
    let services = api::handlers::AppServices::new(
        Arc::new(SeaOrmOrderStore::new(db_arc.clone())),
        Arc::new(SeaOrmCartStore::new(db_arc.clone())),
        Arc::new(SeaOrmCatalogStore::new(db_arc)),
        adapters,
        event_sender,
    );

    if cfg.cors_origins().is_empty() && !cfg.is_development() {
        warn!("No CORS origins configured; cross-origin requests will be refused");
    }

    let app_state = api::AppState {
        config: cfg.clone(),
        services,
        auth: auth_service,
    };
    let app = api::app_router(app_state);

    // Bind and serve
    let host: std::net::IpAddr = cfg
        .host
        .parse()
        .with_context(|| format!("invalid host address {}", cfg.host))?;
    let addr = SocketAddr::new(host, cfg.port);
    info!("bookstore-api listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("bookstore-api stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

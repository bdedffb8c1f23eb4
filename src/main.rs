use anyhow::Context;
use kpay_backend::api::{self, AppState};
use kpay_backend::config::AppConfig;
use kpay_backend::database::memory::InMemoryStore;
use kpay_backend::health::HealthChecker;
use kpay_backend::logging::init_tracing;
use kpay_backend::payments::factory::AggregatorFactory;
use kpay_backend::services::kwallet::{InMemoryLedger, KWalletLedger};
use kpay_backend::services::notification::NotificationService;
use kpay_backend::services::payment_service::{PaymentService, PaymentStores};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
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

    info!("Shutdown signal received, starting graceful shutdown");
}

#[cfg(feature = "database")]
async fn postgres_backend(
    config: &AppConfig,
    health: HealthChecker,
) -> anyhow::Result<(PaymentStores, Arc<dyn KWalletLedger>, HealthChecker)> {
    use kpay_backend::database::channel_repository::ChannelRepository;
    use kpay_backend::database::init_pool_from_config;
    use kpay_backend::database::payment_repository::PaymentRepository;
    use kpay_backend::services::kwallet::PgWalletLedger;

    let database = config
        .database
        .as_ref()
        .context("DATABASE_URL is required unless SKIP_EXTERNALS is set")?;
    let pool = init_pool_from_config(database).await?;
    info!(
        max_connections = pool.options().get_max_connections(),
        "Database connection pool initialized"
    );

    let payments = Arc::new(PaymentRepository::new(pool.clone()));
    let channels = Arc::new(ChannelRepository::new(pool.clone()));
    let stores = PaymentStores {
        channels: channels.clone(),
        payments: payments.clone(),
        transactions: payments,
        wallets: channels,
    };
    let ledger: Arc<dyn KWalletLedger> = Arc::new(PgWalletLedger::new(pool.clone()));
    Ok((stores, ledger, health.with_database(pool)))
}

#[cfg(not(feature = "database"))]
async fn postgres_backend(
    _config: &AppConfig,
    _health: HealthChecker,
) -> anyhow::Result<(PaymentStores, Arc<dyn KWalletLedger>, HealthChecker)> {
    anyhow::bail!("built without the database feature; set SKIP_EXTERNALS=true")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("failed to load configuration")?;
    init_tracing(&config.logging);
    config.validate().context("invalid configuration")?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        skip_externals = config.skip_externals,
        "Starting KPay backend service"
    );

    let aggregators = AggregatorFactory::with_config(&config.payments.aggregators)
        .context("failed to build payment aggregators")?;
    info!(aggregators = ?aggregators.list_available(), "Payment aggregators configured");
    let health = HealthChecker::new(aggregators.clone());

    let (stores, ledger, health) = if config.skip_externals {
        warn!("SKIP_EXTERNALS set, using in-memory stores");
        let store = Arc::new(InMemoryStore::new());
        let ledger: Arc<dyn KWalletLedger> = Arc::new(InMemoryLedger::new());
        (PaymentStores::in_memory(store), ledger, health)
    } else {
        postgres_backend(&config, health).await?
    };

    let notifications = Arc::new(NotificationService::new(
        aggregators.clone(),
        stores.payments.clone(),
    ));
    let payments = Arc::new(PaymentService::new(
        config.payments.service.clone(),
        aggregators,
        stores,
        ledger,
    ));

    let app = api::router(AppState {
        payments,
        notifications,
        health,
    });

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("invalid SERVER_HOST/SERVER_PORT")?;
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        error!("Failed to bind to address {}: {}", addr, e);
        e
    })?;
    info!(address = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

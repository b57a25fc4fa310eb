//! # tipline binary
//!
//! Assembles stores, services and the HTTP router from configuration.

use anyhow::Context;
use api_adapters::{router, AppState, Metrics, ProxyPolicy};
use auth_adapters::Argon2AdminVerifier;
use configs::{LogFormat, LoggingSettings, Settings, StorageSettings};
use domains::clock::SystemClock;
use domains::ports::{BanRepo, Clock, TipRepo};
use services::{
    spawn_sweepers, AdminService, BanManager, IdentityManager, PatternModerator, RateLimiter,
    SweepIntervals, TipService, TipServiceConfig, TipServiceDeps,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

type Stores = (Option<Arc<dyn TipRepo>>, Option<Arc<dyn BanRepo>>);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().context("failed to load settings")?;
    init_tracing(&settings.logging);

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let identity = {
        let key = settings.encryption_key()?;
        Arc::new(IdentityManager::new(&key)?)
    };

    let (tip_store, ban_store) = open_stores(&settings.storage).await;
    let write_timeout = settings.storage.write_timeout();

    let bans = BanManager::new(ban_store, clock.clone(), write_timeout);
    tokio::spawn({
        let bans = bans.clone();
        async move {
            bans.load_from_store().await;
        }
    });

    let rate_limiter = Arc::new(RateLimiter::new(settings.tips.per_hour, clock.clone()));
    let tips = Arc::new(TipService::new(
        TipServiceDeps {
            identity: identity.clone(),
            rate_limiter: rate_limiter.clone(),
            bans: bans.clone(),
            moderator: Arc::new(PatternModerator),
            store: tip_store,
            clock: clock.clone(),
        },
        TipServiceConfig {
            max_length: settings.tips.max_length,
            recent_capacity: settings.tips.recent_capacity,
            listing_limit: settings.tips.listing_limit,
            pending_batch: settings.tips.pending_batch,
            moderation_timeout: settings.moderation.timeout(),
            write_timeout,
            retain_submitter_address: settings.security.retain_submitter_address,
        },
    ));

    let verifier = Argon2AdminVerifier::new(settings.security.admin_password_hash)?;
    let admin = Arc::new(AdminService::new(
        Arc::new(verifier),
        identity,
        tips.clone(),
        bans.clone(),
    ));

    let sweepers = spawn_sweepers(
        rate_limiter,
        bans.clone(),
        SweepIntervals {
            rate_limit: settings.sweeps.rate_limit_interval(),
            bans: settings.sweeps.ban_interval(),
        },
    );

    let app = router(AppState {
        tips,
        admin,
        bans,
        metrics: Arc::new(Metrics::new()),
        clock,
        proxy: ProxyPolicy {
            trust_forwarded_headers: settings.server.trust_forwarded_headers,
        },
    });

    if !settings.server.trust_forwarded_headers {
        info!("forwarding headers ignored, callers are identified by socket address");
    }

    let listener = TcpListener::bind(&settings.server.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", settings.server.bind_addr))?;
    info!(address = %settings.server.bind_addr, "tipline listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    sweepers.abort_all();
    info!("tipline stopped");
    Ok(())
}

fn init_tracing(logging: &LoggingSettings) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.filter));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.pretty().init(),
    }
}

/// Without a database URL, or when it cannot be opened, the service runs
/// memory-only and reports the ban store as degraded.
async fn open_stores(storage: &StorageSettings) -> Stores {
    let Some(url) = storage.database_url.as_deref() else {
        warn!("no database configured, tips and bans are kept in memory only");
        return (None, None);
    };

    #[cfg(feature = "db-sqlite")]
    {
        use storage_adapters::sqlite::{connect, SqliteBanStore, SqliteTipStore};

        match connect(url).await {
            Ok(pool) => {
                let tips: Arc<dyn TipRepo> = Arc::new(SqliteTipStore::new(pool.clone()));
                let bans: Arc<dyn BanRepo> = Arc::new(SqliteBanStore::new(pool));
                (Some(tips), Some(bans))
            }
            Err(e) => {
                warn!(error = %e, "failed to open database, running memory-only");
                (None, None)
            }
        }
    }

    #[cfg(not(feature = "db-sqlite"))]
    {
        warn!(url, "built without db-sqlite, ignoring database_url");
        (None, None)
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("received Ctrl+C, shutting down"),
            Err(e) => {
                warn!(error = %e, "failed to install Ctrl+C handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("received terminate signal, shutting down");
            }
            Err(e) => {
                warn!(error = %e, "failed to install terminate handler");
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

use std::net::SocketAddr;
use std::sync::Arc;

use adoption_chat::{
    config::{get_config, init_config},
    database::pool::{create_pool, run_migrations},
    routes,
    services::notification_service::{OneSignalGateway, PushGateway},
    store::{
        AccountDirectory, ChatStore, MemoryAccountDirectory, MemoryChatStore, PgAccountDirectory,
        PgChatStore,
    },
    AppState,
};
use axum::extract::DefaultBodyLimit;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,adoption_chat=debug"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();
    init_config()?;
    let config = get_config();

    let (store, directory): (Arc<dyn ChatStore>, Arc<dyn AccountDirectory>) =
        match &config.database_url {
            Some(url) => {
                let pool = create_pool(url).await?;
                run_migrations(&pool).await?;
                info!("Using Postgres chat store");
                (
                    Arc::new(PgChatStore::new(pool.clone())),
                    Arc::new(PgAccountDirectory::new(pool)),
                )
            }
            None => {
                warn!("DATABASE_URL not set, chats are kept in memory only");
                (
                    Arc::new(MemoryChatStore::new()),
                    Arc::new(MemoryAccountDirectory::new()),
                )
            }
        };

    let gateway: Option<Arc<dyn PushGateway>> = match OneSignalGateway::from_config(&config.push)? {
        Some(gateway) => {
            info!("Push notifications enabled");
            Some(Arc::new(gateway))
        }
        None => {
            info!("Push gateway not configured, notifications disabled");
            None
        }
    };

    let app_state = AppState::new(
        store,
        directory,
        gateway,
        &config.jwt_secret,
        &config.push.site_url,
    );

    if let Some(path) = &config.accounts_seed_path {
        app_state.account_service.seed_from_file(path).await?;
    }

    let app = routes::router(app_state, config.public_rps)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(64 * 1024));

    let addr: SocketAddr = config.server_address.parse()?;
    info!("Server listening on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;

    Ok(())
}

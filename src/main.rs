use lox::{
    config::Config,
    http::{router, AppState},
    lock::LockManager,
    store::InMemoryStore,
    Result,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env()?;

    info!("loxd lock service starting...");
    info!("Bind address: {}", config.bind_addr);
    if config.token.is_some() {
        info!("Access token required");
    }

    let store = Arc::new(InMemoryStore::new());
    let manager = LockManager::new(store);

    let state = AppState {
        manager,
        token: config.token,
    };
    let app = router(state);

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .map_err(|e| lox::Error::Other(anyhow::anyhow!("Failed to bind: {e}")))?;

    info!("loxd listening on {}", config.bind_addr);
    info!("API endpoints:");
    info!("  POST   /lock          - Acquire one lease");
    info!("  POST   /locks         - Acquire leases on several keys, all or nothing");
    info!("  DELETE /lock/:lock_id - Release a lease");
    info!("  GET    /lock?key=...  - Advisory held-lease count");

    axum::serve(listener, app)
        .await
        .map_err(|e| lox::Error::Other(anyhow::anyhow!("Server error: {e}")))?;

    Ok(())
}

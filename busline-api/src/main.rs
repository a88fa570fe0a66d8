use std::sync::Arc;

use busline_api::{app, AppState};
use busline_store::{Config, DbClient, MemoryStore, PgStore};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "busline_api=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load()?;
    let capacity = config.notifications.channel_capacity;

    let state = match DbClient::from_config(&config.database).await? {
        Some(db) => {
            if config.database.run_migrations {
                db.migrate().await?;
            }
            tracing::info!("Using Postgres store");
            AppState::with_store(Arc::new(PgStore::from(&db)), &config.auth, capacity)
        }
        None => {
            tracing::warn!("No database url configured, using the in-memory store");
            AppState::with_store(Arc::new(MemoryStore::new()), &config.auth, capacity)
        }
    };

    if let Some(admin) = &config.bootstrap_admin {
        let admin = state
            .accounts
            .ensure_admin(&admin.email, &admin.password, &admin.user_name)
            .await?;
        tracing::info!(admin_id = admin.id, "bootstrap admin ready");
    }

    let addr = config.bind_address();
    tracing::info!("Starting Busline API on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app(state)).await?;
    Ok(())
}

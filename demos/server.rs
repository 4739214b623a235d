//! Example server: reads settings from the environment, picks PostgreSQL when
//! DATABASE_URL is set (memory otherwise), seeds the admin user and serves the API.

use sqlx::postgres::PgPoolOptions;
use store_api::{app, apply_migrations, ensure_database_exists, AppState, Settings, TokenService};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("store_api=info".parse()?))
        .init();
    let settings = Settings::from_env()?;

    let state = match &settings.database_url {
        Some(database_url) => {
            ensure_database_exists(database_url).await?;
            let pool = PgPoolOptions::new()
                .max_connections(settings.db_max_connections)
                .connect(database_url)
                .await?;
            apply_migrations(&pool).await?;
            AppState::postgres(pool)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory storage");
            AppState::memory()
        }
    };

    match &settings.admin {
        Some(admin) => {
            TokenService::ensure_user(&state, &admin.username, &admin.password).await?;
        }
        None => tracing::info!("ADMIN_USERNAME / ADMIN_PASSWORD not set, no user seeded"),
    }

    let listener = TcpListener::bind(settings.bind_addr).await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app(state)).await?;
    Ok(())
}

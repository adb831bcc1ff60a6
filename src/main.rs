use dotenv::dotenv;
use foodgram_backend::{config::settings::Settings, router, AppState};
use sqlx::postgres::PgPoolOptions;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("foodgram_backend=debug,tower_http=info")),
        )
        .init();

    let settings = Settings::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .connect(&settings.database_url)
        .await?;

    info!("database connected");

    sqlx::migrate!("./migrations").run(&pool).await?;

    info!("migrations applied");

    tokio::fs::create_dir_all(&settings.media_root).await?;

    let app = router(AppState {
        pool,
        settings: settings.clone(),
    });

    info!("Server running on http://localhost:{}", settings.port);

    let listener = tokio::net::TcpListener::bind(settings.addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

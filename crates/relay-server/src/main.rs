use relay_db::Database;
use relay_server::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "relay=debug,relay_server=debug,relay_gateway=debug,relay_db=info,tower_http=info".into()),
        )
        .init();

    let config = Config::from_env()?;

    // The store is opened once and handed to the server, which drops it on exit
    let store = Database::open(&config.db_path)?;

    relay_server::run(&config.host, config.port, store).await
}

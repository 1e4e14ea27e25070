use axum::serve;
use std::sync::Arc;
use termserver::api::routes::create_router;
use termserver::config::AppConfig;
use termserver::logic::{MemoryTooling, ToolingRegistry};
use termserver::seed;
use termserver::store::PostgresStore;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if it exists
    dotenvy::dotenv().ok();

    // Initialize logging with explicit filter to suppress sqlx debug logs
    use env_logger::Builder;
    use log::LevelFilter;

    Builder::new()
        .filter_level(LevelFilter::Info)
        .filter_module("sqlx", LevelFilter::Warn)
        .init();

    println!("Termserver: Terminology Content Server");

    // Load configuration
    let config = AppConfig::load()?;
    println!(
        "Configuration loaded: server={}:{}",
        config.server.host, config.server.port
    );

    println!("Connecting to PostgreSQL...");
    let database_url = config.database_url()?;
    let postgres_store = PostgresStore::new(&database_url).await?;

    println!("Running database migrations...");
    postgres_store.migrate().await?;
    println!("Database ready");

    let store = Arc::new(postgres_store);

    // Load seed data for demonstration (optional)
    if std::env::var("LOAD_SEED_DATA").unwrap_or_default() == "true" {
        println!("Loading seed data...");
        seed::load_seed_data(&*store).await?;
        println!("Seed data loaded successfully");
    }

    let mut toolings = ToolingRegistry::new();
    toolings.register(Arc::new(MemoryTooling::new("snomed")));

    let state = termserver::build_state(store, Arc::new(toolings), &config);
    let app = create_router().with_state(state);

    run_server(app, &config).await?;

    Ok(())
}

async fn run_server(app: axum::Router, config: &AppConfig) -> anyhow::Result<()> {
    let bind_address = config.server_address();
    let listener = TcpListener::bind(&bind_address).await?;
    println!("Termserver running on http://{}", bind_address);

    serve(listener, app).await?;

    Ok(())
}

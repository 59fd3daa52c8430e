use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use postfinance_gateway::adapters::PostgresTransactionStore;
use postfinance_gateway::cli::{self, Cli, Commands, DbCommands, TxCommands};
use postfinance_gateway::config::Config;
use postfinance_gateway::postfinance::PostFinanceClient;
use postfinance_gateway::{create_app, db, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args = Cli::parse();
    let config = Config::from_env()?;

    match args.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::Tx(TxCommands::Show { tx_id }) => {
            let pool = db::create_pool(&config).await?;
            let store = PostgresTransactionStore::new(pool);
            cli::handle_tx_show(&store, tx_id).await
        }
        Commands::Db(DbCommands::Migrate) => cli::handle_db_migrate(&config).await,
        Commands::Config => cli::handle_config_validate(&config).await,
    }
}

fn init_tracing() {
    let filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let json = std::env::var("LOG_FORMAT").map_or(false, |v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let pool = db::create_pool(&config).await?;
    db::run_migrations(&pool).await?;

    let processor = PostFinanceClient::new(&config.postfinance_api_url, config.credentials())?;
    tracing::info!(
        api_url = %config.postfinance_api_url,
        space_id = config.postfinance_space_id,
        "PostFinance client initialized"
    );

    let app_state = AppState {
        store: Arc::new(PostgresTransactionStore::new(pool)),
        processor: Arc::new(processor),
        return_urls: config.return_urls()?,
        poll: config.poll_settings(),
    };
    let app = create_app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    tracing::info!("listening on {}", addr);

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await?;

    Ok(())
}

use std::sync::Arc;

use axum::http::{HeaderValue, Method, header};
use board::{
    App,
    config::{Env, ServerConfig, StoreBackend},
    gateway::{Gateway, memory::MemoryGateway, postgres::PgGateway, rest::RestGateway},
    router, views,
};
use dotenv::dotenv;
use mimalloc::MiMalloc;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

const MAX_DB_CONNECTIONS: usize = 10;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    dotenv().ok();

    let env = Env::from_env();
    init_tracing(env);

    let config = ServerConfig::new_from_env();

    let gateway: Arc<dyn Gateway> = match &config.store {
        StoreBackend::Postgres { database_url } => {
            tracing::info!("Using the store's database directly");
            Arc::new(PgGateway::connect(
                database_url,
                MAX_DB_CONNECTIONS,
                config.store_timeout,
            )?)
        }
        StoreBackend::Rest { url, api_key } => {
            tracing::info!(%url, "Using the store's REST endpoint");
            Arc::new(RestGateway::new(url, api_key, config.store_timeout)?)
        }
        StoreBackend::Memory => {
            if config.env != Env::Dev {
                eyre::bail!("The in-memory store is only available in dev");
            }
            Arc::new(MemoryGateway::new())
        }
    };

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(
            config
                .cors_allowed_origins
                .iter()
                .filter_map(|o| HeaderValue::from_str(o).ok()),
        ))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true);

    let listen_addr = config.listen_addr;
    let app = App::new(config, gateway);
    views::start_refresh_loop(app.clone());

    let service = router(app)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    tracing::info!("Listening on {}", listen_addr);
    axum::serve(listener, service).await?;

    Ok(())
}

fn init_tracing(env: Env) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "board=debug,tower_http=info".into());

    let registry = tracing_subscriber::registry().with(filter);

    match env {
        Env::Dev => registry.with(tracing_subscriber::fmt::layer()).init(),
        Env::Staging | Env::Production => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

use axum::Router;
use axum::http::Method;
use dotenvy::dotenv;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors;
use velocity_relay::chain::ChainProvider;
use velocity_relay::config::Config;
use velocity_relay::util::SigDown;
use velocity_relay::{RelayLocal, handlers};
use velocity_types::chain::{ChainRegistry, FromConfig};

#[cfg(feature = "telemetry")]
use velocity_relay::util::Telemetry;

/// Starts the relay.
///
/// - Loads `.env` variables.
/// - Sets up logging and, if configured, OpenTelemetry export.
/// - Builds a provider for every configured chain.
/// - Serves the HTTP endpoints until SIGTERM or SIGINT.
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    rustls::crypto::CryptoProvider::install_default(rustls::crypto::ring::default_provider())
        .map_err(|_| "Failed to initialize rustls crypto provider")?;

    dotenv().ok();

    #[cfg(feature = "telemetry")]
    let telemetry = Telemetry::new()
        .with_name(env!("CARGO_PKG_NAME"))
        .with_version(env!("CARGO_PKG_VERSION"))
        .register();

    let config = Config::load()?;

    let chain_registry: ChainRegistry<ChainProvider> =
        ChainRegistry::from_config(config.chains()).await?;
    let relay = Arc::new(RelayLocal::new(chain_registry));

    let http_endpoints = Router::new().merge(handlers::routes().with_state(relay));
    #[cfg(feature = "telemetry")]
    let http_endpoints = http_endpoints.layer(telemetry.http_tracing());
    let http_endpoints = http_endpoints.layer(
        cors::CorsLayer::new()
            .allow_origin(cors::Any)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers(cors::Any),
    );

    let addr = SocketAddr::new(config.host(), config.port());
    #[cfg(feature = "telemetry")]
    tracing::info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await;
    #[cfg(feature = "telemetry")]
    let listener = listener.inspect_err(|e| tracing::error!("Failed to bind to {}: {}", addr, e));
    let listener = listener?;

    let sig_down = SigDown::try_new()?;
    axum::serve(listener, http_endpoints)
        .with_graceful_shutdown(async move { sig_down.recv().await })
        .await?;

    #[cfg(feature = "telemetry")]
    tracing::info!("Server stopped");

    Ok(())
}

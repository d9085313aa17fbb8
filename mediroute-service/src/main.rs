use mediroute_service::create_app;
use tokio::net::TcpListener;
use tracing::{info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use mediroute_core::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = Config::from_env()?;
    let port = config.listen_port;

    let app = create_app(config).await?;
    let listener = TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    let addr = listener.local_addr()?;

    info!("MediRoute service starting on {}", addr);
    info!("Health check endpoint: http://{}/health", addr);
    info!("Routing endpoint: POST http://{}/hospitals/severity-based", addr);
    info!("Classifier endpoint: POST http://{}/symptoms/classify", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

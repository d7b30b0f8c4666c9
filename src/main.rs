use screenlink_gateway::config::GatewayConfig;
use screenlink_gateway::GatewayServer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load configuration
    let config = if let Ok(path) = std::env::var("SLG_CONFIG_PATH") {
        GatewayConfig::from_toml(path)?
    } else {
        GatewayConfig::from_env()?
    };

    // Create and start server
    let server = GatewayServer::new(config)?;
    server.start().await?;

    Ok(())
}

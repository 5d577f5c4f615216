use std::sync::Arc;

use tracing::{error, info};
use warp::Filter;

mod api;
mod config;
mod error;
mod gemini;
mod metrics;
mod middleware;
mod models;
mod prompt;

use gemini::{GeminiClient, ModelConfig, ReportGenerator};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .json()
        .init();

    info!("Starting Radiology Report Service");

    // Load configuration
    let config = config::Config::from_env()?;
    info!("Configuration loaded: {:?}", config);

    // Built once; without a key every report request fails closed
    let generator: api::Generator = match config.gemini_api_key.as_deref() {
        None => {
            error!("GEMINI_API_KEY environment variable not set. Report generation is disabled");
            None
        }
        Some(api_key) => match GeminiClient::new(api_key, ModelConfig::default()) {
            Ok(client) => {
                let client = client.with_base_url(config.gemini_base_url.clone());
                info!("Gemini client configured with model: {}", client.config().model_name);
                Some(Arc::new(client) as Arc<dyn ReportGenerator>)
            }
            Err(e) => {
                error!("Failed to configure Gemini client: {}", e);
                None
            }
        },
    };

    let routes = api::routes(generator)
        .with(warp::log("api"))
        .with(middleware::cors());

    // Start server
    let addr = ([0, 0, 0, 0], config.port);
    info!("Server listening on {}", addr.1);

    warp::serve(routes).run(addr).await;

    Ok(())
}

mod config;
mod errors;
mod generation;
mod llm_client;
mod models;
mod normalize;
mod pipeline;
mod routes;
mod sanitize;
mod signals;
mod state;
mod validation;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::llm_client::budget::{CostGovernor, TokenBudget, Unlimited};
use crate::llm_client::LlmClient;
use crate::pipeline::store::InMemoryJobStore;
use crate::pipeline::Pipeline;
use crate::routes::build_router;
use crate::signals::cache::{DisabledSignalCache, RedisSignalCache, SignalCache};
use crate::state::AppState;

const CACHE_OP_TIMEOUT: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Tailor API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize LLM client
    let llm = LlmClient::new(config.anthropic_api_key.clone(), config.retry.clone())?;
    info!(
        "LLM client initialized (model: {}, {} attempts per call)",
        llm_client::MODEL,
        config.retry.max_attempts
    );

    // Initialize Signal Cache; Redis is optional
    let cache: Arc<dyn SignalCache> = match &config.redis_url {
        Some(url) => match RedisSignalCache::new(url, CACHE_OP_TIMEOUT) {
            Ok(cache) => {
                info!("Signal cache backed by Redis");
                Arc::new(cache)
            }
            Err(e) => {
                warn!("Invalid REDIS_URL, signal cache disabled: {e}");
                Arc::new(DisabledSignalCache)
            }
        },
        None => {
            info!("REDIS_URL not set, signal cache disabled");
            Arc::new(DisabledSignalCache)
        }
    };

    let governor: Arc<dyn CostGovernor> = match config.token_budget {
        Some(total) => {
            info!("Token budget: {total}");
            Arc::new(TokenBudget::new(total))
        }
        None => Arc::new(Unlimited),
    };

    let pipeline = Pipeline::new(
        Arc::new(llm),
        governor,
        cache,
        Arc::new(InMemoryJobStore::new()),
        config.pipeline.clone(),
    );
    info!(
        "Pipeline ready (confidence threshold {:.2}, deadline {:?})",
        config.pipeline.confidence_threshold, config.pipeline.deadline
    );

    let state = AppState {
        pipeline: Arc::new(pipeline),
    };

    let app = build_router(state).layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

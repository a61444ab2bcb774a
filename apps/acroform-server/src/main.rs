//! AcroForm Fill Server
//!
//! Serves one configured PDF template over HTTP. Provides REST API
//! endpoints for:
//!
//! - Filling the template from a flat field payload
//! - Filling it from a nested body through a declarative field map
//! - Listing the template's field names
//!
//! ## Architecture
//!
//! The template is read from disk on every request and all PDF work runs on
//! the blocking pool, so requests share nothing but the immutable
//! [`AppState`]. Rate limiting is applied per client IP via tower-governor.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use acroform_core::{FieldCatalog, FieldMap};
use anyhow::Context;
use axum::{
    routing::{get, post},
    Router,
};
use clap::Parser;
use tower::ServiceBuilder;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod api;
mod error;
#[cfg(test)]
mod tests;

use api::{handle_fill, handle_fill_mapped, handle_health, handle_list_fields};

/// Command-line arguments for the fill server
#[derive(Parser, Debug)]
#[command(name = "acroform-server")]
#[command(about = "HTTP server that fills and flattens a PDF form template")]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value = "3000")]
    port: u16,

    /// Host address to bind to
    #[arg(long, env = "ACROFORM_HOST", default_value = "0.0.0.0")]
    host: String,

    /// PDF template to fill
    #[arg(long, env = "ACROFORM_TEMPLATE")]
    template: PathBuf,

    /// JSON field map enabling /api/fill/mapped
    #[arg(long, env = "ACROFORM_FIELD_MAP")]
    field_map: Option<PathBuf>,

    /// Survey catalog used to dispatch by field kind
    #[arg(long, env = "ACROFORM_CATALOG")]
    catalog: Option<PathBuf>,

    /// Rate limit: requests per second per IP
    #[arg(long, default_value = "10")]
    rate_limit: u32,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Template path, re-read on each request
    pub template: PathBuf,
    pub field_map: Option<Arc<FieldMap>>,
    pub catalog: Option<Arc<FieldCatalog>>,
}

/// Build the router without rate limiting
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health check
        .route("/health", get(handle_health))
        // API endpoints
        .route("/api/fields", get(handle_list_fields))
        .route("/api/fill", post(handle_fill))
        .route("/api/fill/mapped", post(handle_fill_mapped))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting acroform server on {}:{}", args.host, args.port);

    let field_map = match &args.field_map {
        Some(path) => {
            let map = FieldMap::load(path)
                .with_context(|| format!("loading field map {}", path.display()))?;
            info!("Loaded field map with {} rules", map.rules().len());
            Some(Arc::new(map))
        }
        None => None,
    };

    let catalog = match &args.catalog {
        Some(path) => {
            let catalog = FieldCatalog::load(path)
                .with_context(|| format!("loading catalog {}", path.display()))?;
            info!("Loaded catalog with {} field names", catalog.len());
            Some(Arc::new(catalog))
        }
        None => None,
    };

    // Create rate limiter configuration
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(args.rate_limit.into())
            .burst_size(args.rate_limit * 2)
            .finish()
            .context("invalid rate limit")?,
    );

    let state = AppState {
        template: args.template.clone(),
        field_map,
        catalog,
    };

    let app = app(state).layer(GovernorLayer {
        config: governor_conf,
    });

    // Start server
    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("Server listening on http://{}", addr);
    info!("Template: {}", args.template.display());
    info!("Rate limit: {} requests/second per IP", args.rate_limit);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

mod args;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use args::Args;
use clap::Parser;
use navarch_auth::{ReviewedUser, TokenReviewer};
use navarch_client::{ClientFactory, ClientProvider, CredentialSelector, build_provider};
use navarch_config::{Config, Transport};
use navarch_mcp::{NavarchServer, ToolContext, ToolRegistry, toolsets};
use rmcp::ServiceExt;
use rmcp::transport::StreamableHttpService;
use rmcp::transport::stdio;
use rmcp::transport::streamable_http_server::StreamableHttpServerConfig;
use rmcp::transport::streamable_http_server::session::local::LocalSessionManager;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration; a missing file means defaults, since kubeconfig
    // discovery alone is enough to run.
    let mut config = if args.config.exists() {
        Config::load(&args.config)?
    } else {
        Config::default()
    };
    args.apply(&mut config);

    // Initialize telemetry
    let _telemetry_guard = navarch_telemetry::init(&config.logging, config.telemetry.as_ref())?;

    tracing::info!(
        config_path = %args.config.display(),
        "starting navarch"
    );

    // Build the cluster provider
    let selector = config.cluster.bearer_token.as_deref().map(CredentialSelector::bearer);
    let factory = ClientFactory::new(config.client.clone(), Duration::from_secs(config.discovery.ttl_secs))
        .with_selector(selector);
    let provider = build_provider(&config.cluster, factory).await?;

    let subject = review_startup_token(provider.as_ref(), config.cluster.bearer_token.as_deref()).await;
    warm_discovery(provider.as_ref()).await;

    let ctx = Arc::new(ToolContext::new(
        provider,
        config.rbac.required,
        config.rbac.cache_ttl_secs,
        subject,
        config.helm.clone(),
    ));
    let registry = Arc::new(toolsets::registry());

    match config.server.transport {
        Transport::Stdio => serve_stdio(ctx, registry).await?,
        Transport::StreamableHttp => {
            // Set up graceful shutdown
            let shutdown = CancellationToken::new();
            let shutdown_clone = shutdown.clone();

            tokio::spawn(async move {
                shutdown_signal().await;
                shutdown_clone.cancel();
            });

            serve_http(ctx, registry, config.server.listen, shutdown).await?;
        }
    }

    tracing::info!("navarch stopped");
    Ok(())
}

/// Resolve the configured bearer token to an identity via token review
///
/// The identity keys the authorization verdict cache. A failed review is
/// logged and the server runs unattributed; authorization itself still goes
/// through self-subject access reviews on the live credentials.
async fn review_startup_token(provider: &dyn ClientProvider, token: Option<&str>) -> Option<ReviewedUser> {
    let token = token?;
    let bundle = match provider.get_bundle(&provider.default_context()).await {
        Ok(bundle) => bundle,
        Err(error) => {
            tracing::warn!(%error, "token review skipped: default cluster unreachable");
            return None;
        }
    };
    match TokenReviewer::new(bundle.client()).review(token).await {
        Ok(user) => {
            tracing::info!(username = %user.username, "bearer token reviewed");
            Some(user)
        }
        Err(error) => {
            tracing::warn!(%error, "bearer token review failed");
            None
        }
    }
}

/// Prime the default cluster's discovery cache so the first tool listing
/// already reflects installed CRDs. An unreachable cluster is tolerated.
async fn warm_discovery(provider: &dyn ClientProvider) {
    match provider.with_context("").await {
        Ok(cluster) => {
            if let Err(error) = cluster.bundle.discovery().force_refresh().await {
                tracing::warn!(%error, "initial discovery refresh failed");
            }
        }
        Err(error) => {
            tracing::warn!(%error, "default cluster unavailable at startup");
        }
    }
}

/// Serve a single MCP client over stdin/stdout until the stream closes
async fn serve_stdio(ctx: Arc<ToolContext>, registry: Arc<ToolRegistry>) -> anyhow::Result<()> {
    tracing::info!("serving MCP over stdio");
    let service = NavarchServer::new(ctx, registry).serve(stdio()).await?;
    service.waiting().await?;
    Ok(())
}

/// Serve the MCP streamable-HTTP protocol until the shutdown token fires
async fn serve_http(
    ctx: Arc<ToolContext>,
    registry: Arc<ToolRegistry>,
    listen: SocketAddr,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let service = StreamableHttpService::new(
        move || Ok(NavarchServer::new(ctx.clone(), registry.clone())),
        LocalSessionManager::default().into(),
        StreamableHttpServerConfig::default(),
    );
    let router = axum::Router::new().nest_service("/mcp", service);

    let listener = tokio::net::TcpListener::bind(listen).await?;
    tracing::info!(%listen, "serving MCP over streamable HTTP");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    Ok(())
}

/// Wait for a shutdown signal (`SIGINT` or `SIGTERM`)
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    tracing::info!("shutdown signal received");
}

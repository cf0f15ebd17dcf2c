use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use opslens::argocd::ArgoClient;
use opslens::auth::StaticCredentialProvider;
use opslens::claude::ClaudeClient;
use opslens::config::Config;
use opslens::engine::Engine;
use opslens::gitlab::GitLabClient;
use opslens::kube::KubeClusterClient;
use opslens::server::{build_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config_path =
        std::env::var("OPSLENS_CONFIG").unwrap_or_else(|_| "config.yaml".to_string());
    let config = Config::load(&config_path).context("loading configuration")?;
    config.validate().context("validating configuration")?;

    let credentials = Arc::new(StaticCredentialProvider::from_config(&config));

    let cluster =
        Arc::new(KubeClusterClient::try_default().await.context("connecting to Kubernetes")?);
    let argocd = Arc::new(
        ArgoClient::new(&config.argocd, credentials.clone()).context("building Argo CD client")?,
    );
    let gitlab = Arc::new(
        GitLabClient::new(&config.gitlab, credentials.clone()).context("building GitLab client")?,
    );
    let claude = Arc::new(
        ClaudeClient::new(&config.claude, credentials.clone()).context("building Claude client")?,
    );

    let engine = Arc::new(Engine::new(
        cluster.clone(),
        argocd.clone(),
        gitlab.clone(),
        claude,
        config.server.max_context_size,
    ));

    let state = AppState {
        engine,
        cluster,
        argocd,
        gitlab,
        api_key: Arc::from(config.server.api_key.as_str()),
    };
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.address)
        .await
        .with_context(|| format!("binding {}", config.server.address))?;
    info!(address = %config.server.address, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await
        .context("serving HTTP")?;
    Ok(())
}

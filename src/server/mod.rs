//! HTTP surface over the engine.

pub mod routes;

use std::sync::Arc;

use axum::Router;

use crate::argocd::ArgoClient;
use crate::engine::Engine;
use crate::gitlab::GitLabClient;
use crate::kube::KubeClusterClient;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub cluster: Arc<KubeClusterClient>,
    pub argocd: Arc<ArgoClient>,
    pub gitlab: Arc<GitLabClient>,
    /// Bearer key required on non-health routes; empty disables the check.
    pub api_key: Arc<str>,
}

/// Build the router for the service.
pub fn build_router(state: AppState) -> Router {
    routes::router(state)
}

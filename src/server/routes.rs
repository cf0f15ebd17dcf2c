//! Route handlers and middleware.

use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde_json::json;
use tracing::{info, warn};

use crate::engine::{EngineRequest, EngineResponse};
use crate::error::Error;

use super::AppState;

pub fn router(state: AppState) -> Router {
    let secured = Router::new()
        .route("/api/v1/mcp", post(handle_engine_request))
        .route("/api/v1/mcp/resource", post(handle_resource))
        .route("/api/v1/mcp/change", post(handle_change))
        .route("/api/v1/mcp/troubleshoot", post(handle_troubleshoot))
        .route("/api/v1/namespaces", get(handle_namespaces))
        .layer(middleware::from_fn_with_state(state.clone(), require_api_key));

    Router::new()
        .route("/api/v1/health", get(handle_health))
        .merge(secured)
        .with_state(state)
}

/// Bearer-token gate. Disabled when no key is configured.
async fn require_api_key(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if state.api_key.is_empty() {
        return next.run(request).await;
    }

    let authorized = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token == state.api_key.as_ref())
        .unwrap_or(false);

    if !authorized {
        warn!("rejected request with missing or invalid API key");
        return (StatusCode::UNAUTHORIZED, Json(json!({"error": "invalid or missing API key"})))
            .into_response();
    }
    next.run(request).await
}

/// HTTP status for an engine error's wire code.
pub fn status_for(err: &Error) -> StatusCode {
    match err.wire_code() {
        "invalid_request" => StatusCode::BAD_REQUEST,
        "not_found" => StatusCode::NOT_FOUND,
        "upstream_auth" => StatusCode::BAD_GATEWAY,
        "upstream_unavailable" => StatusCode::BAD_GATEWAY,
        "llm_error" => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

async fn dispatch(state: &AppState, request: EngineRequest) -> Response {
    match state.engine.handle(request).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(err) => {
            warn!(error = %err, code = err.wire_code(), "engine request failed");
            (status_for(&err), Json(EngineResponse::failure(&err))).into_response()
        }
    }
}

/// Generic dispatch: the action tag in the body selects the flow.
async fn handle_engine_request(
    State(state): State<AppState>,
    Json(request): Json<EngineRequest>,
) -> Response {
    info!(action = request.action(), "received engine request");
    dispatch(&state, request).await
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResourceQuery {
    kind: String,
    name: String,
    #[serde(default)]
    namespace: String,
    #[serde(default)]
    query: String,
}

async fn handle_resource(State(state): State<AppState>, Json(body): Json<ResourceQuery>) -> Response {
    // Namespace queries get the namespace-wide analysis.
    let request = if body.kind.eq_ignore_ascii_case("namespace") {
        EngineRequest::AnalyzeNamespace { namespace: body.name }
    } else {
        EngineRequest::AnalyzeResource {
            kind: body.kind,
            name: body.name,
            namespace: body.namespace,
            query: body.query,
        }
    };
    dispatch(&state, request).await
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChangeQuery {
    project_id: String,
    #[serde(default)]
    commit_sha: Option<String>,
    #[serde(default)]
    merge_request_iid: Option<u64>,
    #[serde(default)]
    query: String,
}

async fn handle_change(State(state): State<AppState>, Json(body): Json<ChangeQuery>) -> Response {
    dispatch(
        &state,
        EngineRequest::AnalyzeChange {
            project_id: body.project_id,
            commit_sha: body.commit_sha,
            merge_request_iid: body.merge_request_iid,
            query: body.query,
        },
    )
    .await
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct TroubleshootQuery {
    kind: String,
    name: String,
    #[serde(default)]
    namespace: String,
    #[serde(default)]
    query: Option<String>,
}

async fn handle_troubleshoot(
    State(state): State<AppState>,
    Json(body): Json<TroubleshootQuery>,
) -> Response {
    dispatch(
        &state,
        EngineRequest::TroubleshootResource {
            kind: body.kind,
            name: body.name,
            namespace: body.namespace,
            query: body.query,
        },
    )
    .await
}

async fn handle_namespaces(State(state): State<AppState>) -> Response {
    use crate::kube::ClusterClient as _;
    match state.cluster.namespaces().await {
        Ok(namespaces) => (StatusCode::OK, Json(json!({"namespaces": namespaces}))).into_response(),
        Err(err) => {
            warn!(error = %err, "failed to list namespaces");
            (status_for(&err), Json(EngineResponse::failure(&err))).into_response()
        }
    }
}

/// Per-upstream connectivity summary. The completion provider is not
/// probed; a health check should not spend tokens.
async fn handle_health(State(state): State<AppState>) -> Response {
    let mut services = serde_json::Map::new();

    let kubernetes = state.cluster.check_connectivity().await;
    services.insert(
        "kubernetes".into(),
        json!(if kubernetes.is_ok() { "available" } else { "unavailable" }),
    );
    if let Err(err) = &kubernetes {
        warn!(error = %err, "kubernetes health check failed");
    }

    match state.argocd.check_connectivity().await {
        Ok(()) => services.insert("argocd".into(), json!("available")),
        Err(err) => {
            warn!(error = %err, "argocd health check failed");
            services.insert("argocd".into(), json!("unavailable"))
        }
    };

    match state.gitlab.check_connectivity().await {
        Ok(()) => services.insert("gitlab".into(), json!("available")),
        Err(err) => {
            warn!(error = %err, "gitlab health check failed");
            services.insert("gitlab".into(), json!("unavailable"))
        }
    };

    services.insert("claude".into(), json!("assumed available"));

    let status = if kubernetes.is_ok() { "ok" } else { "degraded" };
    (StatusCode::OK, Json(json!({"status": status, "services": services}))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_status_mapping() {
        assert_eq!(status_for(&Error::InvalidInput("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(&Error::UnknownKind("Widget".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(&Error::NotFound("pod".into())), StatusCode::NOT_FOUND);
        assert_eq!(status_for(&Error::upstream("argocd", "down")), StatusCode::BAD_GATEWAY);
        assert_eq!(status_for(&Error::Llm("x".into())), StatusCode::BAD_GATEWAY);
        assert_eq!(status_for(&Error::Internal("x".into())), StatusCode::INTERNAL_SERVER_ERROR);
    }
}

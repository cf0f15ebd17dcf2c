//! opslens: cross-system operational context for Kubernetes environments.
//!
//! Correlates live cluster state, GitOps sync information, and
//! source-control activity into a bounded, deterministic context document
//! and drives an LLM to produce diagnostic analysis with typed issues and
//! recommendations.
//!
//! The core is organised around five capabilities — [`kube::ClusterClient`],
//! [`argocd::GitOpsClient`], [`gitlab::SourceHostClient`],
//! [`auth::CredentialStore`], and [`claude::CompletionProvider`] — consumed
//! by the [`engine::Engine`] façade.

pub mod argocd;
pub mod auth;
pub mod claude;
pub mod config;
pub mod correlator;
pub mod engine;
pub mod error;
pub mod gitlab;
pub mod helm;
pub mod kube;
pub mod models;
pub mod server;
pub mod util;

pub use engine::{Engine, EngineRequest, EngineResponse};
pub use error::{Error, Result};

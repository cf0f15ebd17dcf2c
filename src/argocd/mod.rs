//! GitOps controller access: the `GitOpsClient` capability and the Argo CD
//! REST implementation.

pub mod client;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{ArgoApplication, ArgoResourceTree, ArgoSyncHistoryEntry};

pub use client::ArgoClient;

/// Read-only access to the GitOps controller.
#[async_trait]
pub trait GitOpsClient: Send + Sync {
    async fn list_applications(&self) -> Result<Vec<ArgoApplication>>;

    async fn get_application(&self, name: &str) -> Result<ArgoApplication>;

    /// The resources an application manages, including ownership-derived
    /// descendants.
    async fn resource_tree(&self, name: &str) -> Result<ArgoResourceTree>;

    /// Applications managing a specific resource. Implementations may not
    /// support a native lookup; callers fall back to scanning trees when
    /// the result is empty.
    async fn applications_by_resource(
        &self,
        kind: &str,
        name: &str,
        namespace: &str,
    ) -> Result<Vec<ArgoApplication>>;

    async fn application_history(&self, name: &str) -> Result<Vec<ArgoSyncHistoryEntry>>;
}

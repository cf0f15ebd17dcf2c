//! Cross-system correlation: joining cluster resources to the GitOps
//! applications that manage them and the source-control activity that
//! produced them, plus failure-mode classification.

pub mod gitops;
pub mod helm;
pub mod troubleshoot;

pub use gitops::{ChangeRef, GitOpsCorrelator};
pub use helm::HelmCorrelator;
pub use troubleshoot::Troubleshooter;

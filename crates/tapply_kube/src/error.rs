//! Error types for the Kubernetes store.

use thiserror::Error;

/// Result type alias for store construction.
pub type KubeStoreResult<T> = Result<T, KubeStoreError>;

/// Errors raised while connecting to a cluster.
#[derive(Error, Debug)]
pub enum KubeStoreError {
    #[error("Failed to load kubeconfig: {0}")]
    Kubeconfig(#[from] kube::config::KubeconfigError),

    #[error("Failed to create Kubernetes client: {0}")]
    Client(#[from] kube::Error),
}

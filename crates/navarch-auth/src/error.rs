use thiserror::Error;

/// Authorization subsystem errors
#[derive(Debug, Error)]
pub enum AuthError {
    /// The token review call itself failed
    #[error("token review failed: {0}")]
    TokenReview(#[source] kube::Error),

    /// The server reviewed the token and rejected it
    #[error("token not authenticated: {0}")]
    NotAuthenticated(String),

    /// The self-subject access review call failed
    #[error("access review failed: {0}")]
    AccessReview(#[source] kube::Error),
}

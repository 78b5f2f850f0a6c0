/// Coarse error classification reported back to the broker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ConstructionFailed,
    Cancelled,
    Failed,
}

/// Errors that can end an authentication request
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Error creating authentication object: {0}")]
    ConstructionFailed(String),
    #[error("Authentication dialog was dismissed by the user")]
    Cancelled,
    #[error("Authentication failed: {0}")]
    Failed(String),
    #[error("Collaborator error: {0}")]
    Collaborator(#[from] anyhow::Error),
}

impl AuthError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthError::ConstructionFailed(_) => ErrorKind::ConstructionFailed,
            AuthError::Cancelled => ErrorKind::Cancelled,
            AuthError::Failed(_) | AuthError::Collaborator(_) => ErrorKind::Failed,
        }
    }
}

/// A completion was resolved more than once
#[derive(Debug, thiserror::Error)]
#[error("Completion for session {cookie} was already resolved")]
pub struct AlreadyResolved {
    pub cookie: String,
}

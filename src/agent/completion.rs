use tokio::sync::oneshot;

use super::errors::{AlreadyResolved, AuthError};
use super::session::SessionId;

pub type CompletionResult = Result<(), AuthError>;

/// Caller side of an authentication request. Resolves exactly once.
#[derive(Debug)]
pub struct CompletionTask {
    id: SessionId,
    cookie: String,
    receiver: oneshot::Receiver<CompletionResult>,
}

/// Coordinator side of a [`CompletionTask`]
#[derive(Debug)]
pub struct CompletionResolver {
    cookie: String,
    sender: Option<oneshot::Sender<CompletionResult>>,
}

/// Create a connected task/resolver pair for one request
pub fn completion_pair(
    id: SessionId,
    cookie: impl Into<String>,
) -> (CompletionTask, CompletionResolver) {
    let cookie = cookie.into();
    let (sender, receiver) = oneshot::channel();
    (
        CompletionTask {
            id,
            cookie: cookie.clone(),
            receiver,
        },
        CompletionResolver {
            cookie,
            sender: Some(sender),
        },
    )
}

impl CompletionTask {
    /// Identifier accepted by [`Listener::cancel`](crate::agent::Listener::cancel)
    pub fn session_id(&self) -> SessionId {
        self.id
    }

    pub fn cookie(&self) -> &str {
        &self.cookie
    }

    /// Wait for the request to finish
    pub async fn finish(self) -> CompletionResult {
        match self.receiver.await {
            Ok(result) => result,
            Err(_) => Err(dropped()),
        }
    }

    /// Take the result if the task has already been resolved.
    /// Returns `None` while the request is still queued or active.
    pub fn try_finish(&mut self) -> Option<CompletionResult> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(dropped())),
        }
    }
}

impl CompletionResolver {
    pub fn cookie(&self) -> &str {
        &self.cookie
    }

    pub fn is_resolved(&self) -> bool {
        self.sender.is_none()
    }

    /// Deliver the result. A second call is rejected and leaves the first
    /// result in place.
    pub fn resolve(&mut self, result: CompletionResult) -> Result<(), AlreadyResolved> {
        let Some(sender) = self.sender.take() else {
            log::warn!(
                "Ignoring second resolution for session {}: {:?}",
                self.cookie,
                result
            );
            return Err(AlreadyResolved {
                cookie: self.cookie.clone(),
            });
        };

        if sender.send(result).is_err() {
            log::debug!(
                "Caller for session {} stopped waiting before completion",
                self.cookie
            );
        }
        Ok(())
    }
}

fn dropped() -> AuthError {
    AuthError::Failed("completion dropped".to_string())
}

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use super::completion::CompletionResolver;
use super::errors::AuthError;
use super::session::{AuthenticatorSession, SessionId, SessionOutcome};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub id: SessionId,
    pub cookie: String,
    pub action_id: String,
    pub requested_at: DateTime<Utc>,
}

impl SessionSummary {
    fn of(session: &AuthenticatorSession) -> Self {
        Self {
            id: session.id(),
            cookie: session.cookie().to_string(),
            action_id: session.action_id().to_string(),
            requested_at: session.requested_at(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueSnapshot {
    pub active: Option<SessionSummary>,
    pub pending: Vec<SessionSummary>,
}

impl QueueSnapshot {
    pub fn active_cookie(&self) -> Option<&str> {
        self.active.as_ref().map(|s| s.cookie.as_str())
    }

    pub fn pending_cookies(&self) -> Vec<&str> {
        self.pending.iter().map(|s| s.cookie.as_str()).collect()
    }
}

/// Detaches a request's cancellation watcher once the request leaves the queue
#[derive(Debug, Default)]
pub(crate) struct CancelBridge(Option<JoinHandle<()>>);

impl CancelBridge {
    pub(crate) fn new(handle: JoinHandle<()>) -> Self {
        Self(Some(handle))
    }

    #[cfg(test)]
    pub(crate) fn detached() -> Self {
        Self(None)
    }
}

impl Drop for CancelBridge {
    fn drop(&mut self) {
        if let Some(handle) = self.0.take() {
            handle.abort();
        }
    }
}

/// A request waiting for its turn
#[derive(Debug)]
pub(crate) struct QueuedRequest {
    session: AuthenticatorSession,
    resolver: CompletionResolver,
    bridge: CancelBridge,
}

impl QueuedRequest {
    pub(crate) fn new(
        session: AuthenticatorSession,
        resolver: CompletionResolver,
        bridge: CancelBridge,
    ) -> Self {
        Self {
            session,
            resolver,
            bridge,
        }
    }
}

/// The request currently driving the prompt UI. Its session is owned by the
/// running session task; the queue keeps what it needs to resolve and cancel.
#[derive(Debug)]
struct ActiveRequest {
    summary: SessionSummary,
    resolver: CompletionResolver,
    cancel: Option<oneshot::Sender<()>>,
    _bridge: CancelBridge,
}

/// A session handed out for driving, with the receiver that signals
/// forced cancellation
#[derive(Debug)]
pub struct Promotion {
    pub session: AuthenticatorSession,
    pub cancel: oneshot::Receiver<()>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelAction {
    /// The active session was asked to stop; completion follows asynchronously
    SignalledActive,
    /// The active session had already been asked to stop
    AlreadySignalled,
    /// A queued session was removed and resolved as cancelled
    RemovedPending,
    /// Unknown or already completed session
    NotFound,
}

/// Pending/active bookkeeping. At most one session is active; pending
/// sessions are promoted strictly in arrival order.
#[derive(Debug, Default)]
pub struct SessionQueue {
    pending: VecDeque<QueuedRequest>,
    active: Option<ActiveRequest>,
}

impl SessionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn enqueue(&mut self, request: QueuedRequest) {
        log::debug!(
            "Queued session {} ({} already pending)",
            request.session.cookie(),
            self.pending_len()
        );
        self.pending.push_back(request);
    }

    pub fn is_idle(&self) -> bool {
        self.active.is_none()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn active_id(&self) -> Option<SessionId> {
        self.active.as_ref().map(|a| a.summary.id)
    }

    /// Move the head of the pending list to active, if nothing is active
    pub fn promote_next(&mut self) -> Option<Promotion> {
        if !self.is_idle() {
            return None;
        }

        let QueuedRequest {
            mut session,
            resolver,
            bridge,
        } = self.pending.pop_front()?;

        session.promote();
        let (cancel_sender, cancel_receiver) = oneshot::channel();
        let summary = SessionSummary::of(&session);
        log::info!(
            "Promoting session {} for {} ({} still pending)",
            summary.cookie,
            summary.action_id,
            self.pending.len()
        );

        self.active = Some(ActiveRequest {
            summary,
            resolver,
            cancel: Some(cancel_sender),
            _bridge: bridge,
        });

        Some(Promotion {
            session,
            cancel: cancel_receiver,
        })
    }

    /// Record a session's terminal outcome and resolve its completion.
    /// Returns `false` if the session is no longer tracked.
    pub fn complete(&mut self, id: SessionId, outcome: SessionOutcome) -> bool {
        if self.active_id() == Some(id) {
            if let Some(mut active) = self.active.take() {
                log::info!(
                    "Session {} completed: {:?}",
                    active.summary.cookie,
                    outcome
                );
                let _ = active.resolver.resolve(outcome.into_result());
            }
            return true;
        }

        // Only active sessions run, but keep the queue consistent regardless
        if let Some(mut request) = self.remove_pending(id) {
            log::warn!(
                "Session {} completed while still queued: {:?}",
                request.session.cookie(),
                outcome
            );
            let _ = request.resolver.resolve(outcome.into_result());
            return true;
        }

        log::debug!("Ignoring completion for untracked session {}", id);
        false
    }

    pub fn cancel(&mut self, id: SessionId) -> CancelAction {
        if let Some(active) = self.active.as_mut().filter(|a| a.summary.id == id) {
            return match active.cancel.take() {
                Some(sender) => {
                    log::info!("Cancelling active session {}", active.summary.cookie);
                    let _ = sender.send(());
                    CancelAction::SignalledActive
                }
                None => CancelAction::AlreadySignalled,
            };
        }

        match self.remove_pending(id) {
            Some(mut request) => {
                log::info!(
                    "Cancelled session {} before it was promoted",
                    request.session.cookie()
                );
                let _ = request.resolver.resolve(Err(AuthError::Cancelled));
                CancelAction::RemovedPending
            }
            None => CancelAction::NotFound,
        }
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            active: self.active.as_ref().map(|a| a.summary.clone()),
            pending: self
                .pending
                .iter()
                .map(|r| SessionSummary::of(&r.session))
                .collect(),
        }
    }

    /// Resolve everything still tracked with `reason`, signalling the active
    /// session to stop
    pub fn drain(&mut self, reason: &str) {
        if let Some(mut active) = self.active.take() {
            if let Some(sender) = active.cancel.take() {
                let _ = sender.send(());
            }
            let _ = active
                .resolver
                .resolve(Err(AuthError::Failed(reason.to_string())));
        }
        for mut request in self.pending.drain(..) {
            let _ = request
                .resolver
                .resolve(Err(AuthError::Failed(reason.to_string())));
        }
    }

    fn remove_pending(&mut self, id: SessionId) -> Option<QueuedRequest> {
        let index = self.pending.iter().position(|r| r.session.id() == id)?;
        self.pending.remove(index)
    }
}

use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

use super::cancel::CancelToken;
use super::completion::{completion_pair, CompletionResolver, CompletionTask};
use super::config::AgentConfig;
use super::errors::AuthError;
use super::helper::AuthHelper;
use super::prompt::PromptUi;
use super::queue::{
    CancelAction, CancelBridge, Promotion, QueueSnapshot, QueuedRequest, SessionQueue,
};
use super::session::{AuthenticationRequest, AuthenticatorSession, SessionId, SessionOutcome};

const SHUTDOWN_REASON: &str = "authentication agent shutting down";

/// Messages processed, one at a time, by the coordinator task
#[derive(Debug)]
enum ListenerEvent {
    Initiate {
        session: AuthenticatorSession,
        resolver: CompletionResolver,
        cancel: CancelToken,
    },
    SessionCompleted {
        id: SessionId,
        outcome: SessionOutcome,
    },
    Cancel {
        id: SessionId,
    },
    Snapshot {
        reply: oneshot::Sender<QueueSnapshot>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Entry point for the broker. Accepts overlapping requests and serializes
/// them into one interactive session at a time.
///
/// Cloning is cheap; the coordinator stops once every clone is dropped or
/// [`Listener::shutdown`] is called.
#[derive(Clone)]
pub struct Listener {
    events: mpsc::UnboundedSender<ListenerEvent>,
    config: Arc<AgentConfig>,
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener")
            .field("config", &self.config)
            .field("events", &"<coordinator>")
            .finish()
    }
}

impl Listener {
    /// Spawn the coordinator on the current tokio runtime
    pub fn new(ui: Arc<dyn PromptUi>, helper: Arc<dyn AuthHelper>, config: AgentConfig) -> Self {
        let (events, receiver) = mpsc::unbounded_channel();
        let coordinator = Coordinator {
            queue: SessionQueue::new(),
            ui,
            helper,
            events: events.downgrade(),
        };
        tokio::spawn(coordinator.run(receiver));

        Self {
            events,
            config: Arc::new(config),
        }
    }

    /// Start an authentication request. Never blocks; the returned task
    /// resolves once the request is finished. Requests that cannot be turned
    /// into a session resolve immediately with `ConstructionFailed`.
    pub fn initiate(&self, request: AuthenticationRequest, cancel: CancelToken) -> CompletionTask {
        let id = SessionId::new();
        let (task, mut resolver) = completion_pair(id, request.cookie.clone());

        log::info!(
            "Authentication requested for {} (cookie {}, {} identities)",
            request.action_id,
            request.cookie,
            request.identities.len()
        );

        let session = match AuthenticatorSession::new(id, request, self.config.clone()) {
            Ok(session) => session,
            Err(e) => {
                log::warn!("Rejecting authentication request: {}", e);
                let _ = resolver.resolve(Err(e));
                return task;
            }
        };

        let event = ListenerEvent::Initiate {
            session,
            resolver,
            cancel,
        };
        if let Err(mpsc::error::SendError(event)) = self.events.send(event) {
            log::error!("Authentication agent is not running");
            if let ListenerEvent::Initiate { mut resolver, .. } = event {
                let _ = resolver.resolve(Err(AuthError::Failed(
                    "authentication agent is not running".to_string(),
                )));
            }
        }

        task
    }

    /// Cancel a request, whether active or still queued. No-op for requests
    /// that have already finished.
    pub fn cancel(&self, id: SessionId) {
        if self.events.send(ListenerEvent::Cancel { id }).is_err() {
            log::debug!("Cancel for {} after agent shutdown", id);
        }
    }

    /// Current active and pending sessions, reflecting every event sent before
    /// this call
    pub async fn snapshot(&self) -> Result<QueueSnapshot, AuthError> {
        let (reply, receiver) = oneshot::channel();
        self.events
            .send(ListenerEvent::Snapshot { reply })
            .map_err(|_| not_running())?;
        receiver.await.map_err(|_| not_running())
    }

    /// Dismiss the active session, fail every queued request and stop the
    /// coordinator
    pub async fn shutdown(&self) {
        let (reply, receiver) = oneshot::channel();
        if self.events.send(ListenerEvent::Shutdown { reply }).is_ok() {
            let _ = receiver.await;
        }
    }
}

fn not_running() -> AuthError {
    AuthError::Failed("authentication agent is not running".to_string())
}

/// Single owner of the queue
struct Coordinator {
    queue: SessionQueue,
    ui: Arc<dyn PromptUi>,
    helper: Arc<dyn AuthHelper>,
    events: mpsc::WeakUnboundedSender<ListenerEvent>,
}

impl Coordinator {
    async fn run(mut self, mut receiver: mpsc::UnboundedReceiver<ListenerEvent>) {
        log::info!("Authentication agent coordinator started");

        while let Some(event) = receiver.recv().await {
            match event {
                ListenerEvent::Initiate {
                    session,
                    resolver,
                    cancel,
                } => self.handle_initiate(session, resolver, cancel),
                ListenerEvent::SessionCompleted { id, outcome } => {
                    self.queue.complete(id, outcome);
                    self.maybe_promote_next();
                }
                ListenerEvent::Cancel { id } => self.handle_cancel(id),
                ListenerEvent::Snapshot { reply } => {
                    let _ = reply.send(self.queue.snapshot());
                }
                ListenerEvent::Shutdown { reply } => {
                    self.queue.drain(SHUTDOWN_REASON);
                    let _ = reply.send(());
                    log::info!("Authentication agent coordinator stopped");
                    return;
                }
            }
        }

        self.queue.drain(SHUTDOWN_REASON);
        log::info!("Authentication agent coordinator stopped: all listeners dropped");
    }

    fn handle_initiate(
        &mut self,
        session: AuthenticatorSession,
        mut resolver: CompletionResolver,
        mut cancel: CancelToken,
    ) {
        if cancel.try_cancelled() {
            log::info!("Session {} was cancelled before it was queued", session.cookie());
            let _ = resolver.resolve(Err(AuthError::Cancelled));
            return;
        }

        let bridge = self.watch_cancellation(session.id(), cancel);
        self.queue.enqueue(QueuedRequest::new(session, resolver, bridge));
        self.maybe_promote_next();
    }

    fn handle_cancel(&mut self, id: SessionId) {
        match self.queue.cancel(id) {
            CancelAction::SignalledActive | CancelAction::RemovedPending => {}
            CancelAction::AlreadySignalled => {
                log::debug!("Session {} is already being cancelled", id);
            }
            CancelAction::NotFound => {
                log::debug!("Ignoring cancel for finished session {}", id);
            }
        }
    }

    /// Route a fired token to `Cancel` for exactly this session
    fn watch_cancellation(&self, id: SessionId, cancel: CancelToken) -> CancelBridge {
        let events = self.events.clone();
        CancelBridge::new(tokio::spawn(async move {
            if cancel.cancelled().await {
                if let Some(events) = events.upgrade() {
                    let _ = events.send(ListenerEvent::Cancel { id });
                }
            }
        }))
    }

    fn maybe_promote_next(&mut self) {
        if let Some(promotion) = self.queue.promote_next() {
            self.start_session(promotion);
        }
    }

    fn start_session(&self, promotion: Promotion) {
        let Promotion {
            mut session,
            cancel,
        } = promotion;
        let ui = self.ui.clone();
        let helper = self.helper.clone();
        let events = self.events.clone();

        tokio::spawn(async move {
            let id = session.id();
            let outcome = session.run(ui.as_ref(), helper.as_ref(), cancel).await;
            match events.upgrade() {
                Some(events) => {
                    let _ = events.send(ListenerEvent::SessionCompleted { id, outcome });
                }
                None => log::debug!(
                    "Session {} finished after agent shutdown: {:?}",
                    session.cookie(),
                    outcome
                ),
            }
        });
    }
}

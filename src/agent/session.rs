use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::oneshot;
use uuid::Uuid;

use super::config::AgentConfig;
use super::errors::AuthError;
use super::helper::{AuthHelper, ConversationEvent, HelperConversation};
use super::identity::{candidate_users, Details, Identity};
use super::prompt::{PromptReply, PromptUi, SessionView, UserSelection};

/// Internal routing key for a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A privilege-escalation request as received from the broker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticationRequest {
    pub action_id: String,
    pub message: String,
    pub icon_name: String,
    #[serde(default)]
    pub details: Details,
    pub cookie: String,
    pub identities: Vec<Identity>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    Success,
    Dismissed,
    Failed(String),
    /// The prompt UI or the upstream helper returned an error
    CollaboratorFailed(String),
}

impl SessionOutcome {
    pub fn into_result(self) -> Result<(), AuthError> {
        match self {
            SessionOutcome::Success => Ok(()),
            SessionOutcome::Dismissed => Err(AuthError::Cancelled),
            SessionOutcome::Failed(reason) => Err(AuthError::Failed(reason)),
            SessionOutcome::CollaboratorFailed(reason) => {
                Err(AuthError::Collaborator(anyhow::Error::msg(reason)))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Promoted,
    SelectingUser,
    Prompting,
    Completed(SessionOutcome),
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Completed(_))
    }
}

/// How a single helper conversation ended
enum AttemptEnd {
    Gained,
    Rejected,
    Dismissed,
    Reselected(Identity),
}

/// One authentication conversation, tied to a single broker cookie
#[derive(Debug)]
pub struct AuthenticatorSession {
    id: SessionId,
    action_id: String,
    message: String,
    icon_name: String,
    details: Details,
    cookie: String,
    candidates: Vec<Identity>,
    selected_user: Option<Identity>,
    state: SessionState,
    requested_at: DateTime<Utc>,
    config: Arc<AgentConfig>,
}

impl AuthenticatorSession {
    pub fn new(
        id: SessionId,
        request: AuthenticationRequest,
        config: Arc<AgentConfig>,
    ) -> Result<Self, AuthError> {
        if request.cookie.is_empty() {
            return Err(AuthError::ConstructionFailed(
                "request has no cookie".to_string(),
            ));
        }

        let candidates = candidate_users(&request.identities);
        if candidates.is_empty() {
            return Err(AuthError::ConstructionFailed(format!(
                "no unix user to authenticate as for {}",
                request.action_id
            )));
        }

        let selected_user = default_selection(&candidates, config.current_user.as_deref());

        Ok(Self {
            id,
            action_id: request.action_id,
            message: request.message,
            icon_name: request.icon_name,
            details: request.details,
            cookie: request.cookie,
            candidates,
            selected_user,
            state: SessionState::Created,
            requested_at: Utc::now(),
            config,
        })
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn cookie(&self) -> &str {
        &self.cookie
    }

    pub fn action_id(&self) -> &str {
        &self.action_id
    }

    pub fn candidates(&self) -> &[Identity] {
        &self.candidates
    }

    pub fn selected_user(&self) -> Option<&Identity> {
        self.selected_user.as_ref()
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn requested_at(&self) -> DateTime<Utc> {
        self.requested_at
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            id: self.id,
            cookie: self.cookie.clone(),
            action_id: self.action_id.clone(),
            message: self.message.clone(),
            icon_name: self.icon_name.clone(),
            details: self.details.clone(),
            candidates: self.candidates.clone(),
            selected_user: self.selected_user.clone(),
            state: self.state.clone(),
        }
    }

    /// Mark the session as the one allowed to drive the prompt UI
    pub fn promote(&mut self) {
        if self.state == SessionState::Created {
            self.set_state(SessionState::Promoted);
        } else {
            log::warn!(
                "Session {} promoted twice (state {:?})",
                self.cookie,
                self.state
            );
        }
    }

    /// Drive the session to completion. Cancellation fired on `cancel` (or
    /// the sender being dropped) closes the dialog and ends the session
    /// `Dismissed`.
    pub async fn run(
        &mut self,
        ui: &dyn PromptUi,
        helper: &dyn AuthHelper,
        mut cancel: oneshot::Receiver<()>,
    ) -> SessionOutcome {
        if self.state != SessionState::Promoted {
            let reason = if self.state.is_terminal() {
                format!("session {} has already completed", self.cookie)
            } else {
                format!("session {} was not promoted before running", self.cookie)
            };
            log::error!("{}", reason);
            return SessionOutcome::Failed(reason);
        }

        let mut conversation: Option<Box<dyn HelperConversation>> = None;

        let finished = tokio::select! {
            biased;
            _ = &mut cancel => None,
            outcome = self.converse(ui, helper, &mut conversation) => Some(outcome),
        };

        let outcome = match finished {
            Some(Ok(outcome)) => outcome,
            Some(Err(e)) => {
                log::error!("Session {} failed: {:#}", self.cookie, e);
                SessionOutcome::CollaboratorFailed(format!("{:#}", e))
            }
            None => {
                log::info!("Session {} cancelled while {:?}", self.cookie, self.state);
                SessionOutcome::Dismissed
            }
        };

        if let Some(mut conversation) = conversation.take() {
            if outcome != SessionOutcome::Success {
                conversation.cancel().await;
            }
        }

        self.set_state(SessionState::Completed(outcome.clone()));
        ui.close(&self.view()).await;
        outcome
    }

    async fn converse(
        &mut self,
        ui: &dyn PromptUi,
        helper: &dyn AuthHelper,
        conversation: &mut Option<Box<dyn HelperConversation>>,
    ) -> anyhow::Result<SessionOutcome> {
        ui.show_session(&self.view()).await?;

        let mut failed_attempts: u32 = 0;
        loop {
            let identity = match self.selected_user.clone() {
                Some(identity) => identity,
                None => {
                    self.set_state(SessionState::SelectingUser);
                    match ui.select_user(&self.view()).await? {
                        UserSelection::Selected(identity)
                            if self.candidates.contains(&identity) =>
                        {
                            self.selected_user = Some(identity.clone());
                            identity
                        }
                        UserSelection::Selected(identity) => {
                            log::warn!(
                                "Session {}: {} is not a candidate identity",
                                self.cookie,
                                identity
                            );
                            continue;
                        }
                        UserSelection::Cancelled => return Ok(SessionOutcome::Dismissed),
                    }
                }
            };

            self.set_state(SessionState::Prompting);
            log::debug!("Session {}: authenticating as {}", self.cookie, identity);
            let current = conversation.insert(helper.begin(&identity, &self.cookie).await?);

            match self.prompt_rounds(ui, &mut **current).await? {
                AttemptEnd::Gained => {
                    log::info!("Session {}: authorization gained as {}", self.cookie, identity);
                    return Ok(SessionOutcome::Success);
                }
                AttemptEnd::Dismissed => return Ok(SessionOutcome::Dismissed),
                AttemptEnd::Reselected(chosen) => {
                    if let Some(mut stale) = conversation.take() {
                        stale.cancel().await;
                    }
                    self.set_state(SessionState::SelectingUser);
                    if self.candidates.contains(&chosen) {
                        log::debug!("Session {}: reselected {}", self.cookie, chosen);
                        self.selected_user = Some(chosen);
                    } else {
                        log::warn!(
                            "Session {}: reselected {} is not a candidate identity",
                            self.cookie,
                            chosen
                        );
                        self.selected_user = None;
                    }
                }
                AttemptEnd::Rejected => {
                    conversation.take();
                    failed_attempts += 1;
                    log::info!(
                        "Session {}: attempt {} as {} was rejected",
                        self.cookie,
                        failed_attempts,
                        identity
                    );

                    let view = self.view();
                    ui.indicate_error(&view).await;
                    ui.show_info_message(&view, &self.config.failure_message).await;

                    // The first attempt is always made, so a limit of 0 acts as 1
                    if let Some(max) = self.config.max_attempts {
                        if failed_attempts >= max {
                            return Ok(SessionOutcome::Failed(format!(
                                "{} failed attempts",
                                failed_attempts
                            )));
                        }
                    }
                }
            }
        }
    }

    async fn prompt_rounds(
        &mut self,
        ui: &dyn PromptUi,
        conversation: &mut dyn HelperConversation,
    ) -> anyhow::Result<AttemptEnd> {
        loop {
            match conversation.next_event().await? {
                ConversationEvent::Request { prompt, echo } => {
                    let prompt = if prompt.trim().is_empty() {
                        self.config.default_password_prompt.clone()
                    } else {
                        prompt
                    };

                    match ui.prompt_for_credential(&self.view(), &prompt, echo).await? {
                        PromptReply::Credential(text) => conversation.respond(text).await?,
                        PromptReply::Cancelled => return Ok(AttemptEnd::Dismissed),
                        PromptReply::UserReselected(chosen) => {
                            return Ok(AttemptEnd::Reselected(chosen))
                        }
                    }
                }
                ConversationEvent::ShowInfo(text) | ConversationEvent::ShowError(text) => {
                    ui.show_info_message(&self.view(), &text).await;
                }
                ConversationEvent::Completed {
                    gained_authorization,
                } => {
                    return Ok(if gained_authorization {
                        AttemptEnd::Gained
                    } else {
                        AttemptEnd::Rejected
                    });
                }
            }
        }
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            log::debug!("Session {}: {:?} -> {:?}", self.cookie, self.state, state);
            self.state = state;
        }
    }
}

/// A lone candidate is always pre-selected; otherwise the current user is,
/// when present.
fn default_selection(candidates: &[Identity], current_user: Option<&str>) -> Option<Identity> {
    if let [only] = candidates {
        return Some(only.clone());
    }
    let current_user = current_user?;
    candidates
        .iter()
        .find(|identity| identity.name() == current_user)
        .cloned()
}

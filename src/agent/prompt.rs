use async_trait::async_trait;

use super::identity::{Details, Identity};
use super::session::{SessionId, SessionState};

/// Read-only view of a session handed to the prompt UI
#[derive(Debug, Clone)]
pub struct SessionView {
    pub id: SessionId,
    pub cookie: String,
    pub action_id: String,
    pub message: String,
    pub icon_name: String,
    pub details: Details,
    pub candidates: Vec<Identity>,
    pub selected_user: Option<Identity>,
    pub state: SessionState,
}

/// Result of asking the user to pick an identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserSelection {
    Selected(Identity),
    Cancelled,
}

/// Result of one credential prompt round
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptReply {
    Credential(String),
    Cancelled,
    /// The user picked a different identity while the prompt was shown
    UserReselected(Identity),
}

/// The dialog the coordinator drives. Only one session uses it at a time.
#[async_trait]
pub trait PromptUi: Send + Sync {
    /// Render the session's dialog; called once on promotion
    async fn show_session(&self, session: &SessionView) -> anyhow::Result<()>;

    /// Wait until the user picks one of `session.candidates`
    async fn select_user(&self, session: &SessionView) -> anyhow::Result<UserSelection>;

    /// Wait for a response to `prompt`; `echo` controls whether typed text is visible
    async fn prompt_for_credential(
        &self,
        session: &SessionView,
        prompt: &str,
        echo: bool,
    ) -> anyhow::Result<PromptReply>;

    async fn show_info_message(&self, session: &SessionView, text: &str);

    /// Non-blocking feedback after a rejected credential
    async fn indicate_error(&self, session: &SessionView);

    /// Dismiss the session's dialog. Also called when the session is
    /// cancelled mid-prompt.
    async fn close(&self, session: &SessionView);
}

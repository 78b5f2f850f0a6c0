use async_trait::async_trait;

use super::identity::Identity;

/// Events emitted by the upstream helper during one authentication attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationEvent {
    Request { prompt: String, echo: bool },
    ShowInfo(String),
    ShowError(String),
    Completed { gained_authorization: bool },
}

/// One attempt at authenticating a single identity. The helper, not the
/// agent, decides whether the supplied credentials are accepted.
#[async_trait]
pub trait HelperConversation: Send {
    async fn next_event(&mut self) -> anyhow::Result<ConversationEvent>;

    async fn respond(&mut self, response: String) -> anyhow::Result<()>;

    /// Abort the attempt. Must be safe to call after completion.
    async fn cancel(&mut self);
}

/// Starts helper conversations for a request cookie
#[async_trait]
pub trait AuthHelper: Send + Sync {
    async fn begin(
        &self,
        identity: &Identity,
        cookie: &str,
    ) -> anyhow::Result<Box<dyn HelperConversation>>;
}

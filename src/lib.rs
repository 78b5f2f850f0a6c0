pub mod agent;

pub use agent::{
    cancel_pair, AgentConfig, AuthError, AuthHelper, AuthenticationRequest, CancelHandle,
    CancelToken, CompletionTask, Identity, Listener, PromptUi, QueueSnapshot, SessionId,
};

//! Polkit-style authentication agent coordinator
//!
//! The [`Listener`] accepts possibly overlapping authentication requests from
//! a privilege broker, queues them, and lets exactly one of them drive the
//! prompt UI at a time. Each request is answered through a [`CompletionTask`]
//! that resolves exactly once.
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//! use cafe_polkit_agent::agent::{
//!     cancel_pair, AgentConfig, AuthHelper, AuthenticationRequest, Identity, Listener, PromptUi,
//! };
//!
//! async fn authenticate(ui: Arc<dyn PromptUi>, helper: Arc<dyn AuthHelper>) {
//!     let listener = Listener::new(ui, helper, AgentConfig::from_env());
//!     let (_cancel, token) = cancel_pair();
//!
//!     let task = listener.initiate(
//!         AuthenticationRequest {
//!             action_id: "org.freedesktop.policykit.exec".to_string(),
//!             message: "Authentication is needed to run `/bin/true' as root".to_string(),
//!             icon_name: "dialog-password".to_string(),
//!             details: Default::default(),
//!             cookie: "1-2-3".to_string(),
//!             identities: vec![Identity::unix_user("root")],
//!         },
//!         token,
//!     );
//!
//!     match task.finish().await {
//!         Ok(()) => println!("authorized"),
//!         Err(e) => println!("not authorized: {}", e),
//!     }
//! }
//! ```

// Internal modules
mod cancel;
mod completion;
mod config;
mod errors;
mod helper;
mod identity;
mod listener;
mod prompt;
mod queue;
mod session;

// Public re-exports
pub use cancel::{cancel_pair, CancelHandle, CancelToken};
pub use completion::{completion_pair, CompletionResolver, CompletionResult, CompletionTask};
pub use config::AgentConfig;
pub use errors::{AlreadyResolved, AuthError, ErrorKind};
pub use helper::{AuthHelper, ConversationEvent, HelperConversation};
pub use identity::{Details, Identity};
pub use listener::Listener;
pub use prompt::{PromptReply, PromptUi, SessionView, UserSelection};
pub use queue::{QueueSnapshot, SessionSummary};
pub use session::{
    AuthenticationRequest, AuthenticatorSession, SessionId, SessionOutcome, SessionState,
};

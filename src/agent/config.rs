use serde::Deserialize;

use super::errors::AuthError;

/// Authentication agent configuration
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// User to pre-select when it is one of several candidates
    pub current_user: Option<String>,
    /// Info message shown after the helper rejects a credential
    pub failure_message: String,
    /// Failed attempts allowed before the session gives up (None: unlimited).
    /// The first attempt is always made, so `Some(0)` behaves like `Some(1)`.
    pub max_attempts: Option<u32>,
    /// Prompt label used when the helper sends an empty prompt
    pub default_password_prompt: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            current_user: None,
            failure_message: "Authentication Failure".to_string(),
            max_attempts: None,
            default_password_prompt: "Password:".to_string(),
        }
    }
}

impl AgentConfig {
    /// Defaults, with the current user taken from `$USER`
    pub fn from_env() -> Self {
        Self {
            current_user: non_empty_user(std::env::var("USER").ok()),
            ..Self::default()
        }
    }

    pub fn from_json(content: &str) -> Result<Self, AuthError> {
        serde_json::from_str(content)
            .map_err(|e| AuthError::Failed(format!("Invalid agent configuration: {}", e)))
    }
}

fn non_empty_user(value: Option<String>) -> Option<String> {
    value.filter(|u| !u.trim().is_empty())
}

//! # Authenticator Session Flow Tests
//!
//! Drives a single `AuthenticatorSession` against scripted collaborators:
//! - user selection and reselection from the prompt
//! - retries after a rejected password
//! - info messages from the helper
//! - dismissal by the user and forced cancellation


use agent_test_utils::*;
use cafe_polkit_agent::agent::{
    AgentConfig, AuthenticatorSession, Identity, SessionId, SessionOutcome, SessionState,
};
use rstest::*;
use std::sync::Arc;
use tokio::sync::oneshot;

// =============================================================================
// SHARED TEST FIXTURES
// =============================================================================

#[fixture]
pub fn config() -> AgentConfig {
    init_logging();
    AgentConfig::default()
}

fn promoted_session(cookie: &str, users: &[&str], config: AgentConfig) -> AuthenticatorSession {
    let mut session =
        AuthenticatorSession::new(SessionId::new(), request(cookie, users), Arc::new(config))
            .expect("session should build");
    session.promote();
    session
}

// =============================================================================
// USER SELECTION TESTS
// =============================================================================

#[rstest]
#[tokio::test]
async fn test_single_identity_skips_user_selection(config: AgentConfig) {
    let (ui, controller) = ScriptedUi::new();
    let helper = ScriptedHelper::new();
    let mut session = promoted_session("solo", &["root"], config);
    let (_cancel, cancel_rx) = oneshot::channel();

    controller.type_password(PASSWORD);
    let outcome = session.run(ui.as_ref(), helper.as_ref(), cancel_rx).await;

    assert_eq!(outcome, SessionOutcome::Success);
    assert_eq!(
        session.state(),
        &SessionState::Completed(SessionOutcome::Success)
    );
    assert_eq!(
        ui.calls().await,
        vec![
            UiCall::ShowSession {
                cookie: "solo".to_string()
            },
            UiCall::Prompt {
                cookie: "solo".to_string(),
                prompt: PASSWORD_PROMPT.to_string(),
                echo: false,
                state: SessionState::Prompting,
            },
            UiCall::Close {
                cookie: "solo".to_string()
            },
        ]
    );

    let log = helper.log().await;
    assert_eq!(log.begun, vec![(Identity::unix_user("root"), "solo".to_string())]);
    assert_eq!(log.responses, vec![PASSWORD.to_string()]);
}

#[rstest]
#[tokio::test]
async fn test_reselection_adopts_chosen_identity(config: AgentConfig) {
    let (ui, controller) = ScriptedUi::new();
    let helper = ScriptedHelper::new();
    let mut session = promoted_session("pair", &["alice", "root"], config);
    let (_cancel, cancel_rx) = oneshot::channel();

    controller.select("alice");
    controller.reselect("root");
    controller.type_password(PASSWORD);

    let outcome = session.run(ui.as_ref(), helper.as_ref(), cancel_rx).await;
    assert_eq!(outcome, SessionOutcome::Success);
    assert_eq!(session.selected_user(), Some(&Identity::unix_user("root")));

    let states: Vec<(&'static str, SessionState)> = ui
        .calls()
        .await
        .into_iter()
        .filter_map(|call| match call {
            UiCall::SelectUser { state, .. } => Some(("select", state)),
            UiCall::Prompt { state, .. } => Some(("prompt", state)),
            _ => None,
        })
        .collect();
    // The identity picked in the prompt is used directly, without asking again
    assert_eq!(
        states,
        vec![
            ("select", SessionState::SelectingUser),
            ("prompt", SessionState::Prompting),
            ("prompt", SessionState::Prompting),
        ]
    );

    let log = helper.log().await;
    assert_eq!(
        log.begun,
        vec![
            (Identity::unix_user("alice"), "pair".to_string()),
            (Identity::unix_user("root"), "pair".to_string()),
        ]
    );
    // The conversation for alice is abandoned on reselection
    assert_eq!(log.cancelled, 1);
    assert_eq!(log.responses, vec![PASSWORD.to_string()]);
}

#[rstest]
#[tokio::test]
async fn test_reselecting_stranger_returns_to_user_selection(config: AgentConfig) {
    let (ui, controller) = ScriptedUi::new();
    let helper = ScriptedHelper::new();
    let mut session = promoted_session("pair", &["alice", "root"], config);
    let (_cancel, cancel_rx) = oneshot::channel();

    controller.select("alice");
    controller.reselect("mallory");
    controller.select("root");
    controller.type_password(PASSWORD);

    let outcome = session.run(ui.as_ref(), helper.as_ref(), cancel_rx).await;
    assert_eq!(outcome, SessionOutcome::Success);

    let states: Vec<(&'static str, SessionState)> = ui
        .calls()
        .await
        .into_iter()
        .filter_map(|call| match call {
            UiCall::SelectUser { state, .. } => Some(("select", state)),
            UiCall::Prompt { state, .. } => Some(("prompt", state)),
            _ => None,
        })
        .collect();
    assert_eq!(
        states,
        vec![
            ("select", SessionState::SelectingUser),
            ("prompt", SessionState::Prompting),
            ("select", SessionState::SelectingUser),
            ("prompt", SessionState::Prompting),
        ]
    );
    assert_eq!(
        helper.log().await.begun,
        vec![
            (Identity::unix_user("alice"), "pair".to_string()),
            (Identity::unix_user("root"), "pair".to_string()),
        ]
    );
}

#[rstest]
#[tokio::test]
async fn test_selection_outside_candidates_is_asked_again(config: AgentConfig) {
    let (ui, controller) = ScriptedUi::new();
    let helper = ScriptedHelper::new();
    let mut session = promoted_session("stranger", &["alice", "root"], config);
    let (_cancel, cancel_rx) = oneshot::channel();

    controller.select("mallory");
    controller.select("alice");
    controller.type_password(PASSWORD);

    let outcome = session.run(ui.as_ref(), helper.as_ref(), cancel_rx).await;
    assert_eq!(outcome, SessionOutcome::Success);

    let selects = ui
        .calls()
        .await
        .into_iter()
        .filter(|c| matches!(c, UiCall::SelectUser { .. }))
        .count();
    assert_eq!(selects, 2);
    assert_eq!(
        helper.log().await.begun,
        vec![(Identity::unix_user("alice"), "stranger".to_string())]
    );
}

#[rstest]
#[tokio::test]
async fn test_cancelled_selection_dismisses(config: AgentConfig) {
    let (ui, controller) = ScriptedUi::new();
    let helper = ScriptedHelper::new();
    let mut session = promoted_session("nobody", &["alice", "root"], config);
    let (_cancel, cancel_rx) = oneshot::channel();

    controller.cancel_selection();

    let outcome = session.run(ui.as_ref(), helper.as_ref(), cancel_rx).await;
    assert_eq!(outcome, SessionOutcome::Dismissed);
    assert!(helper.log().await.begun.is_empty());
}

#[tokio::test]
async fn test_current_user_skips_selection() {
    init_logging();
    let config = AgentConfig {
        current_user: Some("alice".to_string()),
        ..AgentConfig::default()
    };
    let (ui, controller) = ScriptedUi::new();
    let helper = ScriptedHelper::new();
    let mut session = promoted_session("me", &["root", "alice"], config);
    let (_cancel, cancel_rx) = oneshot::channel();

    controller.type_password(PASSWORD);

    let outcome = session.run(ui.as_ref(), helper.as_ref(), cancel_rx).await;
    assert_eq!(outcome, SessionOutcome::Success);
    assert!(!ui
        .calls()
        .await
        .iter()
        .any(|c| matches!(c, UiCall::SelectUser { .. })));
    assert_eq!(
        helper.log().await.begun,
        vec![(Identity::unix_user("alice"), "me".to_string())]
    );
}

// =============================================================================
// RETRY TESTS
// =============================================================================

#[rstest]
#[tokio::test]
async fn test_wrong_password_retries_in_same_session(config: AgentConfig) {
    let (ui, controller) = ScriptedUi::new();
    let helper = ScriptedHelper::new();
    let mut session = promoted_session("retry", &["root"], config);
    let (_cancel, cancel_rx) = oneshot::channel();

    controller.type_password("wrong");
    controller.type_password(PASSWORD);

    let outcome = session.run(ui.as_ref(), helper.as_ref(), cancel_rx).await;
    assert_eq!(outcome, SessionOutcome::Success);

    let calls = ui.calls().await;
    let error_index = calls
        .iter()
        .position(|c| matches!(c, UiCall::IndicateError { .. }))
        .expect("rejected password should shake the dialog");
    assert_eq!(
        calls[error_index + 1],
        UiCall::Info {
            cookie: "retry".to_string(),
            text: "Authentication Failure".to_string()
        }
    );
    let prompts = calls
        .iter()
        .filter(|c| matches!(c, UiCall::Prompt { .. }))
        .count();
    assert_eq!(prompts, 2);

    let log = helper.log().await;
    assert_eq!(log.begun.len(), 2, "each attempt is a fresh conversation");
    assert_eq!(log.responses, vec!["wrong".to_string(), PASSWORD.to_string()]);
}

#[tokio::test]
async fn test_max_attempts_fails_session() {
    init_logging();
    let config = AgentConfig {
        max_attempts: Some(2),
        failure_message: "Try again".to_string(),
        ..AgentConfig::default()
    };
    let (ui, controller) = ScriptedUi::new();
    let helper = ScriptedHelper::new();
    let mut session = promoted_session("limited", &["root"], config);
    let (_cancel, cancel_rx) = oneshot::channel();

    controller.type_password("nope");
    controller.type_password("still nope");

    let outcome = session.run(ui.as_ref(), helper.as_ref(), cancel_rx).await;
    assert!(matches!(outcome, SessionOutcome::Failed(_)));

    let infos: Vec<String> = ui
        .calls()
        .await
        .into_iter()
        .filter_map(|c| match c {
            UiCall::Info { text, .. } => Some(text),
            _ => None,
        })
        .collect();
    assert_eq!(infos, vec!["Try again".to_string(), "Try again".to_string()]);
}

#[tokio::test]
async fn test_zero_max_attempts_still_allows_one_attempt() {
    init_logging();
    let config = AgentConfig {
        max_attempts: Some(0),
        ..AgentConfig::default()
    };
    let (ui, controller) = ScriptedUi::new();
    let helper = ScriptedHelper::new();
    let mut session = promoted_session("zero", &["root"], config);
    let (_cancel, cancel_rx) = oneshot::channel();

    controller.type_password("nope");

    let outcome = session.run(ui.as_ref(), helper.as_ref(), cancel_rx).await;
    assert!(matches!(outcome, SessionOutcome::Failed(_)));

    let prompts = ui
        .calls()
        .await
        .into_iter()
        .filter(|c| matches!(c, UiCall::Prompt { .. }))
        .count();
    assert_eq!(prompts, 1);
    assert_eq!(helper.log().await.responses, vec!["nope".to_string()]);
}

#[rstest]
#[tokio::test]
async fn test_helper_info_is_forwarded_without_state_change(config: AgentConfig) {
    let (ui, controller) = ScriptedUi::new();
    let helper = ScriptedHelper::with_info("Your password expires soon");
    let mut session = promoted_session("info", &["root"], config);
    let (_cancel, cancel_rx) = oneshot::channel();

    controller.type_password(PASSWORD);

    let outcome = session.run(ui.as_ref(), helper.as_ref(), cancel_rx).await;
    assert_eq!(outcome, SessionOutcome::Success);

    let calls = ui.calls_for("info").await;
    assert_eq!(
        calls[1],
        UiCall::Info {
            cookie: "info".to_string(),
            text: "Your password expires soon".to_string()
        }
    );
    assert!(matches!(
        &calls[2],
        UiCall::Prompt {
            state: SessionState::Prompting,
            ..
        }
    ));
}

// =============================================================================
// DISMISSAL AND CANCELLATION TESTS
// =============================================================================

#[rstest]
#[tokio::test]
async fn test_user_dismissal_cancels_conversation(config: AgentConfig) {
    let (ui, controller) = ScriptedUi::new();
    let helper = ScriptedHelper::new();
    let mut session = promoted_session("dismiss", &["root"], config);
    let (_cancel, cancel_rx) = oneshot::channel();

    controller.dismiss();

    let outcome = session.run(ui.as_ref(), helper.as_ref(), cancel_rx).await;
    assert_eq!(outcome, SessionOutcome::Dismissed);
    assert_eq!(
        session.state(),
        &SessionState::Completed(SessionOutcome::Dismissed)
    );
    assert_eq!(helper.log().await.cancelled, 1);
    assert_eq!(
        ui.calls().await.last(),
        Some(&UiCall::Close {
            cookie: "dismiss".to_string()
        })
    );
}

#[rstest]
#[tokio::test]
async fn test_forced_cancel_while_prompting(config: AgentConfig) {
    let (ui, _controller) = ScriptedUi::new();
    let helper = ScriptedHelper::new();
    let mut session = promoted_session("forced", &["root"], config);
    let (cancel, cancel_rx) = oneshot::channel();

    let ui_for_cancel = ui.clone();
    let canceller = tokio::spawn(async move {
        ui_for_cancel.wait_for_prompt("forced").await;
        let _ = cancel.send(());
    });

    let outcome = session.run(ui.as_ref(), helper.as_ref(), cancel_rx).await;
    canceller.await.expect("canceller task should finish");

    assert_eq!(outcome, SessionOutcome::Dismissed);
    assert_eq!(helper.log().await.cancelled, 1);
    assert_eq!(
        ui.calls().await.last(),
        Some(&UiCall::Close {
            cookie: "forced".to_string()
        })
    );
}

#[rstest]
#[tokio::test]
async fn test_unpromoted_session_refuses_to_run(config: AgentConfig) {
    let (ui, _controller) = ScriptedUi::new();
    let helper = ScriptedHelper::new();
    let mut session =
        AuthenticatorSession::new(SessionId::new(), request("early", &["root"]), Arc::new(config))
            .expect("session should build");
    let (_cancel, cancel_rx) = oneshot::channel();

    let outcome = session.run(ui.as_ref(), helper.as_ref(), cancel_rx).await;
    assert!(matches!(outcome, SessionOutcome::Failed(_)));
    assert!(ui.calls().await.is_empty());
}

#[rstest]
#[tokio::test]
async fn test_completed_session_refuses_to_run_again(config: AgentConfig) {
    let (ui, controller) = ScriptedUi::new();
    let helper = ScriptedHelper::new();
    let mut session = promoted_session("twice", &["root"], config);

    controller.type_password(PASSWORD);
    let (_cancel, cancel_rx) = oneshot::channel();
    let outcome = session.run(ui.as_ref(), helper.as_ref(), cancel_rx).await;
    assert_eq!(outcome, SessionOutcome::Success);
    assert!(session.state().is_terminal());

    let (_cancel, cancel_rx) = oneshot::channel();
    match session.run(ui.as_ref(), helper.as_ref(), cancel_rx).await {
        SessionOutcome::Failed(reason) => assert!(reason.contains("already completed")),
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert_eq!(
        session.state(),
        &SessionState::Completed(SessionOutcome::Success)
    );
    assert_eq!(helper.log().await.begun.len(), 1);
}

#[rstest]
#[tokio::test]
async fn test_ui_failure_fails_session(config: AgentConfig) {
    let (ui, _controller) = ScriptedUi::broken();
    let helper = ScriptedHelper::new();
    let mut session = promoted_session("broken", &["root"], config);
    let (_cancel, cancel_rx) = oneshot::channel();

    let outcome = session.run(ui.as_ref(), helper.as_ref(), cancel_rx).await;
    match outcome {
        SessionOutcome::CollaboratorFailed(reason) => {
            assert!(reason.contains("display unavailable"))
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert!(helper.log().await.begun.is_empty());
}

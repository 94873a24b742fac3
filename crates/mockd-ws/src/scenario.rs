//! Connect-time scenarios
//!
//! An ordered step list executed right after accept: scripted sends, waits,
//! expectations over client messages, group membership, and closure. A
//! failed expectation closes the connection with a policy-violation code.

use crate::manager::{ConnectionHandle, Outbound, WsManager};
use crate::matching::compile_rule;
use axum::extract::ws::Message;
use futures_util::{Stream, StreamExt};
use mockd_core::model::{ScenarioStep, WsMatchRule};
use mockd_core::template::{render_str, RenderContext};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Run the scenario; returns whether the message loop should start
pub(crate) async fn run(
    manager: &Arc<WsManager>,
    handle: &Arc<ConnectionHandle>,
    stream: &mut (impl Stream<Item = Result<Message, axum::Error>> + Unpin),
    steps: &[ScenarioStep],
) -> bool {
    for step in steps {
        match step {
            ScenarioStep::Send { message } => {
                let rendered = render_str(message, &RenderContext::default());
                if !handle.enqueue(Outbound::Text(rendered)) {
                    return false;
                }
            }
            ScenarioStep::Wait { duration_ms } => {
                tokio::time::sleep(Duration::from_millis(*duration_ms)).await;
            }
            ScenarioStep::Receive { rule, timeout_ms }
            | ScenarioStep::Expect { rule, timeout_ms } => {
                if !await_match(handle, stream, rule.as_ref(), *timeout_ms).await {
                    return false;
                }
            }
            ScenarioStep::Join { group } => {
                let _ = manager.join_group(&handle.id, group);
            }
            ScenarioStep::Leave { group } => {
                let _ = manager.leave_group(&handle.id, group);
            }
            ScenarioStep::Close { code, reason } => {
                handle.request_close(
                    code.unwrap_or(crate::manager::CLOSE_NORMAL),
                    reason.as_deref().unwrap_or(""),
                );
                return false;
            }
        }
    }
    true
}

/// Wait for a client message matching the rule (any message when absent)
async fn await_match(
    handle: &ConnectionHandle,
    stream: &mut (impl Stream<Item = Result<Message, axum::Error>> + Unpin),
    rule: Option<&WsMatchRule>,
    timeout_ms: u64,
) -> bool {
    let compiled = rule.map(compile_rule);
    let wait = tokio::time::timeout(Duration::from_millis(timeout_ms), async {
        loop {
            match stream.next().await {
                None | Some(Err(_)) | Some(Ok(Message::Close(_))) => return false,
                Some(Ok(message @ (Message::Text(_) | Message::Binary(_)))) => {
                    match &compiled {
                        None => return true,
                        Some(matcher) if matcher.matches(&message) => return true,
                        // Non-matching messages are ignored until the timeout.
                        Some(_) => {}
                    }
                }
                Some(Ok(_)) => {}
            }
        }
    })
    .await;

    match wait {
        Ok(true) => true,
        Ok(false) => false,
        Err(_) => {
            debug!(conn = %handle.id, "scenario expectation timed out");
            handle.request_close(
                crate::manager::CLOSE_POLICY_VIOLATION,
                "scenario expectation not met",
            );
            false
        }
    }
}

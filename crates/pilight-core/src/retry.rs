//! Retry-until-confirmed delivery for device commands.
//!
//! The daemon never acknowledges individual commands; the only signal
//! that one was processed is a later state broadcast naming the
//! device. Commands are therefore re-sent at a fixed interval until a
//! broadcast arrives or a bounded budget runs out.

use std::sync::Mutex;
use std::time::Duration;

use pilight_api::{HubClient, Request};
use tokio_util::sync::CancellationToken;

/// Retry tuning for unconfirmed commands.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Re-sends attempted before giving up.
    pub max_attempts: u32,

    /// Spacing between re-sends.
    pub interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 9,
            interval: Duration::from_millis(1000),
        }
    }
}

/// The at-most-one pending command of a device.
///
/// Each command owns its own [`CancellationToken`], so a stale cycle
/// can never be confused with the one that superseded it.
#[derive(Default)]
pub(crate) struct PendingSlot {
    token: Mutex<Option<CancellationToken>>,
}

impl PendingSlot {
    /// Cancel any prior command and register a fresh one.
    ///
    /// A broadcast confirming the old target must not be misread as
    /// confirming the new one, so supersession always cancels first.
    pub(crate) fn supersede(&self) -> CancellationToken {
        let mut guard = self
            .token
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(old) = guard.take() {
            old.cancel();
        }
        let token = CancellationToken::new();
        *guard = Some(token.clone());
        token
    }

    /// Stop the pending cycle, if any. Called on confirmation and on
    /// device teardown.
    pub(crate) fn clear(&self) {
        if let Some(token) = self
            .token
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take()
        {
            token.cancel();
        }
    }
}

/// Re-send `request` every `policy.interval` until the token is
/// cancelled or the budget is exhausted.
///
/// Exhaustion is silent by contract: the caller already saw the
/// outcome of the first send, and the user-visible promise is best
/// effort, not guaranteed delivery.
pub(crate) fn spawn_retry(
    client: HubClient,
    label: String,
    request: Request,
    policy: RetryPolicy,
    token: CancellationToken,
) {
    tokio::spawn(async move {
        let mut attempt = 0u32;
        loop {
            tokio::select! {
                biased;
                () = token.cancelled() => {
                    tracing::debug!(device = %label, "retry cycle stopped");
                    return;
                }
                () = tokio::time::sleep(policy.interval) => {}
            }

            attempt += 1;
            if attempt > policy.max_attempts {
                tracing::debug!(
                    device = %label,
                    attempts = policy.max_attempts,
                    "no confirming broadcast, giving up"
                );
                return;
            }

            tracing::debug!(
                device = %label,
                attempt,
                max = policy.max_attempts,
                "re-sending command"
            );
            // Fire and forget: a failed re-send is just another
            // unconfirmed attempt.
            drop(client.send(&request));
        }
    });
}

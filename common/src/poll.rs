// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Constant-interval polling with an overall budget.
//!
//! Polling operations (node state, subcluster state, subscription state)
//! re-issue the same fan-out until the cluster reaches the desired state
//! or the budget runs out. This is deliberately a fixed-interval loop,
//! not an exponential backoff: the queried service is the thing being
//! administered, and the interval is part of the operation's contract.

use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

/// Result of one attempt to check a condition (see [`wait_for_condition`]).
#[derive(Debug, Error)]
pub enum CondCheckError<E> {
    /// The condition we are waiting for is not true yet.
    #[error("poll condition not yet ready")]
    NotYet,
    /// A failure that will not resolve by waiting.
    #[error("non-retryable error while polling on condition")]
    Failed(#[from] E),
}

/// Result of [`wait_for_condition`].
#[derive(Debug, Error)]
pub enum PollError<E> {
    #[error("timed out after {0:?}")]
    TimedOut(Duration),
    #[error("non-retryable error while polling on condition: {0}")]
    PermanentError(E),
}

/// Poll the given closure until it succeeds, fails permanently, or the
/// budget expires. A `budget` of `None` waits forever.
///
/// The first check runs immediately; the interval separates subsequent
/// checks. `budget` bounds when the loop stops *starting* checks, not
/// the duration of an individual check.
pub async fn wait_for_condition<O, E, Func, Fut>(
    mut cond: Func,
    poll_interval: Duration,
    budget: Option<Duration>,
) -> Result<O, PollError<E>>
where
    Func: FnMut() -> Fut,
    Fut: Future<Output = Result<O, CondCheckError<E>>>,
{
    let poll_start = Instant::now();
    loop {
        match cond().await {
            Ok(output) => return Ok(output),
            Err(CondCheckError::Failed(e)) => return Err(PollError::PermanentError(e)),
            Err(CondCheckError::NotYet) => {}
        }

        let elapsed = poll_start.elapsed();
        if let Some(budget) = budget {
            if elapsed + poll_interval > budget {
                return Err(PollError::TimedOut(elapsed));
            }
        }
        tokio::time::sleep(poll_interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn succeeds_once_condition_holds() {
        let mut attempts = 0;
        let result: Result<u32, PollError<std::io::Error>> = wait_for_condition(
            || {
                attempts += 1;
                let ready = attempts >= 3;
                async move { if ready { Ok(attempts) } else { Err(CondCheckError::NotYet) } }
            },
            Duration::from_secs(1),
            Some(Duration::from_secs(30)),
        )
        .await;
        assert_eq!(result.unwrap(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_when_budget_expires() {
        let result: Result<(), PollError<std::io::Error>> = wait_for_condition(
            || async { Err(CondCheckError::NotYet) },
            Duration::from_secs(3),
            Some(Duration::from_secs(10)),
        )
        .await;
        assert!(matches!(result, Err(PollError::TimedOut(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_error_stops_polling() {
        let result: Result<(), PollError<String>> = wait_for_condition(
            || async { Err(CondCheckError::Failed("wrong password".to_string())) },
            Duration::from_secs(3),
            None,
        )
        .await;
        assert!(matches!(result, Err(PollError::PermanentError(_))));
    }
}

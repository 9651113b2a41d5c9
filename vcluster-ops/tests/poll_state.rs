// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Polling semantics at the plan level: waiting for DOWN succeeds
//! against hosts that stopped answering, and waiting for UP against
//! unreachable hosts exhausts the budget and surfaces a timeout.

use slog::Logger;
use std::time::Duration;
use vcluster_ops::certs::HttpsCerts;
use vcluster_ops::engine::ClusterOpEngine;
use vcluster_ops::error::OpsError;
use vcluster_ops::op::ClusterOp;
use vcluster_ops::ops::https::{HttpsPollNodeStateOp, NodeStateTarget};
use vcluster_common::poll::{wait_for_condition, CondCheckError};

fn test_logger() -> Logger {
    Logger::root(slog::Discard, slog::o!())
}

/// An address nothing listens on: connections are refused immediately.
fn closed_port_host() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr.to_string()
}

#[tokio::test]
async fn poll_down_succeeds_when_engines_stopped_answering() {
    let hosts = vec![closed_port_host(), closed_port_host()];
    let op = HttpsPollNodeStateOp::new(
        &test_logger(),
        hosts,
        false,
        "",
        None,
        Some(Duration::from_secs(30)),
        NodeStateTarget::Down,
    )
    .unwrap();
    let instructions: Vec<Box<dyn ClusterOp>> = vec![Box::new(op)];
    let mut engine = ClusterOpEngine::new(instructions, HttpsCerts::default());
    engine.run(&test_logger()).await.unwrap();
}

#[tokio::test]
async fn poll_up_times_out_and_later_steps_never_run() {
    let op = HttpsPollNodeStateOp::new(
        &test_logger(),
        vec![closed_port_host()],
        false,
        "",
        None,
        Some(Duration::from_secs(1)),
        NodeStateTarget::Up,
    )
    .unwrap();
    // A second poll op that would fail loudly if the engine kept going
    // past the timeout; an engine stopping correctly never prepares it.
    let unreachable_follow_up = HttpsPollNodeStateOp::for_subcluster(
        &test_logger(),
        "sc_that_no_op_published",
        false,
        "",
        None,
        Some(Duration::from_secs(1)),
    )
    .unwrap();
    let instructions: Vec<Box<dyn ClusterOp>> =
        vec![Box::new(op), Box::new(unreachable_follow_up)];
    let mut engine = ClusterOpEngine::new(instructions, HttpsCerts::default());

    // Drive the plan in the background and wait for it to settle, the
    // same way a caller supervising a long-running plan would.
    let handle = tokio::spawn(async move {
        let result = engine.run(&test_logger()).await;
        result.err()
    });
    let error = wait_for_condition(
        || {
            let finished = handle.is_finished();
            async move {
                if finished {
                    Ok(())
                } else {
                    Err(CondCheckError::<std::io::Error>::NotYet)
                }
            }
        },
        Duration::from_millis(100),
        Some(Duration::from_secs(30)),
    )
    .await;
    error.expect("plan settles well within the waiting budget");

    let err = handle.await.unwrap().expect("plan must fail with a timeout");
    assert!(matches!(err, OpsError::Timeout { .. }), "unexpected error: {err}");
}

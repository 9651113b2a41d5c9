// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Poll node state until every target host reaches the desired state
//! or the budget runs out.
//!
//! Each host is asked for its own state through `GET /v1/nodes`. A 401
//! carrying a credential message aborts polling immediately: waiting
//! will not fix a wrong password. When waiting for DOWN, a transport
//! error counts as reached, because a stopped engine stops answering.

use crate::error::OpsError;
use crate::exec_context::OpEngineExecContext;
use crate::http_request::{HostHttpRequest, Method};
use crate::op::{parse_and_check_response, ClusterOp, HttpsAuth, OpBase};
use crate::ops::https::NodesResponse;
use crate::ops::POLL_INTERVAL;
use async_trait::async_trait;
use slog::{debug, info, Logger};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeStateTarget {
    Up,
    Down,
}

impl NodeStateTarget {
    fn as_str(&self) -> &'static str {
        match self {
            NodeStateTarget::Up => "UP",
            NodeStateTarget::Down => "DOWN",
        }
    }
}

#[derive(Debug)]
enum PollProgress {
    Ready,
    NotYet,
}

pub struct HttpsPollNodeStateOp {
    base: OpBase,
    auth: HttpsAuth,
    target: NodeStateTarget,
    /// `None` waits forever.
    timeout: Option<Duration>,
    /// When set, the target hosts are resolved at prepare time to the
    /// subcluster's hosts discovered earlier in the plan.
    target_sc_name: Option<String>,
}

impl HttpsPollNodeStateOp {
    pub fn new(
        log: &Logger,
        hosts: Vec<String>,
        use_password: bool,
        username: &str,
        password: Option<&String>,
        timeout: Option<Duration>,
        target: NodeStateTarget,
    ) -> Result<Self, OpsError> {
        let auth = HttpsAuth::new("HTTPSPollNodeStateOp", use_password, username, password)?;
        Ok(HttpsPollNodeStateOp {
            base: OpBase::new("HTTPSPollNodeStateOp", log, hosts),
            auth,
            target,
            timeout,
            target_sc_name: None,
        })
    }

    /// Poll every host of a subcluster until UP (sandbox/unsandbox).
    pub fn for_subcluster(
        log: &Logger,
        sc_name: &str,
        use_password: bool,
        username: &str,
        password: Option<&String>,
        timeout: Option<Duration>,
    ) -> Result<Self, OpsError> {
        let mut op = Self::new(
            log,
            vec![],
            use_password,
            username,
            password,
            timeout,
            NodeStateTarget::Up,
        )?;
        op.target_sc_name = Some(sc_name.to_string());
        Ok(op)
    }

    fn evaluate_results(&self) -> Result<PollProgress, OpsError> {
        let name = self.name();
        for host in &self.base.hosts {
            let Some(result) = self.base.results().get(host) else {
                return Ok(PollProgress::NotYet);
            };
            if result.is_password_and_certificate_error() {
                return Err(OpsError::Auth {
                    op: name.to_string(),
                    source: result.err.clone().expect("unauthorized results carry an error"),
                });
            }
            let host_ready = if result.is_passing() {
                match parse_and_check_response::<NodesResponse>(name, host, &result.content) {
                    Ok(response) => {
                        let state = response
                            .node_list
                            .iter()
                            .find(|node| &node.address == host)
                            .map(|node| node.state.as_str())
                            .unwrap_or("UNKNOWN");
                        state == self.target.as_str()
                    }
                    Err(_) => false,
                }
            } else {
                // An engine that cannot answer is not UP; for a DOWN
                // target that is exactly the goal.
                self.target == NodeStateTarget::Down
            };
            if !host_ready {
                debug!(self.base.log, "host has not reached the target state";
                    "host" => host, "target" => self.target.as_str());
                return Ok(PollProgress::NotYet);
            }
        }
        Ok(PollProgress::Ready)
    }
}

#[async_trait]
impl ClusterOp for HttpsPollNodeStateOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    async fn prepare(&mut self, ctx: &mut OpEngineExecContext) -> Result<(), OpsError> {
        if let Some(sc_name) = &self.target_sc_name {
            if ctx.sc_hosts.is_empty() {
                return Err(OpsError::internal(
                    self.name(),
                    format!("no hosts known for subcluster {sc_name}"),
                ));
            }
            self.base.hosts = ctx.sc_hosts.clone();
        }
        ctx.dispatcher.setup(&self.base.hosts);
        let hosts = self.base.hosts.clone();
        for host in &hosts {
            let request = self.auth.apply(HostHttpRequest::https(Method::GET, "nodes"));
            self.base.register_request(host, request);
        }
        Ok(())
    }

    async fn execute(&mut self, ctx: &mut OpEngineExecContext) -> Result<(), OpsError> {
        let start = Instant::now();
        loop {
            self.run_execute(ctx).await;
            match self.evaluate_results()? {
                PollProgress::Ready => {
                    info!(self.base.log, "all hosts reached the target state";
                        "target" => self.target.as_str());
                    return Ok(());
                }
                PollProgress::NotYet => {}
            }
            let elapsed = start.elapsed();
            if let Some(budget) = self.timeout {
                if elapsed + POLL_INTERVAL > budget {
                    return Err(OpsError::Timeout {
                        op: self.name().to_string(),
                        elapsed,
                        message: format!(
                            "hosts did not all reach state {} within the budget",
                            self.target.as_str()
                        ),
                    });
                }
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    fn process_result(&mut self, _ctx: &mut OpEngineExecContext) -> Result<(), OpsError> {
        // Result processing happens inside the polling loop.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::HostHttpResult;
    use serde_json::json;

    fn test_logger() -> Logger {
        Logger::root(slog::Discard, slog::o!())
    }

    fn node_body(host: &str, state: &str) -> String {
        json!({"node_list": [{"name": "n", "address": host, "state": state}]}).to_string()
    }

    async fn op_with_results(
        target: NodeStateTarget,
        results: Vec<(&str, HostHttpResult)>,
    ) -> (HttpsPollNodeStateOp, OpEngineExecContext) {
        let hosts: Vec<String> = results.iter().map(|(host, _)| host.to_string()).collect();
        let mut op = HttpsPollNodeStateOp::new(
            &test_logger(),
            hosts,
            false,
            "",
            None,
            Some(Duration::from_secs(30)),
            target,
        )
        .unwrap();
        let mut ctx = OpEngineExecContext::new(&test_logger());
        op.prepare(&mut ctx).await.unwrap();
        for (host, result) in results {
            op.base_mut()
                .cluster_http_request
                .result_collection
                .insert(host.to_string(), result);
        }
        (op, ctx)
    }

    #[tokio::test]
    async fn ready_when_all_hosts_up() {
        let (op, _ctx) = op_with_results(
            NodeStateTarget::Up,
            vec![
                ("h1", HostHttpResult::success("h1", 200, node_body("h1", "UP"))),
                ("h2", HostHttpResult::success("h2", 200, node_body("h2", "UP"))),
            ],
        )
        .await;
        assert!(matches!(op.evaluate_results().unwrap(), PollProgress::Ready));
    }

    #[tokio::test]
    async fn not_ready_while_one_host_lags() {
        let (op, _ctx) = op_with_results(
            NodeStateTarget::Up,
            vec![
                ("h1", HostHttpResult::success("h1", 200, node_body("h1", "UP"))),
                ("h2", HostHttpResult::success("h2", 200, node_body("h2", "INITIALIZING"))),
            ],
        )
        .await;
        assert!(matches!(op.evaluate_results().unwrap(), PollProgress::NotYet));
    }

    #[tokio::test]
    async fn transport_errors_count_as_down() {
        let (op, _ctx) = op_with_results(
            NodeStateTarget::Down,
            vec![
                ("h1", HostHttpResult::exception("h1", "connection refused".to_string())),
                ("h2", HostHttpResult::success("h2", 200, node_body("h2", "DOWN"))),
            ],
        )
        .await;
        assert!(matches!(op.evaluate_results().unwrap(), PollProgress::Ready));
    }

    #[tokio::test]
    async fn credential_error_aborts_polling() {
        let (op, _ctx) = op_with_results(
            NodeStateTarget::Up,
            vec![(
                "h1",
                HostHttpResult::failure("h1", 401, "Wrong password".to_string()),
            )],
        )
        .await;
        let err = op.evaluate_results().unwrap_err();
        assert!(matches!(err, OpsError::Auth { .. }));
    }

    #[tokio::test]
    async fn times_out_against_unreachable_hosts() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let host = listener.local_addr().unwrap().to_string();
        drop(listener);

        let mut op = HttpsPollNodeStateOp::new(
            &test_logger(),
            vec![host],
            false,
            "",
            None,
            Some(Duration::from_secs(1)),
            NodeStateTarget::Up,
        )
        .unwrap();
        let mut ctx = OpEngineExecContext::new(&test_logger());
        op.prepare(&mut ctx).await.unwrap();
        let err = op.execute(&mut ctx).await.unwrap_err();
        assert!(matches!(err, OpsError::Timeout { .. }));
    }
}

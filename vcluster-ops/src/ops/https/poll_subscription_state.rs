// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Poll shard subscriptions until every one reports ACTIVE
//! (Eon rebalance and unsandbox aftermath).

use crate::error::OpsError;
use crate::exec_context::OpEngineExecContext;
use crate::http_request::{HostHttpRequest, Method};
use crate::op::{parse_and_check_response, ClusterOp, HttpsAuth, OpBase};
use crate::ops::{DEFAULT_STATE_POLLING_TIMEOUT, POLL_INTERVAL};
use async_trait::async_trait;
use serde::Deserialize;
use slog::{info, Logger};
use tokio::time::Instant;

#[derive(Debug, Default, Deserialize)]
struct SubscriptionList {
    #[serde(default)]
    subscription_list: Vec<SubscriptionInfo>,
}

#[derive(Debug, Deserialize)]
struct SubscriptionInfo {
    #[allow(dead_code)]
    node_name: String,
    #[allow(dead_code)]
    shard_name: String,
    subscription_state: String,
}

pub struct HttpsPollSubscriptionStateOp {
    base: OpBase,
    auth: HttpsAuth,
}

impl HttpsPollSubscriptionStateOp {
    pub fn new(
        log: &Logger,
        hosts: Vec<String>,
        use_password: bool,
        username: &str,
        password: Option<&String>,
    ) -> Result<Self, OpsError> {
        let auth =
            HttpsAuth::new("HTTPSPollSubscriptionStateOp", use_password, username, password)?;
        Ok(HttpsPollSubscriptionStateOp {
            base: OpBase::new("HTTPSPollSubscriptionStateOp", log, hosts),
            auth,
        })
    }

    /// `Some(true)` when a host reports all subscriptions ACTIVE,
    /// `Some(false)` when a host answered but subscriptions are still
    /// settling, `None` when no host gave a usable answer.
    fn evaluate_results(&self) -> Result<Option<bool>, OpsError> {
        let name = self.name();
        for result in self.base.results().values() {
            self.log_response(result);
            if result.is_password_and_certificate_error() {
                return Err(OpsError::Auth {
                    op: name.to_string(),
                    source: result.err.clone().expect("unauthorized results carry an error"),
                });
            }
            if !result.is_passing() {
                continue;
            }
            let list: SubscriptionList =
                match parse_and_check_response(name, &result.host, &result.content) {
                    Ok(list) => list,
                    Err(e) => return Err(OpsError::semantic(name, e.to_string())),
                };
            let all_active =
                list.subscription_list.iter().all(|s| s.subscription_state == "ACTIVE");
            return Ok(Some(all_active));
        }
        Ok(None)
    }
}

#[async_trait]
impl ClusterOp for HttpsPollSubscriptionStateOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    async fn prepare(&mut self, ctx: &mut OpEngineExecContext) -> Result<(), OpsError> {
        ctx.dispatcher.setup(&self.base.hosts);
        let hosts = self.base.hosts.clone();
        for host in &hosts {
            let request =
                self.auth.apply(HostHttpRequest::https(Method::GET, "subscriptions"));
            self.base.register_request(host, request);
        }
        Ok(())
    }

    async fn execute(&mut self, ctx: &mut OpEngineExecContext) -> Result<(), OpsError> {
        let start = Instant::now();
        loop {
            self.run_execute(ctx).await;
            if let Some(true) = self.evaluate_results()? {
                info!(self.base.log, "all subscriptions are ACTIVE");
                return Ok(());
            }
            let elapsed = start.elapsed();
            if elapsed + POLL_INTERVAL > DEFAULT_STATE_POLLING_TIMEOUT {
                return Err(OpsError::Timeout {
                    op: self.name().to_string(),
                    elapsed,
                    message: "not all subscriptions reached ACTIVE".to_string(),
                });
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    fn process_result(&mut self, _ctx: &mut OpEngineExecContext) -> Result<(), OpsError> {
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

    #[tokio::test]
    async fn active_subscriptions_finish_polling() {
        let mut op = HttpsPollSubscriptionStateOp::new(
            &test_logger(),
            vec!["h1".to_string()],
            false,
            "",
            None,
        )
        .unwrap();
        let mut ctx = OpEngineExecContext::new(&test_logger());
        op.prepare(&mut ctx).await.unwrap();
        let body = json!({"subscription_list": [
            {"node_name": "n1", "shard_name": "replica", "subscription_state": "ACTIVE"},
            {"node_name": "n1", "shard_name": "segment0001", "subscription_state": "ACTIVE"},
        ]})
        .to_string();
        op.base_mut()
            .cluster_http_request
            .result_collection
            .insert("h1".to_string(), HostHttpResult::success("h1", 200, body));
        assert_eq!(op.evaluate_results().unwrap(), Some(true));
    }

    #[tokio::test]
    async fn pending_subscriptions_keep_polling() {
        let mut op = HttpsPollSubscriptionStateOp::new(
            &test_logger(),
            vec!["h1".to_string()],
            false,
            "",
            None,
        )
        .unwrap();
        let mut ctx = OpEngineExecContext::new(&test_logger());
        op.prepare(&mut ctx).await.unwrap();
        let body = json!({"subscription_list": [
            {"node_name": "n1", "shard_name": "replica", "subscription_state": "PENDING"},
        ]})
        .to_string();
        op.base_mut()
            .cluster_http_request
            .result_collection
            .insert("h1".to_string(), HostHttpResult::success("h1", 200, body));
        assert_eq!(op.evaluate_results().unwrap(), Some(false));
    }
}

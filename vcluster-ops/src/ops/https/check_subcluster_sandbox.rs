// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Work out which up hosts may initiate a sandbox operation: hosts
//! outside the target subcluster and outside any sandbox.

use crate::error::OpsError;
use crate::exec_context::OpEngineExecContext;
use crate::http_request::{HostHttpRequest, Method};
use crate::op::{parse_and_check_response, ClusterOp, HttpsAuth, OpBase};
use crate::ops::https::NodesResponse;
use async_trait::async_trait;
use slog::{info, Logger};

pub struct HttpsCheckSubclusterSandboxOp {
    base: OpBase,
    auth: HttpsAuth,
    sc_name: String,
    sandbox_name: String,
    sandboxing_hosts: Vec<String>,
}

impl HttpsCheckSubclusterSandboxOp {
    pub fn new(
        log: &Logger,
        use_password: bool,
        username: &str,
        password: Option<&String>,
        sc_name: &str,
        sandbox_name: &str,
    ) -> Result<Self, OpsError> {
        let auth =
            HttpsAuth::new("HTTPSCheckSubclusterSandboxOp", use_password, username, password)?;
        Ok(HttpsCheckSubclusterSandboxOp {
            base: OpBase::new("HTTPSCheckSubclusterSandboxOp", log, vec![]),
            auth,
            sc_name: sc_name.to_string(),
            sandbox_name: sandbox_name.to_string(),
            sandboxing_hosts: Vec::new(),
        })
    }
}

#[async_trait]
impl ClusterOp for HttpsCheckSubclusterSandboxOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    async fn prepare(&mut self, ctx: &mut OpEngineExecContext) -> Result<(), OpsError> {
        if ctx.up_hosts.is_empty() {
            return Err(OpsError::internal(
                self.name(),
                "no up hosts available to inspect sandbox membership",
            ));
        }
        self.base.hosts = ctx.up_hosts.clone();
        ctx.dispatcher.setup(&self.base.hosts);
        let hosts = self.base.hosts.clone();
        for host in &hosts {
            let request = self.auth.apply(HostHttpRequest::https(Method::GET, "nodes"));
            self.base.register_request(host, request);
        }
        Ok(())
    }

    fn process_result(&mut self, ctx: &mut OpEngineExecContext) -> Result<(), OpsError> {
        let name = self.name();
        for result in self.base.results().values() {
            self.log_response(result);
            if result.is_unauthorized() {
                return Err(OpsError::Auth {
                    op: name.to_string(),
                    source: result.err.clone().expect("unauthorized results carry an error"),
                });
            }
            if !result.is_passing() {
                continue;
            }
            let response: NodesResponse =
                parse_and_check_response(name, &result.host, &result.content)
                    .map_err(|e| OpsError::semantic(name, e.to_string()))?;

            let mut eligible = Vec::new();
            for node in &response.node_list {
                let in_target_sc = node.subcluster_name == self.sc_name;
                let sandboxed = !node.sandbox.is_empty();
                if node.state == "UP"
                    && !in_target_sc
                    && !sandboxed
                    && ctx.up_hosts.contains(&node.address)
                {
                    eligible.push(node.address.clone());
                }
            }
            if eligible.is_empty() {
                return Err(OpsError::precondition(format!(
                    "no up host outside subcluster {} and outside any sandbox can initiate \
                     sandbox {}",
                    self.sc_name, self.sandbox_name
                )));
            }
            eligible.sort();
            info!(self.base.log, "sandbox initiator candidates selected";
                "hosts" => ?eligible);
            self.sandboxing_hosts = eligible;
            return Ok(());
        }
        Err(OpsError::semantic(name, "no host answered the sandbox membership query"))
    }

    async fn finalize(&mut self, ctx: &mut OpEngineExecContext) -> Result<(), OpsError> {
        ctx.sandboxing_hosts = std::mem::take(&mut self.sandboxing_hosts);
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
    async fn initiators_exclude_target_sc_and_sandboxed_hosts() {
        let mut op = HttpsCheckSubclusterSandboxOp::new(
            &test_logger(),
            false,
            "",
            None,
            "sc1",
            "sb1",
        )
        .unwrap();
        let mut ctx = OpEngineExecContext::new(&test_logger());
        ctx.up_hosts =
            vec!["h1".to_string(), "h2".to_string(), "h3".to_string(), "h4".to_string()];
        op.prepare(&mut ctx).await.unwrap();
        let body = json!({"node_list": [
            {"name": "n1", "address": "h1", "state": "UP",
             "subcluster_name": "default_subcluster", "sandbox": ""},
            {"name": "n2", "address": "h2", "state": "UP",
             "subcluster_name": "sc1", "sandbox": ""},
            {"name": "n3", "address": "h3", "state": "UP",
             "subcluster_name": "sc2", "sandbox": "other_sandbox"},
            {"name": "n4", "address": "h4", "state": "UP",
             "subcluster_name": "sc3", "sandbox": ""},
        ]})
        .to_string();
        op.base_mut()
            .cluster_http_request
            .result_collection
            .insert("h1".to_string(), HostHttpResult::success("h1", 200, body));
        op.process_result(&mut ctx).unwrap();
        op.finalize(&mut ctx).await.unwrap();
        assert_eq!(ctx.sandboxing_hosts, vec!["h1".to_string(), "h4".to_string()]);
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Discover UP nodes through the engine. The first host that answers
//! with a node list wins; the UP set, per-node sandbox names, and (for
//! subcluster-aware callers) the target subcluster's hosts are
//! published to the context.

use crate::error::OpsError;
use crate::exec_context::OpEngineExecContext;
use crate::http_request::{HostHttpRequest, Method};
use crate::op::{parse_and_check_response, ClusterOp, HttpsAuth, OpBase};
use crate::ops::https::NodesResponse;
use async_trait::async_trait;
use slog::{info, Logger};
use std::collections::BTreeMap;

pub struct HttpsGetUpNodesOp {
    base: OpBase,
    auth: HttpsAuth,
    db_name: String,
    /// When set, the op also collects the hosts of this subcluster
    /// (sandbox/unsandbox commands).
    target_sc_name: Option<String>,
    up_hosts: Vec<String>,
    node_sandboxes: BTreeMap<String, String>,
    sc_hosts: Vec<String>,
}

impl HttpsGetUpNodesOp {
    pub fn new(
        log: &Logger,
        db_name: &str,
        hosts: Vec<String>,
        use_password: bool,
        username: &str,
        password: Option<&String>,
        target_sc_name: Option<String>,
    ) -> Result<Self, OpsError> {
        let auth = HttpsAuth::new("HTTPSGetUpNodesOp", use_password, username, password)?;
        Ok(HttpsGetUpNodesOp {
            base: OpBase::new("HTTPSGetUpNodesOp", log, hosts),
            auth,
            db_name: db_name.to_string(),
            target_sc_name,
            up_hosts: Vec::new(),
            node_sandboxes: BTreeMap::new(),
            sc_hosts: Vec::new(),
        })
    }
}

#[async_trait]
impl ClusterOp for HttpsGetUpNodesOp {
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
            let request = self.auth.apply(HostHttpRequest::https(Method::GET, "nodes"));
            self.base.register_request(host, request);
        }
        Ok(())
    }

    fn process_result(&mut self, _ctx: &mut OpEngineExecContext) -> Result<(), OpsError> {
        let name = self.name();
        let mut last_error: Option<OpsError> = None;
        for result in self.base.results().values() {
            self.log_response(result);
            if result.is_unauthorized() {
                // The same credentials will fail on every host.
                return Err(OpsError::Auth {
                    op: name.to_string(),
                    source: result.err.clone().expect("unauthorized results carry an error"),
                });
            }
            if !result.is_passing() {
                if let Some(err) = &result.err {
                    last_error = Some(OpsError::Hosts {
                        op: name.to_string(),
                        errors: {
                            let mut errors = crate::error::HostErrors::new();
                            errors.push(err.clone());
                            errors
                        },
                    });
                }
                continue;
            }
            let response: NodesResponse =
                match parse_and_check_response(name, &result.host, &result.content) {
                    Ok(response) => response,
                    Err(e) => {
                        last_error = Some(OpsError::semantic(name, e.to_string()));
                        continue;
                    }
                };

            let mut up_hosts = Vec::new();
            let mut sandboxes = BTreeMap::new();
            let mut sc_hosts = Vec::new();
            for node in &response.node_list {
                if node.state == "UP" {
                    up_hosts.push(node.address.clone());
                }
                sandboxes.insert(node.address.clone(), node.sandbox.clone());
                if Some(&node.subcluster_name) == self.target_sc_name.as_ref() {
                    sc_hosts.push(node.address.clone());
                }
            }
            if !up_hosts.is_empty() {
                up_hosts.sort();
                sc_hosts.sort();
                self.up_hosts = up_hosts;
                self.node_sandboxes = sandboxes;
                self.sc_hosts = sc_hosts;
                return Ok(());
            }
        }
        Err(last_error.unwrap_or_else(|| {
            OpsError::precondition(format!(
                "database {} does not have any UP node on the provided hosts",
                self.db_name
            ))
        }))
    }

    async fn finalize(&mut self, ctx: &mut OpEngineExecContext) -> Result<(), OpsError> {
        info!(self.base.log, "up nodes discovered"; "up_hosts" => ?self.up_hosts);
        ctx.up_hosts = std::mem::take(&mut self.up_hosts);
        ctx.node_sandboxes = std::mem::take(&mut self.node_sandboxes);
        ctx.sc_hosts = std::mem::take(&mut self.sc_hosts);
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

    fn nodes_body() -> String {
        json!({
            "node_list": [
                {"name": "v_db_node0001", "address": "h1", "state": "UP",
                 "subcluster_name": "default_subcluster", "sandbox": ""},
                {"name": "v_db_node0002", "address": "h2", "state": "UP",
                 "subcluster_name": "sc1", "sandbox": ""},
                {"name": "v_db_node0003", "address": "h3", "state": "DOWN",
                 "subcluster_name": "sc1", "sandbox": "sb1"},
            ]
        })
        .to_string()
    }

    #[tokio::test]
    async fn publishes_up_hosts_and_sandbox_map() {
        let mut op = HttpsGetUpNodesOp::new(
            &test_logger(),
            "db",
            vec!["h1".to_string()],
            false,
            "",
            None,
            Some("sc1".to_string()),
        )
        .unwrap();
        let mut ctx = OpEngineExecContext::new(&test_logger());
        op.prepare(&mut ctx).await.unwrap();
        op.base_mut()
            .cluster_http_request
            .result_collection
            .insert("h1".to_string(), HostHttpResult::success("h1", 200, nodes_body()));
        op.process_result(&mut ctx).unwrap();
        op.finalize(&mut ctx).await.unwrap();

        assert_eq!(ctx.up_hosts, vec!["h1".to_string(), "h2".to_string()]);
        assert_eq!(ctx.sc_hosts, vec!["h2".to_string(), "h3".to_string()]);
        assert_eq!(ctx.node_sandboxes["h3"], "sb1");
    }

    #[tokio::test]
    async fn unauthorized_short_circuits() {
        let mut op = HttpsGetUpNodesOp::new(
            &test_logger(),
            "db",
            vec!["h1".to_string(), "h2".to_string(), "h3".to_string()],
            true,
            "dbadmin",
            Some(&"wrong".to_string()),
            None,
        )
        .unwrap();
        let mut ctx = OpEngineExecContext::new(&test_logger());
        op.prepare(&mut ctx).await.unwrap();
        let results = &mut op.base_mut().cluster_http_request.result_collection;
        results.insert(
            "h1".to_string(),
            HostHttpResult::failure("h1", 401, "Wrong password".to_string()),
        );
        // The remaining hosts never answered; processing must not wait
        // on them.
        let err = op.process_result(&mut ctx).unwrap_err();
        assert!(matches!(err, OpsError::Auth { .. }));
    }
}

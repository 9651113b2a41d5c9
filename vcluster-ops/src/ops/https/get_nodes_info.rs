// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Fetch the node catalog from a running database and publish it as a
//! vdb snapshot. Used to seed commands from a live cluster and to
//! refresh addresses mid-plan after re-IP.

use crate::error::OpsError;
use crate::exec_context::OpEngineExecContext;
use crate::http_request::{HostHttpRequest, Method};
use crate::op::{parse_and_check_response, ClusterOp, HttpsAuth, OpBase};
use crate::ops::https::NodesResponse;
use crate::vdb::{
    AddressFamily, CoordinationDatabase, CoordinationNode, NodeState, DEFAULT_CLIENT_PORT,
};
use async_trait::async_trait;
use slog::Logger;

pub struct HttpsGetNodesInfoOp {
    base: OpBase,
    auth: HttpsAuth,
    db_name: String,
    nodes_info: Option<CoordinationDatabase>,
}

impl HttpsGetNodesInfoOp {
    pub fn new(
        log: &Logger,
        db_name: &str,
        hosts: Vec<String>,
        use_password: bool,
        username: &str,
        password: Option<&String>,
    ) -> Result<Self, OpsError> {
        let auth = HttpsAuth::new("HTTPSGetNodesInfoOp", use_password, username, password)?;
        Ok(HttpsGetNodesInfoOp {
            base: OpBase::new("HTTPSGetNodesInfoOp", log, hosts),
            auth,
            db_name: db_name.to_string(),
            nodes_info: None,
        })
    }
}

#[async_trait]
impl ClusterOp for HttpsGetNodesInfoOp {
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
                match parse_and_check_response(name, &result.host, &result.content) {
                    Ok(response) => response,
                    Err(_) => continue,
                };

            let mut vdb = CoordinationDatabase::new();
            vdb.name = self.db_name.clone();
            // Subcluster membership is an Eon concept; its presence in
            // the node list marks the database as Eon.
            vdb.is_eon =
                response.node_list.iter().any(|node| !node.subcluster_name.is_empty());
            for node in &response.node_list {
                let state = NodeState::from_wire(&node.state);
                vdb.add_node(CoordinationNode {
                    name: node.name.clone(),
                    address: node.address.clone(),
                    catalog_path: node.catalog_path.clone().into(),
                    storage_locations: vec![],
                    depot_path: None,
                    port: DEFAULT_CLIENT_PORT,
                    control_address_family: AddressFamily::default(),
                    is_primary: node.is_primary,
                    state,
                    subcluster: node.subcluster_name.clone(),
                })?;
                if node.is_primary && state == NodeState::Up {
                    vdb.primary_up_nodes.push(node.address.clone());
                }
            }
            self.nodes_info = Some(vdb);
            return Ok(());
        }
        Err(OpsError::precondition(format!(
            "could not get node information for database {} from any provided host",
            self.db_name
        )))
    }

    async fn finalize(&mut self, ctx: &mut OpEngineExecContext) -> Result<(), OpsError> {
        ctx.nodes_info = self.nodes_info.take();
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
    async fn builds_vdb_snapshot_with_primary_up_nodes() {
        let mut op = HttpsGetNodesInfoOp::new(
            &test_logger(),
            "db",
            vec!["h1".to_string()],
            false,
            "",
            None,
        )
        .unwrap();
        let mut ctx = OpEngineExecContext::new(&test_logger());
        op.prepare(&mut ctx).await.unwrap();
        let body = json!({
            "node_list": [
                {"name": "v_db_node0001", "address": "h1", "state": "UP",
                 "is_primary": true, "catalog_path": "/data/db/v_db_node0001_catalog",
                 "subcluster_name": "default_subcluster"},
                {"name": "v_db_node0002", "address": "h2", "state": "DOWN",
                 "is_primary": false, "catalog_path": "/data/db/v_db_node0002_catalog",
                 "subcluster_name": "sc1"},
            ]
        })
        .to_string();
        op.base_mut()
            .cluster_http_request
            .result_collection
            .insert("h1".to_string(), HostHttpResult::success("h1", 200, body));
        op.process_result(&mut ctx).unwrap();
        op.finalize(&mut ctx).await.unwrap();

        let vdb = ctx.nodes_info.as_ref().unwrap();
        assert_eq!(vdb.hosts().len(), 2);
        assert_eq!(vdb.primary_up_nodes, vec!["h1".to_string()]);
        assert_eq!(vdb.node("h2").unwrap().state, NodeState::Down);
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Node-info fetch from the NMA, used when the cluster-config file
//! cannot supply the topology (for example start_db after revive).
//! Each host reports its own node; finalize assembles the answers into
//! a vdb snapshot on the context.

use crate::error::{HostErrors, OpsError};
use crate::exec_context::OpEngineExecContext;
use crate::http_request::{HostHttpRequest, Method};
use crate::op::{parse_and_check_response, ClusterOp, OpBase};
use crate::vdb::{AddressFamily, CoordinationDatabase, CoordinationNode, NodeState};
use crate::vdb::DEFAULT_CLIENT_PORT;
use async_trait::async_trait;
use camino::Utf8PathBuf;
use serde::Deserialize;
use slog::{warn, Logger};
use std::collections::BTreeMap;

#[derive(Clone, Debug, Deserialize)]
struct NodeInfoResponse {
    name: String,
    #[serde(default)]
    catalog_path: String,
    #[serde(default)]
    subcluster: String,
    #[serde(default)]
    is_primary: bool,
}

pub struct NmaGetNodesInfoOp {
    base: OpBase,
    db_name: String,
    catalog_prefix: Utf8PathBuf,
    /// Internal errors from individual agents are tolerated when the
    /// caller only needs a best-effort topology.
    ignore_internal_errors: bool,
    nodes: BTreeMap<String, NodeInfoResponse>,
}

impl NmaGetNodesInfoOp {
    pub fn new(
        log: &Logger,
        hosts: Vec<String>,
        db_name: &str,
        catalog_prefix: &Utf8PathBuf,
        ignore_internal_errors: bool,
    ) -> Self {
        NmaGetNodesInfoOp {
            base: OpBase::new("NMAGetNodesInfoOp", log, hosts),
            db_name: db_name.to_string(),
            catalog_prefix: catalog_prefix.clone(),
            ignore_internal_errors,
            nodes: BTreeMap::new(),
        }
    }
}

#[async_trait]
impl ClusterOp for NmaGetNodesInfoOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    async fn prepare(&mut self, ctx: &mut OpEngineExecContext) -> Result<(), OpsError> {
        ctx.dispatcher.setup(&self.base.hosts);
        let hosts = self.base.hosts.clone();
        let db_name = self.db_name.clone();
        let catalog_prefix = self.catalog_prefix.to_string();
        for host in &hosts {
            let request = HostHttpRequest::nma(Method::GET, "nodes/info")
                .with_query("db_name", db_name.clone())
                .with_query("catalog_path", catalog_prefix.clone());
            self.base.register_request(host, request);
        }
        Ok(())
    }

    fn process_result(&mut self, _ctx: &mut OpEngineExecContext) -> Result<(), OpsError> {
        let name = self.name();
        let mut errors = HostErrors::new();
        let mut nodes = BTreeMap::new();
        for result in self.base.results().values() {
            self.log_response(result);
            if result.is_passing() {
                match parse_and_check_response::<NodeInfoResponse>(
                    name,
                    &result.host,
                    &result.content,
                ) {
                    Ok(node) => {
                        nodes.insert(result.host.clone(), node);
                    }
                    Err(e) => errors.push(e),
                }
            } else if result.is_internal_error() && self.ignore_internal_errors {
                warn!(self.base.log, "ignoring internal error from agent";
                    "host" => &result.host);
            } else if let Some(err) = &result.err {
                errors.push(err.clone());
            }
        }
        errors.into_result(name)?;
        self.nodes = nodes;
        Ok(())
    }

    async fn finalize(&mut self, ctx: &mut OpEngineExecContext) -> Result<(), OpsError> {
        let mut vdb = CoordinationDatabase::new();
        vdb.name = self.db_name.clone();
        vdb.catalog_prefix = self.catalog_prefix.clone();
        for (host, info) in &self.nodes {
            let node = CoordinationNode {
                name: info.name.clone(),
                address: host.clone(),
                catalog_path: info.catalog_path.clone().into(),
                storage_locations: vec![],
                depot_path: None,
                port: DEFAULT_CLIENT_PORT,
                control_address_family: AddressFamily::default(),
                is_primary: info.is_primary,
                state: NodeState::Unknown,
                subcluster: info.subcluster.clone(),
            };
            vdb.add_node(node)?;
        }
        ctx.nodes_info = Some(vdb);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::certs::HttpsCerts;
    use crate::engine::ClusterOpEngine;
    use httptest::{matchers::*, responders::*, Expectation, Server};
    use serde_json::json;

    fn test_logger() -> Logger {
        Logger::root(slog::Discard, slog::o!())
    }

    #[tokio::test]
    async fn assembles_topology_and_tolerates_internal_errors() {
        let good = Server::run();
        good.expect(
            Expectation::matching(request::method_path("GET", "/v1/nodes/info"))
                .respond_with(json_encoded(json!({
                    "name": "v_testdb_node0001",
                    "catalog_path": "/data/testdb/v_testdb_node0001_catalog",
                    "subcluster": "default_subcluster",
                    "is_primary": true,
                }))),
        );
        let broken = Server::run();
        broken.expect(Expectation::matching(any()).respond_with(status_code(500)));

        let hosts = vec![good.addr().to_string(), broken.addr().to_string()];
        let op = NmaGetNodesInfoOp::new(
            &test_logger(),
            hosts.clone(),
            "testdb",
            &"/data".into(),
            true,
        );
        let mut engine = ClusterOpEngine::new(vec![Box::new(op)], HttpsCerts::default());
        engine.run(&test_logger()).await.unwrap();

        let nodes_info = engine.exec_context().unwrap().nodes_info.as_ref().unwrap();
        assert_eq!(nodes_info.hosts(), &[hosts[0].clone()][..]);
        assert!(nodes_info.node(&hosts[0]).unwrap().is_primary);
    }
}

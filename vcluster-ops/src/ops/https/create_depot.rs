// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Create the depot on new nodes (Eon). Every target host must end up
//! with a depot at the expected location.

use crate::error::{HostError, HostErrors, OpsError};
use crate::exec_context::OpEngineExecContext;
use crate::http_request::{HostHttpRequest, Method};
use crate::op::{parse_map_response, ClusterOp, HttpsAuth, OpBase};
use crate::vdb::CoordinationDatabase;
use async_trait::async_trait;
use slog::Logger;

pub struct HttpsCreateNodesDepotOp {
    base: OpBase,
    auth: HttpsAuth,
    vdb: CoordinationDatabase,
}

impl HttpsCreateNodesDepotOp {
    pub fn new(
        log: &Logger,
        vdb: &CoordinationDatabase,
        nodes: Vec<String>,
        use_password: bool,
        username: &str,
        password: Option<&String>,
    ) -> Result<Self, OpsError> {
        let auth = HttpsAuth::new("HTTPSCreateNodesDepotOp", use_password, username, password)?;
        Ok(HttpsCreateNodesDepotOp {
            base: OpBase::new("HTTPSCreateNodesDepotOp", log, nodes),
            auth,
            vdb: vdb.clone(),
        })
    }
}

#[async_trait]
impl ClusterOp for HttpsCreateNodesDepotOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    async fn prepare(&mut self, ctx: &mut OpEngineExecContext) -> Result<(), OpsError> {
        let mut requests = Vec::new();
        for host in &self.base.hosts {
            let node = self.vdb.node(host).ok_or_else(|| {
                OpsError::internal(
                    self.name(),
                    format!("host {host} is not part of the database"),
                )
            })?;
            let depot_path = node.depot_path.as_ref().ok_or_else(|| {
                OpsError::internal(self.name(), format!("node {} has no depot path", node.name))
            })?;
            let endpoint = format!("nodes/{}/depot", node.name);
            let mut request = self
                .auth
                .apply(HostHttpRequest::https(Method::POST, &endpoint))
                .with_query("path", depot_path.to_string());
            if let Some(size) = &self.vdb.depot_size {
                request = request.with_query("size", size.clone());
            }
            requests.push((host.clone(), request));
        }
        ctx.dispatcher.setup(&self.base.hosts);
        for (host, request) in requests {
            self.base.register_request(&host, request);
        }
        Ok(())
    }

    fn process_result(&mut self, _ctx: &mut OpEngineExecContext) -> Result<(), OpsError> {
        let name = self.name();
        let mut errors = HostErrors::new();
        for result in self.base.results().values() {
            self.log_response(result);
            if result.is_unauthorized() {
                return Err(OpsError::Auth {
                    op: name.to_string(),
                    source: result.err.clone().expect("unauthorized results carry an error"),
                });
            }
            if !result.is_passing() {
                if let Some(err) = &result.err {
                    errors.push(err.clone());
                }
                continue;
            }
            // {"node": "...", "depot_location": "..."} - verify the
            // depot landed where the catalog expects it.
            match parse_map_response(name, &result.host, &result.content) {
                Ok(response) => {
                    let node = self.vdb.node(&result.host);
                    let expected_name = node.map(|n| n.name.as_str()).unwrap_or_default();
                    let expected_path = node
                        .and_then(|n| n.depot_path.as_ref())
                        .map(|p| p.to_string())
                        .unwrap_or_default();
                    let reported_name = response.get("node").cloned().unwrap_or_default();
                    let reported_path =
                        response.get("depot_location").cloned().unwrap_or_default();
                    if reported_name != expected_name || reported_path != expected_path {
                        errors.push(HostError::Response {
                            host: result.host.clone(),
                            detail: format!(
                                "expected depot {expected_path} on node {expected_name}, \
                                 engine reports depot {reported_path} on node {reported_name}"
                            ),
                        });
                    }
                }
                Err(e) => errors.push(e),
            }
        }
        errors.into_result(name)
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

    fn depot_vdb() -> CoordinationDatabase {
        let mut vdb = CoordinationDatabase {
            name: "db".to_string(),
            catalog_prefix: "/data".into(),
            data_prefix: "/data".into(),
            depot_prefix: Some("/depot".into()),
            is_eon: true,
            communal_storage_location: Some("s3://b/db".to_string()),
            ..Default::default()
        };
        vdb.add_hosts(&["h1".to_string()], "sc").unwrap();
        vdb
    }

    #[tokio::test]
    async fn misplaced_depot_is_an_error() {
        let vdb = depot_vdb();
        let mut op = HttpsCreateNodesDepotOp::new(
            &test_logger(),
            &vdb,
            vec!["h1".to_string()],
            false,
            "",
            None,
        )
        .unwrap();
        let mut ctx = OpEngineExecContext::new(&test_logger());
        op.prepare(&mut ctx).await.unwrap();
        let body = json!({"node": "v_db_node0001", "depot_location": "/wrong/path"}).to_string();
        op.base_mut()
            .cluster_http_request
            .result_collection
            .insert("h1".to_string(), HostHttpResult::success("h1", 200, body));
        assert!(op.process_result(&mut ctx).is_err());
    }

    #[tokio::test]
    async fn correct_depot_passes() {
        let vdb = depot_vdb();
        let mut op = HttpsCreateNodesDepotOp::new(
            &test_logger(),
            &vdb,
            vec!["h1".to_string()],
            false,
            "",
            None,
        )
        .unwrap();
        let mut ctx = OpEngineExecContext::new(&test_logger());
        op.prepare(&mut ctx).await.unwrap();
        let body = json!({
            "node": "v_db_node0001",
            "depot_location": "/depot/db/v_db_node0001_depot",
        })
        .to_string();
        op.base_mut()
            .cluster_http_request
            .result_collection
            .insert("h1".to_string(), HostHttpResult::success("h1", 200, body));
        op.process_result(&mut ctx).unwrap();
    }
}

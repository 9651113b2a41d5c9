// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Add new nodes to the catalog through the initiator. In Eon mode the
//! nodes land in a named subcluster; without one the default
//! subcluster discovered earlier in the plan is used.

use crate::error::OpsError;
use crate::exec_context::OpEngineExecContext;
use crate::http_request::{HostHttpRequest, Method};
use crate::op::{parse_and_check_response, ClusterOp, HttpsAuth, OpBase};
use crate::vdb::CoordinationDatabase;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use slog::Logger;

#[derive(Debug, Default, Deserialize)]
struct CreateNodeResponse {
    #[serde(default)]
    created_nodes: Vec<String>,
}

pub struct HttpsCreateNodeOp {
    base: OpBase,
    auth: HttpsAuth,
    vdb: CoordinationDatabase,
    new_hosts: Vec<String>,
    initiator: String,
    sc_name: String,
}

impl HttpsCreateNodeOp {
    pub fn new(
        log: &Logger,
        new_hosts: Vec<String>,
        initiator: &str,
        use_password: bool,
        username: &str,
        password: Option<&String>,
        vdb: CoordinationDatabase,
        sc_name: &str,
    ) -> Result<Self, OpsError> {
        let auth = HttpsAuth::new("HTTPSCreateNodeOp", use_password, username, password)?;
        Ok(HttpsCreateNodeOp {
            base: OpBase::new("HTTPSCreateNodeOp", log, vec![initiator.to_string()]),
            auth,
            vdb,
            new_hosts,
            initiator: initiator.to_string(),
            sc_name: sc_name.to_string(),
        })
    }
}

#[async_trait]
impl ClusterOp for HttpsCreateNodeOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    async fn prepare(&mut self, ctx: &mut OpEngineExecContext) -> Result<(), OpsError> {
        let sc_name = if self.sc_name.is_empty() {
            ctx.default_sc_name.clone().unwrap_or_default()
        } else {
            self.sc_name.clone()
        };
        if self.vdb.is_eon && sc_name.is_empty() {
            return Err(OpsError::internal(
                self.name(),
                "creating a node in an Eon database requires a subcluster name",
            ));
        }
        let mut body = json!({
            "db_name": self.vdb.name,
            "hosts": self.new_hosts,
            "catalog_prefix": self.vdb.catalog_prefix,
            "data_prefix": self.vdb.data_prefix,
        });
        if self.vdb.is_eon {
            body["subcluster"] = json!(sc_name);
        }
        if let Some(depot_prefix) = &self.vdb.depot_prefix {
            body["depot_prefix"] = json!(depot_prefix);
        }
        // Broadcast addresses, when a network-profile pass collected
        // them, let the engine pick control addressing per host.
        let broadcasts: Vec<String> = self
            .new_hosts
            .iter()
            .filter_map(|host| ctx.network_profiles.get(host))
            .map(|profile| profile.broadcast.clone())
            .collect();
        if broadcasts.len() == self.new_hosts.len() {
            body["broadcast"] = json!(broadcasts);
        }

        let initiator = self.initiator.clone();
        ctx.dispatcher.setup(&self.base.hosts);
        let request = self
            .auth
            .apply(HostHttpRequest::https(Method::POST, "nodes"))
            .with_body(body);
        self.base.register_request(&initiator, request);
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
            if let Some(err) = &result.err {
                let mut errors = crate::error::HostErrors::new();
                errors.push(err.clone());
                return errors.into_result(name);
            }
            let response: CreateNodeResponse =
                parse_and_check_response(name, &result.host, &result.content)
                    .map_err(|e| OpsError::semantic(name, e.to_string()))?;
            if response.created_nodes.len() != self.new_hosts.len() {
                return Err(OpsError::semantic(
                    name,
                    format!(
                        "expected {} created nodes but the engine reported {}",
                        self.new_hosts.len(),
                        response.created_nodes.len()
                    ),
                ));
            }
        }
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

    fn eon_vdb() -> CoordinationDatabase {
        CoordinationDatabase {
            name: "db".to_string(),
            catalog_prefix: "/data".into(),
            data_prefix: "/data".into(),
            is_eon: true,
            communal_storage_location: Some("s3://b/db".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn created_node_count_must_match() {
        let mut op = HttpsCreateNodeOp::new(
            &test_logger(),
            vec!["h2".to_string(), "h3".to_string()],
            "h1",
            false,
            "",
            None,
            eon_vdb(),
            "sc1",
        )
        .unwrap();
        let mut ctx = OpEngineExecContext::new(&test_logger());
        op.prepare(&mut ctx).await.unwrap();
        let body = json!({"created_nodes": ["v_db_node0002"]}).to_string();
        op.base_mut()
            .cluster_http_request
            .result_collection
            .insert("h1".to_string(), HostHttpResult::success("h1", 200, body));
        let err = op.process_result(&mut ctx).unwrap_err();
        assert!(matches!(err, OpsError::Semantic { .. }));
    }

    #[tokio::test]
    async fn eon_requires_a_subcluster() {
        let mut op = HttpsCreateNodeOp::new(
            &test_logger(),
            vec!["h2".to_string()],
            "h1",
            false,
            "",
            None,
            eon_vdb(),
            "",
        )
        .unwrap();
        let mut ctx = OpEngineExecContext::new(&test_logger());
        let err = op.prepare(&mut ctx).await.unwrap_err();
        assert!(matches!(err, OpsError::Internal { .. }));
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Create catalog/data/depot directories on the target hosts before a
//! node exists there. Without `force_cleanup` the agent refuses
//! non-empty target paths, and so does the plan.

use crate::error::{HostErrors, OpsError};
use crate::exec_context::OpEngineExecContext;
use crate::http_request::{HostHttpRequest, Method};
use crate::op::{parse_map_response, ClusterOp, OpBase};
use crate::vdb::CoordinationNode;
use async_trait::async_trait;
use serde_json::json;
use slog::Logger;
use std::collections::BTreeMap;

pub struct NmaPrepareDirectoriesOp {
    base: OpBase,
    host_nodes: BTreeMap<String, CoordinationNode>,
    force_cleanup: bool,
    for_db_revive: bool,
}

impl NmaPrepareDirectoriesOp {
    pub fn new(
        log: &Logger,
        host_nodes: BTreeMap<String, CoordinationNode>,
        force_cleanup: bool,
        for_db_revive: bool,
    ) -> Self {
        let hosts = host_nodes.keys().cloned().collect();
        NmaPrepareDirectoriesOp {
            base: OpBase::new("NMAPrepareDirectoriesOp", log, hosts),
            host_nodes,
            force_cleanup,
            for_db_revive,
        }
    }
}

#[async_trait]
impl ClusterOp for NmaPrepareDirectoriesOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    async fn prepare(&mut self, ctx: &mut OpEngineExecContext) -> Result<(), OpsError> {
        ctx.dispatcher.setup(&self.base.hosts);
        let mut requests = Vec::new();
        for (host, node) in &self.host_nodes {
            let body = json!({
                "catalog_path": node.catalog_path,
                "data_paths": node.storage_locations,
                "depot_path": node.depot_path,
                "force_cleanup": self.force_cleanup,
                "for_db_revive": self.for_db_revive,
            });
            requests.push((
                host.clone(),
                HostHttpRequest::nma(Method::POST, "directories/prepare").with_body(body),
            ));
        }
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
            if result.is_passing() {
                if let Err(e) = parse_map_response(name, &result.host, &result.content) {
                    errors.push(e);
                }
            } else if let Some(err) = &result.err {
                errors.push(err.clone());
            }
        }
        errors.into_result(name)
    }
}

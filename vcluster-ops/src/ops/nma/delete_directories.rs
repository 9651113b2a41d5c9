// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Remove a node's catalog/data/depot directories. Commands place this
//! operation last so that an earlier failure never leaves a half-
//! deleted database.

use crate::error::{HostErrors, OpsError};
use crate::exec_context::OpEngineExecContext;
use crate::http_request::{HostHttpRequest, Method};
use crate::op::{ClusterOp, OpBase};
use crate::vdb::CoordinationDatabase;
use async_trait::async_trait;
use serde_json::json;
use slog::Logger;

pub struct NmaDeleteDirectoriesOp {
    base: OpBase,
    vdb: CoordinationDatabase,
    force_delete: bool,
}

impl NmaDeleteDirectoriesOp {
    /// Targets every host in `vdb`; restrict the vdb first to delete a
    /// subset (remove_node).
    pub fn new(log: &Logger, vdb: CoordinationDatabase, force_delete: bool) -> Self {
        let hosts = vdb.hosts().to_vec();
        NmaDeleteDirectoriesOp {
            base: OpBase::new("NMADeleteDirectoriesOp", log, hosts),
            vdb,
            force_delete,
        }
    }
}

#[async_trait]
impl ClusterOp for NmaDeleteDirectoriesOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    async fn prepare(&mut self, ctx: &mut OpEngineExecContext) -> Result<(), OpsError> {
        ctx.dispatcher.setup(&self.base.hosts);
        let mut requests = Vec::new();
        for host in self.vdb.hosts() {
            let node = self.vdb.node(host).expect("host list and node map are consistent");
            let mut directories = vec![node.catalog_path.to_string()];
            directories.extend(node.storage_locations.iter().map(|p| p.to_string()));
            if let Some(depot) = &node.depot_path {
                directories.push(depot.to_string());
            }
            let body = json!({
                "directories": directories,
                "force_delete": self.force_delete,
            });
            requests.push((
                host.clone(),
                HostHttpRequest::nma(Method::POST, "directories/delete").with_body(body),
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
            if !result.is_passing() {
                if let Some(err) = &result.err {
                    errors.push(err.clone());
                }
            }
        }
        errors.into_result(name)
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Ask the NMA to start (or restart) the engine process on each target
//! host. When `startup_conf` is set the agent persists the start
//! command at that path instead of executing it, for environments where
//! the engine runs in a separate container.

use crate::error::{HostErrors, OpsError};
use crate::exec_context::OpEngineExecContext;
use crate::http_request::{HostHttpRequest, Method};
use crate::op::{parse_map_response, ClusterOp, OpBase};
use crate::ops::effective_vdb;
use crate::vdb::CoordinationDatabase;
use async_trait::async_trait;
use serde_json::json;
use slog::Logger;

pub struct NmaStartNodeOp {
    base: OpBase,
    vdb: CoordinationDatabase,
    startup_conf: String,
}

impl NmaStartNodeOp {
    pub fn new(log: &Logger, hosts: Vec<String>, startup_conf: &str) -> Self {
        Self::with_vdb(log, hosts, startup_conf, CoordinationDatabase::new())
    }

    /// The vdb maps hosts to node names so start commands fetched from
    /// a running node can be matched to their hosts.
    pub fn with_vdb(
        log: &Logger,
        hosts: Vec<String>,
        startup_conf: &str,
        vdb: CoordinationDatabase,
    ) -> Self {
        NmaStartNodeOp {
            base: OpBase::new("NMAStartNodeOp", log, hosts),
            vdb,
            startup_conf: startup_conf.to_string(),
        }
    }
}

#[async_trait]
impl ClusterOp for NmaStartNodeOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    async fn prepare(&mut self, ctx: &mut OpEngineExecContext) -> Result<(), OpsError> {
        let hosts = self.base.hosts.clone();
        let mut requests = Vec::new();
        {
            let vdb = effective_vdb(&self.vdb, ctx);
            for host in &hosts {
                // The start command fetched from a running node takes
                // precedence; without one the agent derives the command
                // from the local catalog.
                let start_command = vdb
                    .node(host)
                    .and_then(|node| ctx.startup_commands.get(&node.name))
                    .cloned();
                let mut body = json!({
                    "startup_conf": self.startup_conf,
                });
                if let Some(argv) = start_command {
                    body["start_command"] = json!(argv);
                }
                requests.push((
                    host.clone(),
                    HostHttpRequest::nma(Method::POST, "nodes/start").with_body(body),
                ));
            }
        }
        ctx.dispatcher.setup(&hosts);
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

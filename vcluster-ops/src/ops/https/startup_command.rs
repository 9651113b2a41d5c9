// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Fetch per-node start commands from a running node, so the NMA can
//! restart nodes exactly the way the cluster expects.

use crate::error::OpsError;
use crate::exec_context::OpEngineExecContext;
use crate::http_request::{HostHttpRequest, Method};
use crate::op::{parse_and_check_response, ClusterOp, HttpsAuth, OpBase};
use async_trait::async_trait;
use slog::Logger;
use std::collections::BTreeMap;

pub struct HttpsStartUpCommandOp {
    base: OpBase,
    auth: HttpsAuth,
    startup_commands: BTreeMap<String, Vec<String>>,
}

impl HttpsStartUpCommandOp {
    /// With an empty host list the source node is resolved at prepare
    /// time from the up hosts discovered earlier in the plan.
    pub fn new(
        log: &Logger,
        hosts: Vec<String>,
        use_password: bool,
        username: &str,
        password: Option<&String>,
    ) -> Result<Self, OpsError> {
        let auth = HttpsAuth::new("HTTPSStartUpCommandOp", use_password, username, password)?;
        Ok(HttpsStartUpCommandOp {
            base: OpBase::new("HTTPSStartUpCommandOp", log, hosts),
            auth,
            startup_commands: BTreeMap::new(),
        })
    }
}

#[async_trait]
impl ClusterOp for HttpsStartUpCommandOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    async fn prepare(&mut self, ctx: &mut OpEngineExecContext) -> Result<(), OpsError> {
        let initiator = match self.base.hosts.first() {
            Some(host) => host.clone(),
            None => ctx.up_hosts.first().cloned().ok_or_else(|| {
                OpsError::internal(self.name(), "no up host available to fetch start commands")
            })?,
        };
        self.base.hosts = vec![initiator.clone()];
        ctx.dispatcher.setup(&self.base.hosts);
        let request = self.auth.apply(HostHttpRequest::https(Method::GET, "startup/command"));
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
            // {"v_db_node0001": ["/opt/vertica/bin/vertica", "-D", ...], ...}
            let commands: BTreeMap<String, Vec<String>> =
                parse_and_check_response(name, &result.host, &result.content)
                    .map_err(|e| OpsError::semantic(name, e.to_string()))?;
            self.startup_commands = commands;
            return Ok(());
        }
        Err(OpsError::semantic(name, "no host answered the start command fetch"))
    }

    async fn finalize(&mut self, ctx: &mut OpEngineExecContext) -> Result<(), OpsError> {
        ctx.startup_commands = std::mem::take(&mut self.startup_commands);
        Ok(())
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Reload the spread configuration through one up host after node
//! membership or addressing changed.

use crate::error::OpsError;
use crate::exec_context::OpEngineExecContext;
use crate::http_request::{HostHttpRequest, Method};
use crate::op::{parse_map_response, ClusterOp, HttpsAuth, OpBase};
use async_trait::async_trait;
use slog::Logger;

pub struct HttpsReloadSpreadOp {
    base: OpBase,
    auth: HttpsAuth,
}

impl HttpsReloadSpreadOp {
    /// With an empty host list the initiator is resolved at prepare
    /// time from the up hosts discovered earlier in the plan.
    pub fn new(
        log: &Logger,
        hosts: Vec<String>,
        use_password: bool,
        username: &str,
        password: Option<&String>,
    ) -> Result<Self, OpsError> {
        let auth = HttpsAuth::new("HTTPSReloadSpreadOp", use_password, username, password)?;
        Ok(HttpsReloadSpreadOp { base: OpBase::new("HTTPSReloadSpreadOp", log, hosts), auth })
    }
}

#[async_trait]
impl ClusterOp for HttpsReloadSpreadOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    async fn prepare(&mut self, ctx: &mut OpEngineExecContext) -> Result<(), OpsError> {
        let hosts = if self.base.hosts.is_empty() {
            match ctx.up_hosts.first() {
                Some(host) => vec![host.clone()],
                None => {
                    return Err(OpsError::internal(
                        self.name(),
                        "no up host available to reload spread",
                    ))
                }
            }
        } else {
            vec![self.base.hosts[0].clone()]
        };
        self.base.hosts = hosts.clone();
        ctx.dispatcher.setup(&self.base.hosts);
        for host in &hosts {
            let request =
                self.auth.apply(HostHttpRequest::https(Method::POST, "spread/reload"));
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
                if let Some(err) = &result.err {
                    let mut errors = crate::error::HostErrors::new();
                    errors.push(err.clone());
                    return errors.into_result(name);
                }
                continue;
            }
            parse_map_response(name, &result.host, &result.content)
                .map_err(|e| OpsError::semantic(name, e.to_string()))?;
            return Ok(());
        }
        Err(OpsError::semantic(name, "no host answered the spread reload"))
    }
}

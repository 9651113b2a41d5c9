// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Flush the catalog to communal storage through one up host
//! (Eon only).

use crate::error::OpsError;
use crate::exec_context::OpEngineExecContext;
use crate::http_request::{HostHttpRequest, Method};
use crate::op::{parse_map_response, ClusterOp, HttpsAuth, OpBase};
use async_trait::async_trait;
use slog::Logger;

pub struct HttpsSyncCatalogOp {
    base: OpBase,
    auth: HttpsAuth,
    /// Why the sync is happening; forwarded to the engine for audit.
    reason: &'static str,
}

impl HttpsSyncCatalogOp {
    pub fn new(
        log: &Logger,
        hosts: Vec<String>,
        use_password: bool,
        username: &str,
        password: Option<&String>,
        reason: &'static str,
    ) -> Result<Self, OpsError> {
        let auth = HttpsAuth::new("HTTPSSyncCatalogOp", use_password, username, password)?;
        Ok(HttpsSyncCatalogOp {
            base: OpBase::new("HTTPSSyncCatalogOp", log, hosts),
            auth,
            reason,
        })
    }
}

#[async_trait]
impl ClusterOp for HttpsSyncCatalogOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    async fn prepare(&mut self, ctx: &mut OpEngineExecContext) -> Result<(), OpsError> {
        // Any single up host can drive the sync; prefer one discovered
        // earlier in the plan over the construction-time host list.
        let hosts = if self.base.hosts.is_empty() {
            match ctx.up_hosts.first() {
                Some(host) => vec![host.clone()],
                None => {
                    return Err(OpsError::internal(
                        self.name(),
                        "no up host available to sync the catalog",
                    ))
                }
            }
        } else {
            vec![self.base.hosts[0].clone()]
        };
        self.base.hosts = hosts.clone();
        ctx.dispatcher.setup(&self.base.hosts);
        for host in &hosts {
            let request = self
                .auth
                .apply(HostHttpRequest::https(Method::POST, "catalog/sync"))
                .with_query("reason", self.reason);
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
            // Response carries the new truncation version; presence is
            // all the plan needs.
            parse_map_response(name, &result.host, &result.content)
                .map_err(|e| OpsError::semantic(name, e.to_string()))?;
            return Ok(());
        }
        Err(OpsError::semantic(name, "no host answered the catalog sync"))
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Pause client connections and drain active sessions before shutdown
//! or node removal (Eon).

use crate::error::OpsError;
use crate::exec_context::OpEngineExecContext;
use crate::http_request::{HostHttpRequest, Method};
use crate::op::{ClusterOp, HttpsAuth, OpBase};
use async_trait::async_trait;
use serde_json::json;
use slog::Logger;

pub struct HttpsDrainSubclusterOp {
    base: OpBase,
    auth: HttpsAuth,
    /// Empty string drains the whole database.
    sc_name: String,
    drain_seconds: u64,
}

impl HttpsDrainSubclusterOp {
    pub fn new(
        log: &Logger,
        use_password: bool,
        username: &str,
        password: Option<&String>,
        sc_name: &str,
        drain_seconds: u64,
    ) -> Result<Self, OpsError> {
        let auth = HttpsAuth::new("HTTPSDrainSubclusterOp", use_password, username, password)?;
        Ok(HttpsDrainSubclusterOp {
            base: OpBase::new("HTTPSDrainSubclusterOp", log, vec![]),
            auth,
            sc_name: sc_name.to_string(),
            drain_seconds,
        })
    }
}

#[async_trait]
impl ClusterOp for HttpsDrainSubclusterOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    async fn prepare(&mut self, ctx: &mut OpEngineExecContext) -> Result<(), OpsError> {
        let initiator = ctx.up_hosts.first().cloned().ok_or_else(|| {
            OpsError::internal(self.name(), "no up host available to drain connections")
        })?;
        self.base.hosts = vec![initiator.clone()];
        ctx.dispatcher.setup(&self.base.hosts);
        let body = json!({
            "subcluster": self.sc_name,
            "timeout_seconds": self.drain_seconds,
        });
        let request = self
            .auth
            .apply(HostHttpRequest::https(Method::POST, "drain"))
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
        }
        Ok(())
    }
}

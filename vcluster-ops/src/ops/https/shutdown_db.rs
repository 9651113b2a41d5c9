// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Shut the database down through one up host. With `force_kill` the
//! engine kills sessions instead of waiting for them.

use crate::error::OpsError;
use crate::exec_context::OpEngineExecContext;
use crate::http_request::{HostHttpRequest, Method};
use crate::op::{ClusterOp, HttpsAuth, OpBase};
use async_trait::async_trait;
use serde_json::json;
use slog::{info, Logger};

pub struct HttpsShutdownDbOp {
    base: OpBase,
    auth: HttpsAuth,
    db_name: String,
    force_kill: bool,
}

impl HttpsShutdownDbOp {
    pub fn new(
        log: &Logger,
        db_name: &str,
        use_password: bool,
        username: &str,
        password: Option<&String>,
        force_kill: bool,
    ) -> Result<Self, OpsError> {
        let auth = HttpsAuth::new("HTTPSShutdownDBOp", use_password, username, password)?;
        Ok(HttpsShutdownDbOp {
            base: OpBase::new("HTTPSShutdownDBOp", log, vec![]),
            auth,
            db_name: db_name.to_string(),
            force_kill,
        })
    }
}

#[async_trait]
impl ClusterOp for HttpsShutdownDbOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    async fn prepare(&mut self, ctx: &mut OpEngineExecContext) -> Result<(), OpsError> {
        let initiator = ctx.up_hosts.first().cloned().ok_or_else(|| {
            OpsError::precondition(format!(
                "database {} has no up node to shut down through",
                self.db_name
            ))
        })?;
        info!(self.base.log, "shutting down the database";
            "db" => &self.db_name, "initiator" => &initiator, "force_kill" => self.force_kill);
        self.base.hosts = vec![initiator.clone()];
        ctx.dispatcher.setup(&self.base.hosts);
        let request = self
            .auth
            .apply(HostHttpRequest::https(Method::POST, "drop"))
            .with_body(json!({"force_kill": self.force_kill}));
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

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Set the design k-safety. Commands pick 0 or 1 from the alive host
//! count before shrinking the cluster.

use crate::error::OpsError;
use crate::exec_context::OpEngineExecContext;
use crate::http_request::{HostHttpRequest, Method};
use crate::op::{ClusterOp, HttpsAuth, OpBase};
use async_trait::async_trait;
use serde_json::json;
use slog::Logger;

pub struct HttpsMarkDesignKSafeOp {
    base: OpBase,
    auth: HttpsAuth,
    ksafe_value: u32,
}

impl HttpsMarkDesignKSafeOp {
    pub fn new(
        log: &Logger,
        initiator: Vec<String>,
        use_password: bool,
        username: &str,
        password: Option<&String>,
        ksafe_value: u32,
    ) -> Result<Self, OpsError> {
        if ksafe_value > 1 {
            return Err(OpsError::validation(format!(
                "design k-safety can only be marked 0 or 1, not {ksafe_value}"
            )));
        }
        let auth = HttpsAuth::new("HTTPSMarkDesignKSafeOp", use_password, username, password)?;
        Ok(HttpsMarkDesignKSafeOp {
            base: OpBase::new("HTTPSMarkDesignKSafeOp", log, initiator),
            auth,
            ksafe_value,
        })
    }
}

#[async_trait]
impl ClusterOp for HttpsMarkDesignKSafeOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    async fn prepare(&mut self, ctx: &mut OpEngineExecContext) -> Result<(), OpsError> {
        ctx.dispatcher.setup(&self.base.hosts);
        let hosts = self.base.hosts.clone();
        for host in &hosts {
            let request = self
                .auth
                .apply(HostHttpRequest::https(Method::PUT, "cluster/k-safety"))
                .with_body(json!({"k": self.ksafe_value}));
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
            if let Some(err) = &result.err {
                let mut errors = crate::error::HostErrors::new();
                errors.push(err.clone());
                return errors.into_result(name);
            }
        }
        Ok(())
    }
}

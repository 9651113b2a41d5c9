// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Create a named subcluster through an up host (Eon).

use crate::error::OpsError;
use crate::exec_context::OpEngineExecContext;
use crate::http_request::{HostHttpRequest, Method};
use crate::op::{ClusterOp, HttpsAuth, OpBase};
use async_trait::async_trait;
use serde_json::json;
use slog::Logger;

pub struct HttpsCreateSubclusterOp {
    base: OpBase,
    auth: HttpsAuth,
    sc_name: String,
    is_primary: bool,
    control_set_size: Option<i64>,
}

impl HttpsCreateSubclusterOp {
    pub fn new(
        log: &Logger,
        use_password: bool,
        username: &str,
        password: Option<&String>,
        sc_name: &str,
        is_primary: bool,
        control_set_size: Option<i64>,
    ) -> Result<Self, OpsError> {
        let auth = HttpsAuth::new("HTTPSCreateSubclusterOp", use_password, username, password)?;
        Ok(HttpsCreateSubclusterOp {
            base: OpBase::new("HTTPSCreateSubclusterOp", log, vec![]),
            auth,
            sc_name: sc_name.to_string(),
            is_primary,
            control_set_size,
        })
    }
}

#[async_trait]
impl ClusterOp for HttpsCreateSubclusterOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    async fn prepare(&mut self, ctx: &mut OpEngineExecContext) -> Result<(), OpsError> {
        let initiator = ctx.up_hosts.first().cloned().ok_or_else(|| {
            OpsError::internal(self.name(), "no up host available to create the subcluster")
        })?;
        let mut body = json!({
            "subcluster_name": self.sc_name,
            "is_secondary": !self.is_primary,
        });
        if let Some(size) = self.control_set_size {
            body["control_set_size"] = json!(size);
        }
        self.base.hosts = vec![initiator.clone()];
        ctx.dispatcher.setup(&self.base.hosts);
        let request = self
            .auth
            .apply(HostHttpRequest::https(Method::POST, "subclusters"))
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

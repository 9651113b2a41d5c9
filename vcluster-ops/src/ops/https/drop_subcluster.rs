// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Drop a subcluster from the catalog through the initiator.

use crate::error::OpsError;
use crate::exec_context::OpEngineExecContext;
use crate::http_request::{HostHttpRequest, Method};
use crate::op::{ClusterOp, HttpsAuth, OpBase};
use async_trait::async_trait;
use slog::Logger;

pub struct HttpsDropSubclusterOp {
    base: OpBase,
    auth: HttpsAuth,
    sc_name: String,
}

impl HttpsDropSubclusterOp {
    pub fn new(
        log: &Logger,
        use_password: bool,
        username: &str,
        password: Option<&String>,
        sc_name: &str,
    ) -> Result<Self, OpsError> {
        let auth = HttpsAuth::new("HTTPSDropSubclusterOp", use_password, username, password)?;
        Ok(HttpsDropSubclusterOp {
            base: OpBase::new("HTTPSDropSubclusterOp", log, vec![]),
            auth,
            sc_name: sc_name.to_string(),
        })
    }
}

#[async_trait]
impl ClusterOp for HttpsDropSubclusterOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    async fn prepare(&mut self, ctx: &mut OpEngineExecContext) -> Result<(), OpsError> {
        let initiator = ctx.up_hosts.first().cloned().ok_or_else(|| {
            OpsError::internal(self.name(), "no up host available to drop the subcluster")
        })?;
        self.base.hosts = vec![initiator.clone()];
        ctx.dispatcher.setup(&self.base.hosts);
        let endpoint = format!("subclusters/{}", self.sc_name);
        let request = self.auth.apply(HostHttpRequest::https(Method::DELETE, &endpoint));
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

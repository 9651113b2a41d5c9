// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Drop one node from the catalog through the initiator. An UP node is
//! refused; callers stop or drain it first.

use crate::error::OpsError;
use crate::exec_context::OpEngineExecContext;
use crate::http_request::{HostHttpRequest, Method};
use crate::op::{ClusterOp, HttpsAuth, OpBase};
use async_trait::async_trait;
use slog::Logger;

pub struct HttpsDropNodeOp {
    base: OpBase,
    auth: HttpsAuth,
    node_name: String,
    initiator: String,
    /// Eon drops cascade over the node's shard subscriptions.
    cascade: bool,
}

impl HttpsDropNodeOp {
    pub fn new(
        log: &Logger,
        node_name: &str,
        initiator: &str,
        use_password: bool,
        username: &str,
        password: Option<&String>,
        cascade: bool,
    ) -> Result<Self, OpsError> {
        let auth = HttpsAuth::new("HTTPSDropNodeOp", use_password, username, password)?;
        Ok(HttpsDropNodeOp {
            base: OpBase::new("HTTPSDropNodeOp", log, vec![initiator.to_string()]),
            auth,
            node_name: node_name.to_string(),
            initiator: initiator.to_string(),
            cascade,
        })
    }
}

#[async_trait]
impl ClusterOp for HttpsDropNodeOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    async fn prepare(&mut self, ctx: &mut OpEngineExecContext) -> Result<(), OpsError> {
        let initiator = self.initiator.clone();
        ctx.dispatcher.setup(&self.base.hosts);
        let endpoint = format!("nodes/{}", self.node_name);
        let request = self
            .auth
            .apply(HostHttpRequest::https(Method::DELETE, &endpoint))
            .with_query("cascade", if self.cascade { "true" } else { "false" });
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

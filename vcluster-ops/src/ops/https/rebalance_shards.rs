// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Rebalance shard subscriptions across a subcluster (Eon) after node
//! membership changed.

use crate::error::OpsError;
use crate::exec_context::OpEngineExecContext;
use crate::http_request::{HostHttpRequest, Method};
use crate::op::{ClusterOp, HttpsAuth, OpBase};
use async_trait::async_trait;
use slog::Logger;

pub struct HttpsRebalanceSubclusterShardsOp {
    base: OpBase,
    auth: HttpsAuth,
    sc_name: String,
}

impl HttpsRebalanceSubclusterShardsOp {
    pub fn new(
        log: &Logger,
        initiator: Vec<String>,
        use_password: bool,
        username: &str,
        password: Option<&String>,
        sc_name: &str,
    ) -> Result<Self, OpsError> {
        let auth = HttpsAuth::new(
            "HTTPSRebalanceSubclusterShardsOp",
            use_password,
            username,
            password,
        )?;
        Ok(HttpsRebalanceSubclusterShardsOp {
            base: OpBase::new("HTTPSRebalanceSubclusterShardsOp", log, initiator),
            auth,
            sc_name: sc_name.to_string(),
        })
    }
}

#[async_trait]
impl ClusterOp for HttpsRebalanceSubclusterShardsOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    async fn prepare(&mut self, ctx: &mut OpEngineExecContext) -> Result<(), OpsError> {
        if self.base.hosts.is_empty() {
            let initiator = ctx.up_hosts.first().cloned().ok_or_else(|| {
                OpsError::internal(self.name(), "no up host available to rebalance shards")
            })?;
            self.base.hosts = vec![initiator];
        }
        ctx.dispatcher.setup(&self.base.hosts);
        let endpoint = format!("subclusters/{}/rebalance", self.sc_name);
        let hosts = self.base.hosts.clone();
        for host in &hosts {
            let request = self.auth.apply(HostHttpRequest::https(Method::POST, &endpoint));
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

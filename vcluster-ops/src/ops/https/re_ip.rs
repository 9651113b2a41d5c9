// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Update node addresses in the catalog through one up host. Callers
//! follow this with reload-spread and a node-info refresh so later
//! operations see the new addresses.

use crate::error::OpsError;
use crate::exec_context::OpEngineExecContext;
use crate::http_request::{HostHttpRequest, Method};
use crate::op::{ClusterOp, HttpsAuth, OpBase};
use async_trait::async_trait;
use serde_json::json;
use slog::{info, Logger};

pub struct HttpsReIpOp {
    base: OpBase,
    auth: HttpsAuth,
    /// Parallel lists: `node_names[i]` moves to `new_addresses[i]`.
    node_names: Vec<String>,
    new_addresses: Vec<String>,
}

impl HttpsReIpOp {
    pub fn new(
        log: &Logger,
        node_names: Vec<String>,
        new_addresses: Vec<String>,
        use_password: bool,
        username: &str,
        password: Option<&String>,
    ) -> Result<Self, OpsError> {
        if node_names.len() != new_addresses.len() {
            return Err(OpsError::validation(
                "re-ip requires one new address per node name",
            ));
        }
        let auth = HttpsAuth::new("HTTPSReIPOp", use_password, username, password)?;
        Ok(HttpsReIpOp {
            base: OpBase::new("HTTPSReIPOp", log, vec![]),
            auth,
            node_names,
            new_addresses,
        })
    }
}

#[async_trait]
impl ClusterOp for HttpsReIpOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    async fn prepare(&mut self, ctx: &mut OpEngineExecContext) -> Result<(), OpsError> {
        let initiator = ctx.up_hosts.first().cloned().ok_or_else(|| {
            OpsError::internal(self.name(), "no up host available to run re-ip")
        })?;
        let re_ip_list: Vec<serde_json::Value> = self
            .node_names
            .iter()
            .zip(&self.new_addresses)
            .map(|(name, address)| json!({"node_name": name, "address": address}))
            .collect();
        info!(self.base.log, "updating catalog addresses";
            "initiator" => &initiator, "nodes" => ?self.node_names);

        self.base.hosts = vec![initiator.clone()];
        ctx.dispatcher.setup(&self.base.hosts);
        let request = self
            .auth
            .apply(HostHttpRequest::https(Method::PUT, "re-ip"))
            .with_body(json!({"re_ip_list": re_ip_list}));
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

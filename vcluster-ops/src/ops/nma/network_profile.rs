// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-host network profile, consumed by node creation and re-IP.

use crate::error::{HostErrors, OpsError};
use crate::exec_context::{NetworkProfile, OpEngineExecContext};
use crate::http_request::{HostHttpRequest, Method};
use crate::op::{parse_and_check_response, ClusterOp, OpBase};
use async_trait::async_trait;
use slog::Logger;
use std::collections::BTreeMap;

pub struct NmaNetworkProfileOp {
    base: OpBase,
    profiles: BTreeMap<String, NetworkProfile>,
}

impl NmaNetworkProfileOp {
    pub fn new(log: &Logger, hosts: Vec<String>) -> Self {
        NmaNetworkProfileOp {
            base: OpBase::new("NMANetworkProfileOp", log, hosts),
            profiles: BTreeMap::new(),
        }
    }
}

#[async_trait]
impl ClusterOp for NmaNetworkProfileOp {
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
            self.base
                .register_request(host, HostHttpRequest::nma(Method::GET, "network-profile"));
        }
        Ok(())
    }

    fn process_result(&mut self, _ctx: &mut OpEngineExecContext) -> Result<(), OpsError> {
        let name = self.name();
        let mut errors = HostErrors::new();
        let mut profiles = BTreeMap::new();
        for result in self.base.results().values() {
            self.log_response(result);
            if !result.is_passing() {
                if let Some(err) = &result.err {
                    errors.push(err.clone());
                }
                continue;
            }
            match parse_and_check_response::<NetworkProfile>(name, &result.host, &result.content) {
                Ok(profile) => {
                    profiles.insert(result.host.clone(), profile);
                }
                Err(e) => errors.push(e),
            }
        }
        errors.into_result(name)?;
        self.profiles = profiles;
        Ok(())
    }

    async fn finalize(&mut self, ctx: &mut OpEngineExecContext) -> Result<(), OpsError> {
        ctx.network_profiles.append(&mut self.profiles);
        Ok(())
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! NMA connectivity check. Every target host must answer.

use crate::error::{HostErrors, OpsError};
use crate::exec_context::OpEngineExecContext;
use crate::http_request::{HostHttpRequest, Method};
use crate::op::{parse_map_response, ClusterOp, OpBase};
use async_trait::async_trait;
use slog::Logger;

pub struct NmaHealthOp {
    base: OpBase,
}

impl NmaHealthOp {
    pub fn new(log: &Logger, hosts: Vec<String>) -> Self {
        NmaHealthOp { base: OpBase::new("NMAHealthOp", log, hosts) }
    }
}

#[async_trait]
impl ClusterOp for NmaHealthOp {
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
            self.base.register_request(host, HostHttpRequest::nma(Method::GET, "health"));
        }
        Ok(())
    }

    fn process_result(&mut self, _ctx: &mut OpEngineExecContext) -> Result<(), OpsError> {
        let name = self.name();
        let mut errors = HostErrors::new();
        for result in self.base.results().values() {
            self.log_response(result);
            if result.is_passing() {
                // A healthy agent answers {"healthy": "true"}.
                if let Err(e) = parse_map_response(name, &result.host, &result.content) {
                    errors.push(e);
                }
            } else if let Some(err) = &result.err {
                errors.push(err.clone());
            }
        }
        errors.into_result(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::certs::HttpsCerts;
    use crate::engine::ClusterOpEngine;
    use httptest::{matchers::*, responders::*, Expectation, Server};

    fn test_logger() -> Logger {
        Logger::root(slog::Discard, slog::o!())
    }

    #[tokio::test]
    async fn all_healthy_hosts_pass() {
        let servers: Vec<Server> = (0..2).map(|_| Server::run()).collect();
        for server in &servers {
            server.expect(
                Expectation::matching(request::method_path("GET", "/v1/health"))
                    .respond_with(json_encoded(serde_json::json!({"healthy": "true"}))),
            );
        }
        let hosts: Vec<String> = servers.iter().map(|s| s.addr().to_string()).collect();
        let ops: Vec<Box<dyn ClusterOp>> =
            vec![Box::new(NmaHealthOp::new(&test_logger(), hosts))];
        let mut engine = ClusterOpEngine::new(ops, HttpsCerts::default());
        engine.run(&test_logger()).await.unwrap();
    }

    #[tokio::test]
    async fn one_unhealthy_host_fails_the_step() {
        let healthy = Server::run();
        healthy.expect(
            Expectation::matching(any())
                .respond_with(json_encoded(serde_json::json!({"healthy": "true"}))),
        );
        let unhealthy = Server::run();
        unhealthy.expect(Expectation::matching(any()).respond_with(status_code(500)));

        let hosts = vec![healthy.addr().to_string(), unhealthy.addr().to_string()];
        let ops: Vec<Box<dyn ClusterOp>> =
            vec![Box::new(NmaHealthOp::new(&test_logger(), hosts))];
        let mut engine = ClusterOpEngine::new(ops, HttpsCerts::default());
        let err = engine.run(&test_logger()).await.unwrap_err();
        assert!(matches!(err, OpsError::Hosts { .. }));
    }
}

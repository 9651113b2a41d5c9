// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Engine version check. In "must match" mode all hosts have to report
//! the same version before the plan may continue.

use crate::error::{HostErrors, OpsError};
use crate::exec_context::OpEngineExecContext;
use crate::http_request::{HostHttpRequest, Method};
use crate::op::{parse_map_response, ClusterOp, OpBase};
use async_trait::async_trait;
use slog::{info, Logger};
use std::collections::BTreeMap;

pub struct NmaVerticaVersionOp {
    base: OpBase,
    require_same_version: bool,
}

impl NmaVerticaVersionOp {
    pub fn new(log: &Logger, hosts: Vec<String>, require_same_version: bool) -> Self {
        NmaVerticaVersionOp {
            base: OpBase::new("NMAVerticaVersionOp", log, hosts),
            require_same_version,
        }
    }

    /// Versions come back as strings like `v24.1.0-5`; the build suffix
    /// does not participate in the comparison.
    fn parse_version(raw: &str) -> Option<semver::Version> {
        let trimmed = raw.trim().trim_start_matches('v');
        let core = trimmed.split('-').next()?;
        semver::Version::parse(core).ok()
    }
}

#[async_trait]
impl ClusterOp for NmaVerticaVersionOp {
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
                .register_request(host, HostHttpRequest::nma(Method::GET, "vertica/version"));
        }
        Ok(())
    }

    fn process_result(&mut self, _ctx: &mut OpEngineExecContext) -> Result<(), OpsError> {
        let name = self.name();
        let mut errors = HostErrors::new();
        let mut versions = BTreeMap::new();
        for result in self.base.results().values() {
            self.log_response(result);
            if !result.is_passing() {
                if let Some(err) = &result.err {
                    errors.push(err.clone());
                }
                continue;
            }
            match parse_map_response(name, &result.host, &result.content) {
                Ok(response) => {
                    let raw = response.get("vertica_version").cloned().unwrap_or_default();
                    match Self::parse_version(&raw) {
                        Some(version) => {
                            versions.insert(result.host.clone(), version);
                        }
                        None => {
                            errors.push(crate::error::HostError::Response {
                                host: result.host.clone(),
                                detail: format!("unparsable vertica version {raw:?}"),
                            });
                        }
                    }
                }
                Err(e) => errors.push(e),
            }
        }
        errors.into_result(name)?;

        if self.require_same_version {
            let distinct: std::collections::BTreeSet<&semver::Version> =
                versions.values().collect();
            if distinct.len() > 1 {
                let detail: Vec<String> =
                    versions.iter().map(|(host, v)| format!("{host}={v}")).collect();
                return Err(OpsError::semantic(
                    name,
                    format!("hosts report different vertica versions: {}", detail.join(", ")),
                ));
            }
        }
        if let Some(version) = versions.values().next() {
            info!(self.base.log, "vertica version check passed"; "version" => %version);
        }
        Ok(())
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

    fn version_server(version: &str) -> Server {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/v1/vertica/version"))
                .respond_with(json_encoded(serde_json::json!({"vertica_version": version}))),
        );
        server
    }

    #[tokio::test]
    async fn matching_versions_pass() {
        let servers = [version_server("v24.1.0-5"), version_server("v24.1.0-5")];
        let hosts: Vec<String> = servers.iter().map(|s| s.addr().to_string()).collect();
        let ops: Vec<Box<dyn ClusterOp>> =
            vec![Box::new(NmaVerticaVersionOp::new(&test_logger(), hosts, true))];
        let mut engine = ClusterOpEngine::new(ops, HttpsCerts::default());
        engine.run(&test_logger()).await.unwrap();
    }

    #[tokio::test]
    async fn version_skew_fails_in_must_match_mode() {
        let servers = [version_server("v24.1.0-5"), version_server("v23.4.0-1")];
        let hosts: Vec<String> = servers.iter().map(|s| s.addr().to_string()).collect();
        let ops: Vec<Box<dyn ClusterOp>> =
            vec![Box::new(NmaVerticaVersionOp::new(&test_logger(), hosts, true))];
        let mut engine = ClusterOpEngine::new(ops, HttpsCerts::default());
        let err = engine.run(&test_logger()).await.unwrap_err();
        assert!(matches!(err, OpsError::Semantic { .. }));
    }

    #[tokio::test]
    async fn version_skew_is_tolerated_otherwise() {
        let servers = [version_server("v24.1.0-5"), version_server("v23.4.0-1")];
        let hosts: Vec<String> = servers.iter().map(|s| s.addr().to_string()).collect();
        let ops: Vec<Box<dyn ClusterOp>> =
            vec![Box::new(NmaVerticaVersionOp::new(&test_logger(), hosts, false))];
        let mut engine = ClusterOpEngine::new(ops, HttpsCerts::default());
        engine.run(&test_logger()).await.unwrap();
    }
}

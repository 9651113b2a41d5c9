// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Install the default packages through one up node.

use crate::error::OpsError;
use crate::exec_context::OpEngineExecContext;
use crate::http_request::{HostHttpRequest, Method};
use crate::op::{parse_and_check_response, ClusterOp, HttpsAuth, OpBase};
use async_trait::async_trait;
use serde::Deserialize;
use slog::{info, Logger};

#[derive(Debug, Default, Deserialize)]
struct InstallPackagesResponse {
    #[serde(default)]
    packages: Vec<PackageStatus>,
}

#[derive(Debug, Deserialize)]
struct PackageStatus {
    package_name: String,
    install_status: String,
}

pub struct HttpsInstallPackagesOp {
    base: OpBase,
    auth: HttpsAuth,
    force_reinstall: bool,
}

impl HttpsInstallPackagesOp {
    /// Pass no hosts to let the op pick an up node discovered earlier
    /// in the plan.
    pub fn new(
        log: &Logger,
        hosts: Vec<String>,
        use_password: bool,
        username: &str,
        password: Option<&String>,
        force_reinstall: bool,
    ) -> Result<Self, OpsError> {
        let auth = HttpsAuth::new("HTTPSInstallPackagesOp", use_password, username, password)?;
        Ok(HttpsInstallPackagesOp {
            base: OpBase::new("HTTPSInstallPackagesOp", log, hosts),
            auth,
            force_reinstall,
        })
    }
}

#[async_trait]
impl ClusterOp for HttpsInstallPackagesOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    async fn prepare(&mut self, ctx: &mut OpEngineExecContext) -> Result<(), OpsError> {
        if self.base.hosts.is_empty() {
            let initiator = ctx.up_hosts.first().cloned().ok_or_else(|| {
                OpsError::internal(self.name(), "no up host available to install packages")
            })?;
            self.base.hosts = vec![initiator];
        }
        ctx.dispatcher.setup(&self.base.hosts);
        let hosts = self.base.hosts.clone();
        for host in &hosts {
            let request = self
                .auth
                .apply(HostHttpRequest::https(Method::POST, "packages"))
                .with_query(
                    "force-install",
                    if self.force_reinstall { "true" } else { "false" },
                );
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
            let response: InstallPackagesResponse =
                parse_and_check_response(name, &result.host, &result.content)
                    .map_err(|e| OpsError::semantic(name, e.to_string()))?;
            let failed: Vec<&str> = response
                .packages
                .iter()
                .filter(|package| {
                    package.install_status != "Success"
                        && package.install_status != "Skipped"
                })
                .map(|package| package.package_name.as_str())
                .collect();
            if !failed.is_empty() {
                return Err(OpsError::semantic(
                    name,
                    format!("packages failed to install: {}", failed.join(", ")),
                ));
            }
            info!(self.base.log, "packages installed"; "count" => response.packages.len());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::HostHttpResult;
    use serde_json::json;

    fn test_logger() -> Logger {
        Logger::root(slog::Discard, slog::o!())
    }

    #[tokio::test]
    async fn failed_package_is_fatal() {
        let mut op = HttpsInstallPackagesOp::new(
            &test_logger(),
            vec!["h1".to_string()],
            false,
            "",
            None,
            false,
        )
        .unwrap();
        let mut ctx = OpEngineExecContext::new(&test_logger());
        op.prepare(&mut ctx).await.unwrap();
        let body = json!({"packages": [
            {"package_name": "flextable", "install_status": "Success"},
            {"package_name": "voltagesecure", "install_status": "Failure"},
        ]})
        .to_string();
        op.base_mut()
            .cluster_http_request
            .result_collection
            .insert("h1".to_string(), HostHttpResult::success("h1", 200, body));
        let err = op.process_result(&mut ctx).unwrap_err();
        assert!(err.to_string().contains("voltagesecure"));
    }
}

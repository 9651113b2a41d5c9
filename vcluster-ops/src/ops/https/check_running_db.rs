// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Pre-create/pre-drop check that no engine HTTPS service is running on
//! the target hosts. Any answer at all, including a 401 or a 5xx,
//! proves a server is listening; only a transport error counts as "not
//! running".

use crate::error::OpsError;
use crate::exec_context::OpEngineExecContext;
use crate::http_request::{HostHttpRequest, Method};
use crate::op::{ClusterOp, HttpsAuth, OpBase};
use async_trait::async_trait;
use slog::{info, Logger};

#[derive(Clone, Copy, Debug)]
pub enum CheckDbRunningReason {
    CreateDb,
    DropDb,
    StartDb,
}

impl CheckDbRunningReason {
    fn action(&self) -> &'static str {
        match self {
            CheckDbRunningReason::CreateDb => "create the database",
            CheckDbRunningReason::DropDb => "drop the database",
            CheckDbRunningReason::StartDb => "start the database again",
        }
    }
}

pub struct HttpsCheckRunningDbOp {
    base: OpBase,
    auth: HttpsAuth,
    reason: CheckDbRunningReason,
}

impl HttpsCheckRunningDbOp {
    pub fn new(
        log: &Logger,
        hosts: Vec<String>,
        use_password: bool,
        username: &str,
        password: Option<&String>,
        reason: CheckDbRunningReason,
    ) -> Result<Self, OpsError> {
        let auth = HttpsAuth::new("HTTPSCheckRunningDBOp", use_password, username, password)?;
        Ok(HttpsCheckRunningDbOp {
            base: OpBase::new("HTTPSCheckRunningDBOp", log, hosts),
            auth,
            reason,
        })
    }
}

#[async_trait]
impl ClusterOp for HttpsCheckRunningDbOp {
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
            let request = self.auth.apply(HostHttpRequest::https(Method::GET, ""));
            self.base.register_request(host, request);
        }
        Ok(())
    }

    fn process_result(&mut self, _ctx: &mut OpEngineExecContext) -> Result<(), OpsError> {
        let mut running_hosts = Vec::new();
        for result in self.base.results().values() {
            self.log_response(result);
            if result.is_http_running() {
                running_hosts.push(result.host.clone());
            }
        }
        if running_hosts.is_empty() {
            info!(self.base.log, "no database is running on the target hosts");
            return Ok(());
        }
        Err(OpsError::precondition(format!(
            "a database is still running on hosts {}; stop it before trying to {}",
            running_hosts.join(", "),
            self.reason.action(),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::certs::HttpsCerts;
    use crate::engine::ClusterOpEngine;

    fn test_logger() -> Logger {
        Logger::root(slog::Discard, slog::o!())
    }

    fn closed_port_host() -> String {
        // Bind to an ephemeral port and drop the listener: connections
        // to it are refused immediately.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        addr.to_string()
    }

    #[tokio::test]
    async fn refused_connections_count_as_not_running() {
        let hosts = vec![closed_port_host(), closed_port_host()];
        let op = HttpsCheckRunningDbOp::new(
            &test_logger(),
            hosts,
            false,
            "",
            None,
            CheckDbRunningReason::CreateDb,
        )
        .unwrap();
        let mut engine = ClusterOpEngine::new(vec![Box::new(op)], HttpsCerts::default());
        engine.run(&test_logger()).await.unwrap();
    }
}

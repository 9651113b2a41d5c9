// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Sandbox or unsandbox a subcluster through an initiator selected by
//! the preceding membership check.

use crate::error::OpsError;
use crate::exec_context::OpEngineExecContext;
use crate::http_request::{HostHttpRequest, Method};
use crate::op::{parse_map_response, ClusterOp, HttpsAuth, OpBase};
use async_trait::async_trait;
use slog::Logger;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SandboxDirection {
    Sandbox,
    Unsandbox,
}

pub struct HttpsSandboxSubclusterOp {
    base: OpBase,
    auth: HttpsAuth,
    sc_name: String,
    sandbox_name: String,
    direction: SandboxDirection,
}

impl HttpsSandboxSubclusterOp {
    pub fn new(
        log: &Logger,
        use_password: bool,
        username: &str,
        password: Option<&String>,
        sc_name: &str,
        sandbox_name: &str,
        direction: SandboxDirection,
    ) -> Result<Self, OpsError> {
        let name = match direction {
            SandboxDirection::Sandbox => "HTTPSSandboxSubclusterOp",
            SandboxDirection::Unsandbox => "HTTPSUnsandboxSubclusterOp",
        };
        let auth = HttpsAuth::new(name, use_password, username, password)?;
        Ok(HttpsSandboxSubclusterOp {
            base: OpBase::new(name, log, vec![]),
            auth,
            sc_name: sc_name.to_string(),
            sandbox_name: sandbox_name.to_string(),
            direction,
        })
    }
}

#[async_trait]
impl ClusterOp for HttpsSandboxSubclusterOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    async fn prepare(&mut self, ctx: &mut OpEngineExecContext) -> Result<(), OpsError> {
        let hosts = match self.direction {
            // Sandboxing must be driven from outside the target
            // subcluster and outside any sandbox.
            SandboxDirection::Sandbox => ctx.sandboxing_hosts.clone(),
            SandboxDirection::Unsandbox => ctx.up_hosts.clone(),
        };
        if hosts.is_empty() {
            return Err(OpsError::internal(
                self.name(),
                "cannot find any eligible up host to initiate the operation",
            ));
        }
        let endpoint = match self.direction {
            SandboxDirection::Sandbox => format!("subclusters/{}/sandbox", self.sc_name),
            SandboxDirection::Unsandbox => format!("subclusters/{}/unsandbox", self.sc_name),
        };
        self.base.hosts = hosts.clone();
        ctx.dispatcher.setup(&self.base.hosts);
        for host in &hosts {
            let request = self
                .auth
                .apply(HostHttpRequest::https(Method::POST, &endpoint))
                .with_query("sandbox", self.sandbox_name.clone());
            self.base.register_request(host, request);
        }
        Ok(())
    }

    fn process_result(&mut self, _ctx: &mut OpEngineExecContext) -> Result<(), OpsError> {
        let name = self.name();
        let mut errors = crate::error::HostErrors::new();
        for result in self.base.results().values() {
            self.log_response(result);
            if result.is_unauthorized() {
                // The same credentials will fail on every host.
                return Err(OpsError::Auth {
                    op: name.to_string(),
                    source: result.err.clone().expect("unauthorized results carry an error"),
                });
            }
            if !result.is_passing() {
                if let Some(err) = &result.err {
                    errors.push(err.clone());
                }
                continue;
            }
            parse_map_response(name, &result.host, &result.content)
                .map_err(|e| OpsError::semantic(name, e.to_string()))?;
            // One initiator succeeding is enough.
            return Ok(());
        }
        errors.into_result(name)?;
        Err(OpsError::semantic(name, "no host answered the sandbox request"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::HostHttpResult;

    fn test_logger() -> Logger {
        Logger::root(slog::Discard, slog::o!())
    }

    #[tokio::test]
    async fn sandbox_requires_eligible_initiators() {
        let mut op = HttpsSandboxSubclusterOp::new(
            &test_logger(),
            false,
            "",
            None,
            "sc1",
            "sb1",
            SandboxDirection::Sandbox,
        )
        .unwrap();
        let mut ctx = OpEngineExecContext::new(&test_logger());
        // No sandboxing hosts published -> the op cannot run.
        let err = op.prepare(&mut ctx).await.unwrap_err();
        assert!(matches!(err, OpsError::Internal { .. }));
    }

    #[tokio::test]
    async fn first_passing_initiator_wins() {
        let mut op = HttpsSandboxSubclusterOp::new(
            &test_logger(),
            false,
            "",
            None,
            "sc1",
            "sb1",
            SandboxDirection::Sandbox,
        )
        .unwrap();
        let mut ctx = OpEngineExecContext::new(&test_logger());
        ctx.sandboxing_hosts = vec!["h1".to_string(), "h4".to_string()];
        op.prepare(&mut ctx).await.unwrap();
        let results = &mut op.base_mut().cluster_http_request.result_collection;
        results.insert(
            "h1".to_string(),
            HostHttpResult::failure("h1", 503, "busy".to_string()),
        );
        results.insert(
            "h4".to_string(),
            HostHttpResult::success("h4", 200, r#"{"detail": ""}"#.to_string()),
        );
        op.process_result(&mut ctx).unwrap();
    }
}

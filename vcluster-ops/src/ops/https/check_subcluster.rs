// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Verify a freshly created subcluster against the caller's request.
//! The first host with a valid answer decides; processing stops there.

use crate::error::OpsError;
use crate::exec_context::OpEngineExecContext;
use crate::http_request::{HostHttpRequest, Method};
use crate::op::{parse_and_check_response, ClusterOp, HttpsAuth, OpBase};
use crate::ops::https::SubclusterInfo;
use async_trait::async_trait;
use slog::Logger;

pub struct HttpsCheckSubclusterOp {
    base: OpBase,
    auth: HttpsAuth,
    sc_name: String,
    is_secondary: bool,
    control_set_size: i64,
}

impl HttpsCheckSubclusterOp {
    pub fn new(
        log: &Logger,
        use_password: bool,
        username: &str,
        password: Option<&String>,
        sc_name: &str,
        is_primary: bool,
        control_set_size: i64,
    ) -> Result<Self, OpsError> {
        let auth = HttpsAuth::new("HTTPSCheckSubclusterOp", use_password, username, password)?;
        Ok(HttpsCheckSubclusterOp {
            base: OpBase::new("HTTPSCheckSubclusterOp", log, vec![]),
            auth,
            sc_name: sc_name.to_string(),
            is_secondary: !is_primary,
            control_set_size,
        })
    }
}

#[async_trait]
impl ClusterOp for HttpsCheckSubclusterOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    async fn prepare(&mut self, ctx: &mut OpEngineExecContext) -> Result<(), OpsError> {
        if ctx.up_hosts.is_empty() {
            return Err(OpsError::internal(
                self.name(),
                "no up host available to check the subcluster",
            ));
        }
        self.base.hosts = ctx.up_hosts.clone();
        ctx.dispatcher.setup(&self.base.hosts);
        let endpoint = format!("subclusters/{}", self.sc_name);
        let hosts = self.base.hosts.clone();
        for host in &hosts {
            let request = self.auth.apply(HostHttpRequest::https(Method::GET, &endpoint));
            self.base.register_request(host, request);
        }
        Ok(())
    }

    fn process_result(&mut self, _ctx: &mut OpEngineExecContext) -> Result<(), OpsError> {
        let name = self.name();
        let mut last_error = None;
        for result in self.base.results().values() {
            self.log_response(result);
            if result.is_unauthorized() {
                return Err(OpsError::Auth {
                    op: name.to_string(),
                    source: result.err.clone().expect("unauthorized results carry an error"),
                });
            }
            if !result.is_passing() {
                if let Some(err) = &result.err {
                    last_error = Some(err.clone());
                }
                continue;
            }
            let info: SubclusterInfo =
                parse_and_check_response(name, &result.host, &result.content)
                    .map_err(|e| OpsError::semantic(name, e.to_string()))?;

            if info.subcluster_name != self.sc_name {
                return Err(OpsError::semantic(
                    name,
                    format!(
                        "new subcluster should be {} but the engine reports {}",
                        self.sc_name, info.subcluster_name
                    ),
                ));
            }
            if info.is_secondary != self.is_secondary {
                let (wanted, got) = if self.is_secondary {
                    ("secondary", "primary")
                } else {
                    ("primary", "secondary")
                };
                return Err(OpsError::semantic(
                    name,
                    format!("new subcluster should be {wanted} but the engine reports {got}"),
                ));
            }
            if info.control_set_size != self.control_set_size {
                return Err(OpsError::semantic(
                    name,
                    format!(
                        "new subcluster should have control set size {} but the engine reports {}",
                        self.control_set_size, info.control_set_size
                    ),
                ));
            }
            // First valid result decides.
            return Ok(());
        }
        Err(match last_error {
            Some(err) => {
                let mut errors = crate::error::HostErrors::new();
                errors.push(err);
                errors.into_result(name).unwrap_err()
            }
            None => OpsError::semantic(name, "no host reported the subcluster"),
        })
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

    async fn check(is_primary_expected: bool, body: serde_json::Value) -> Result<(), OpsError> {
        let mut op = HttpsCheckSubclusterOp::new(
            &test_logger(),
            false,
            "",
            None,
            "sc1",
            is_primary_expected,
            2,
        )
        .unwrap();
        let mut ctx = OpEngineExecContext::new(&test_logger());
        ctx.up_hosts = vec!["h1".to_string()];
        op.prepare(&mut ctx).await.unwrap();
        op.base_mut()
            .cluster_http_request
            .result_collection
            .insert("h1".to_string(), HostHttpResult::success("h1", 200, body.to_string()));
        op.process_result(&mut ctx)
    }

    #[tokio::test]
    async fn matching_subcluster_passes() {
        check(
            false,
            json!({"subcluster_name": "sc1", "is_secondary": true, "control_set_size": 2}),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn primary_when_secondary_was_requested_is_fatal() {
        let err = check(
            false,
            json!({"subcluster_name": "sc1", "is_secondary": false, "control_set_size": 2}),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, OpsError::Semantic { .. }));
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! List subclusters through an up host and check the caller's
//! expectation about one of them. Also records the default subcluster
//! name for node creation when the caller named no subcluster.

use crate::error::OpsError;
use crate::exec_context::OpEngineExecContext;
use crate::http_request::{HostHttpRequest, Method};
use crate::op::{parse_and_check_response, ClusterOp, HttpsAuth, OpBase};
use crate::ops::https::SubclusterInfo;
use async_trait::async_trait;
use serde::Deserialize;
use slog::{info, Logger};

/// What the calling command requires of the named subcluster.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubclusterExpectation {
    /// remove_subcluster: the subcluster has to be there.
    MustExist,
    /// add_subcluster: a second subcluster of the same name is an
    /// error.
    MustNotExist,
    /// add_node: absence is fine, the default subcluster is used.
    IgnoreNotFound,
}

#[derive(Debug, Default, Deserialize)]
struct SubclusterListResponse {
    #[serde(default)]
    subcluster_list: Vec<SubclusterInfo>,
}

pub struct HttpsFindSubclusterOp {
    base: OpBase,
    auth: HttpsAuth,
    sc_name: String,
    expectation: SubclusterExpectation,
    default_sc_name: Option<String>,
}

impl HttpsFindSubclusterOp {
    pub fn new(
        log: &Logger,
        hosts: Vec<String>,
        use_password: bool,
        username: &str,
        password: Option<&String>,
        sc_name: &str,
        expectation: SubclusterExpectation,
    ) -> Result<Self, OpsError> {
        let auth = HttpsAuth::new("HTTPSFindSubclusterOp", use_password, username, password)?;
        Ok(HttpsFindSubclusterOp {
            base: OpBase::new("HTTPSFindSubclusterOp", log, hosts),
            auth,
            sc_name: sc_name.to_string(),
            expectation,
            default_sc_name: None,
        })
    }
}

#[async_trait]
impl ClusterOp for HttpsFindSubclusterOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    async fn prepare(&mut self, ctx: &mut OpEngineExecContext) -> Result<(), OpsError> {
        if self.base.hosts.is_empty() {
            self.base.hosts = ctx.up_hosts.clone();
        }
        if self.base.hosts.is_empty() {
            return Err(OpsError::internal(
                self.name(),
                "no up host available to list subclusters",
            ));
        }
        ctx.dispatcher.setup(&self.base.hosts);
        let hosts = self.base.hosts.clone();
        for host in &hosts {
            let request = self.auth.apply(HostHttpRequest::https(Method::GET, "subclusters"));
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
            if !result.is_passing() {
                continue;
            }
            let response: SubclusterListResponse =
                parse_and_check_response(name, &result.host, &result.content)
                    .map_err(|e| OpsError::semantic(name, e.to_string()))?;

            let found = response
                .subcluster_list
                .iter()
                .any(|sc| sc.subcluster_name == self.sc_name);
            self.default_sc_name = response
                .subcluster_list
                .iter()
                .find(|sc| sc.is_default)
                .map(|sc| sc.subcluster_name.clone());

            match self.expectation {
                SubclusterExpectation::MustExist if !found => {
                    return Err(OpsError::precondition(format!(
                        "subcluster {} does not exist in the database",
                        self.sc_name
                    )));
                }
                SubclusterExpectation::MustNotExist if found => {
                    return Err(OpsError::precondition(format!(
                        "subcluster {} already exists in the database",
                        self.sc_name
                    )));
                }
                _ => {}
            }
            if !found {
                info!(self.base.log, "subcluster not found, will use the default";
                    "subcluster" => &self.sc_name,
                    "default" => self.default_sc_name.as_deref().unwrap_or(""));
            }
            return Ok(());
        }
        Err(OpsError::semantic(name, "no host returned a subcluster list"))
    }

    async fn finalize(&mut self, ctx: &mut OpEngineExecContext) -> Result<(), OpsError> {
        ctx.default_sc_name = self.default_sc_name.take();
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

    fn sc_list() -> String {
        json!({"subcluster_list": [
            {"subcluster_name": "default_subcluster", "is_default": true,
             "is_secondary": false, "control_set_size": -1},
            {"subcluster_name": "sc1", "is_default": false,
             "is_secondary": true, "control_set_size": 2},
        ]})
        .to_string()
    }

    async fn run_expectation(
        sc_name: &str,
        expectation: SubclusterExpectation,
    ) -> (Result<(), OpsError>, OpEngineExecContext) {
        let mut op = HttpsFindSubclusterOp::new(
            &test_logger(),
            vec!["h1".to_string()],
            false,
            "",
            None,
            sc_name,
            expectation,
        )
        .unwrap();
        let mut ctx = OpEngineExecContext::new(&test_logger());
        op.prepare(&mut ctx).await.unwrap();
        op.base_mut()
            .cluster_http_request
            .result_collection
            .insert("h1".to_string(), HostHttpResult::success("h1", 200, sc_list()));
        let result = op.process_result(&mut ctx);
        if result.is_ok() {
            op.finalize(&mut ctx).await.unwrap();
        }
        (result, ctx)
    }

    #[tokio::test]
    async fn must_not_exist_rejects_existing_subcluster() {
        let (result, _) = run_expectation("sc1", SubclusterExpectation::MustNotExist).await;
        assert!(matches!(result.unwrap_err(), OpsError::Precondition { .. }));
    }

    #[tokio::test]
    async fn must_exist_rejects_missing_subcluster() {
        let (result, _) = run_expectation("sc9", SubclusterExpectation::MustExist).await;
        assert!(matches!(result.unwrap_err(), OpsError::Precondition { .. }));
    }

    #[tokio::test]
    async fn ignore_not_found_publishes_default() {
        let (result, ctx) = run_expectation("sc9", SubclusterExpectation::IgnoreNotFound).await;
        result.unwrap();
        assert_eq!(ctx.default_sc_name.as_deref(), Some("default_subcluster"));
    }
}

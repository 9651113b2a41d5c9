// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! List archived restore points through one up node, optionally
//! filtered by archive name.

use crate::error::OpsError;
use crate::exec_context::OpEngineExecContext;
use crate::http_request::{HostHttpRequest, Method};
use crate::op::{parse_and_check_response, ClusterOp, HttpsAuth, OpBase};
use async_trait::async_trait;
use serde::Deserialize;
use slog::Logger;

#[derive(Clone, Debug, Deserialize)]
pub struct RestorePoint {
    pub archive: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub index: i64,
    #[serde(default)]
    pub timestamp: String,
}

pub struct HttpsShowRestorePointsOp {
    base: OpBase,
    auth: HttpsAuth,
    archive_name_filter: Option<String>,
    restore_points: Vec<RestorePoint>,
}

impl HttpsShowRestorePointsOp {
    pub fn new(
        log: &Logger,
        hosts: Vec<String>,
        use_password: bool,
        username: &str,
        password: Option<&String>,
        archive_name_filter: Option<String>,
    ) -> Result<Self, OpsError> {
        let auth = HttpsAuth::new("HTTPSShowRestorePointsOp", use_password, username, password)?;
        Ok(HttpsShowRestorePointsOp {
            base: OpBase::new("HTTPSShowRestorePointsOp", log, hosts),
            auth,
            archive_name_filter,
            restore_points: Vec::new(),
        })
    }

    /// The restore points returned by the engine. Also published to
    /// the execution context in `finalize` for the calling command.
    pub fn restore_points(&self) -> &[RestorePoint] {
        &self.restore_points
    }
}

#[async_trait]
impl ClusterOp for HttpsShowRestorePointsOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    async fn prepare(&mut self, ctx: &mut OpEngineExecContext) -> Result<(), OpsError> {
        if self.base.hosts.is_empty() {
            let initiator = ctx.up_hosts.first().cloned().ok_or_else(|| {
                OpsError::internal(self.name(), "no up host available to list restore points")
            })?;
            self.base.hosts = vec![initiator];
        }
        ctx.dispatcher.setup(&self.base.hosts);
        let hosts = self.base.hosts.clone();
        for host in &hosts {
            let mut request =
                self.auth.apply(HostHttpRequest::https(Method::GET, "restore-points"));
            if let Some(archive) = &self.archive_name_filter {
                request = request.with_query("archive", archive.clone());
            }
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
            let restore_points: Vec<RestorePoint> =
                parse_and_check_response(name, &result.host, &result.content)
                    .map_err(|e| OpsError::semantic(name, e.to_string()))?;
            self.restore_points = restore_points;
            return Ok(());
        }
        Err(OpsError::semantic(name, "no host answered the restore point listing"))
    }

    async fn finalize(&mut self, ctx: &mut OpEngineExecContext) -> Result<(), OpsError> {
        ctx.restore_points = self.restore_points.clone();
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
    async fn parses_restore_point_list() {
        let mut op = HttpsShowRestorePointsOp::new(
            &test_logger(),
            vec!["h1".to_string()],
            false,
            "",
            None,
            Some("db1".to_string()),
        )
        .unwrap();
        let mut ctx = OpEngineExecContext::new(&test_logger());
        op.prepare(&mut ctx).await.unwrap();
        let body = json!([
            {"archive": "db1", "id": "a2", "index": 2, "timestamp": "2024-01-02 11:00:00"},
            {"archive": "db1", "id": "a1", "index": 1, "timestamp": "2024-01-01 11:00:00"},
        ])
        .to_string();
        op.base_mut()
            .cluster_http_request
            .result_collection
            .insert("h1".to_string(), HostHttpResult::success("h1", 200, body));
        op.process_result(&mut ctx).unwrap();
        assert_eq!(op.restore_points().len(), 2);
        assert_eq!(op.restore_points()[0].archive, "db1");
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The operation contract every plan step implements.
//!
//! An operation is a trait object composed of [`OpBase`] (name, target
//! hosts, request/result collections, skip flag) and, for engine HTTPS
//! calls, [`HttpsAuth`]. The engine drives
//! `prepare -> (execute | skip) -> finalize` exactly once, in order.

use crate::adapter::HostHttpResult;
use crate::certs::HttpsCerts;
use crate::error::{HostError, OpsError};
use crate::exec_context::OpEngineExecContext;
use crate::http_request::{ClusterHttpRequest, HostHttpRequest};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use slog::{debug, o, Logger};
use std::collections::BTreeMap;

/// Base fields shared by every operation.
pub struct OpBase {
    name: &'static str,
    pub log: Logger,
    /// Target hosts; often recomputed in `prepare` from context data.
    pub hosts: Vec<String>,
    pub cluster_http_request: ClusterHttpRequest,
    /// Set during `prepare` when there is provably nothing to do; the
    /// engine then skips cert loading and `execute`.
    pub skip_execute: bool,
}

impl OpBase {
    pub fn new(name: &'static str, log: &Logger, hosts: Vec<String>) -> Self {
        OpBase {
            name,
            log: log.new(o!("op" => name)),
            hosts,
            cluster_http_request: ClusterHttpRequest::default(),
            skip_execute: false,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn register_request(&mut self, host: &str, request: HostHttpRequest) {
        self.cluster_http_request.request_collection.insert(host.to_string(), request);
    }

    pub fn results(&self) -> &BTreeMap<String, HostHttpResult> {
        &self.cluster_http_request.result_collection
    }
}

/// Basic-auth material for engine HTTPS operations. An empty password
/// is meaningful (create_db before a password is set), which is why
/// `use_password` is explicit rather than derived.
#[derive(Clone, Default)]
pub struct HttpsAuth {
    pub use_password: bool,
    pub username: String,
    pub password: Option<String>,
}

impl HttpsAuth {
    pub fn new(
        op_name: &str,
        use_password: bool,
        username: &str,
        password: Option<&String>,
    ) -> Result<Self, OpsError> {
        if use_password && username.is_empty() {
            return Err(OpsError::internal(
                op_name,
                "password authentication requires a username",
            ));
        }
        Ok(HttpsAuth {
            use_password,
            username: username.to_string(),
            password: password.cloned(),
        })
    }

    /// Attach the credentials to a request when password auth is in
    /// use.
    pub fn apply(&self, request: HostHttpRequest) -> HostHttpRequest {
        if self.use_password {
            request.with_basic_auth(&self.username, self.password.as_deref())
        } else {
            request
        }
    }
}

/// The capability set of a plan step.
#[async_trait]
pub trait ClusterOp: Send {
    fn base(&self) -> &OpBase;
    fn base_mut(&mut self) -> &mut OpBase;

    /// Compute target hosts, build per-host requests, size the
    /// dispatcher pool. May set `skip_execute`.
    async fn prepare(&mut self, ctx: &mut OpEngineExecContext) -> Result<(), OpsError>;

    /// Dispatch the fan-out and process results. The default is the
    /// common shape; polling operations override it.
    async fn execute(&mut self, ctx: &mut OpEngineExecContext) -> Result<(), OpsError> {
        self.run_execute(ctx).await;
        self.process_result(ctx)
    }

    /// Parse and validate each host's response, joining errors.
    fn process_result(&mut self, ctx: &mut OpEngineExecContext) -> Result<(), OpsError>;

    /// Publish parsed data into the context for downstream operations.
    async fn finalize(&mut self, _ctx: &mut OpEngineExecContext) -> Result<(), OpsError> {
        Ok(())
    }

    // Provided pieces below; operations rarely override these.

    fn name(&self) -> &'static str {
        self.base().name()
    }

    fn skip_execute(&self) -> bool {
        self.base().skip_execute
    }

    async fn run_execute(&mut self, ctx: &mut OpEngineExecContext) {
        let base = self.base_mut();
        ctx.dispatcher.send_request(&mut base.cluster_http_request).await;
    }

    /// Attach TLS material to every registered request. Called by the
    /// engine after `prepare`, before `execute`, and only when the
    /// caller supplied complete material.
    fn load_certs_if_needed(
        &mut self,
        certs: &HttpsCerts,
        find_certs_in_options: bool,
    ) -> Result<(), OpsError> {
        if !find_certs_in_options || self.skip_execute() {
            return Ok(());
        }
        let name = self.name();
        let base = self.base_mut();
        if base.cluster_http_request.request_collection.is_empty() {
            return Err(OpsError::internal(
                name,
                "no http request has been set up, cannot load certs",
            ));
        }
        for request in base.cluster_http_request.request_collection.values_mut() {
            request.certs = Some(certs.clone());
        }
        Ok(())
    }

    fn log_prepare(&self) {
        debug!(self.base().log, "prepare");
    }

    fn log_execute(&self) {
        debug!(self.base().log, "execute");
    }

    fn log_finalize(&self) {
        debug!(self.base().log, "finalize");
    }

    fn log_response(&self, result: &HostHttpResult) {
        debug!(self.base().log, "host result";
            "host" => &result.host,
            "status" => result.status.as_str(),
            "status_code" => result.status_code,
        );
    }
}

/// Parse a host's JSON response into `T`, mapping parse failures to a
/// per-host error so callers can join them.
pub fn parse_and_check_response<T: DeserializeOwned>(
    op_name: &str,
    host: &str,
    content: &str,
) -> Result<T, HostError> {
    serde_json::from_str(content).map_err(|e| HostError::Response {
        host: host.to_string(),
        detail: format!("[{op_name}] cannot parse response: {e}"),
    })
}

/// Parse a flat string-to-string JSON object response.
pub fn parse_map_response(
    op_name: &str,
    host: &str,
    content: &str,
) -> Result<BTreeMap<String, String>, HostError> {
    parse_and_check_response(op_name, host, content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_response_parses_flat_objects() {
        let map =
            parse_map_response("TestOp", "h1", r#"{"healthy": "true"}"#).unwrap();
        assert_eq!(map["healthy"], "true");
    }

    #[test]
    fn parse_failure_names_op_and_host() {
        let err =
            parse_map_response("TestOp", "h1", "not json").unwrap_err();
        let text = err.to_string();
        assert!(text.contains("TestOp"));
        assert!(text.contains("h1"));
    }

    #[test]
    fn https_auth_requires_username_with_password() {
        assert!(HttpsAuth::new("TestOp", true, "", None).is_err());
        assert!(HttpsAuth::new("TestOp", true, "dbadmin", None).is_ok());
        assert!(HttpsAuth::new("TestOp", false, "", None).is_ok());
    }
}

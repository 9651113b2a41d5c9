// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The HTTP adapter: issues exactly one request against one host and
//! classifies the outcome into a [`HostHttpResult`].

use crate::error::HostError;
use crate::http_request::{mask_sensitive_fields, HostHttpRequest, Scheme};
use slog::{debug, o, Logger};
use std::time::Duration;

/// Credential-failure messages the engine returns with a 401. A 401
/// carrying one of these means the same credentials will fail on every
/// host.
pub const WRONG_CREDENTIAL_MESSAGES: [&str; 2] = ["Wrong password", "Wrong certificate"];

/// Classification of one host's outcome.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResultStatus {
    /// 2xx.
    Success,
    /// Any non-2xx status.
    Failure,
    /// The request never produced an HTTP status (transport error).
    Exception,
}

impl ResultStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultStatus::Success => "SUCCESS",
            ResultStatus::Failure => "FAILURE",
            ResultStatus::Exception => "EXCEPTION",
        }
    }
}

/// The outcome of one adapter call.
#[derive(Clone, Debug)]
pub struct HostHttpResult {
    pub status: ResultStatus,
    pub status_code: Option<u16>,
    pub host: String,
    pub content: String,
    pub err: Option<HostError>,
}

impl HostHttpResult {
    pub fn success(host: &str, status_code: u16, content: String) -> Self {
        HostHttpResult {
            status: ResultStatus::Success,
            status_code: Some(status_code),
            host: host.to_string(),
            content,
            err: None,
        }
    }

    pub fn failure(host: &str, status_code: u16, content: String) -> Self {
        let err = if status_code == 401 {
            HostError::Unauthorized { host: host.to_string(), detail: content.clone() }
        } else if status_code >= 500 {
            HostError::Internal { host: host.to_string(), status: status_code, detail: content.clone() }
        } else {
            HostError::Status { host: host.to_string(), status: status_code, detail: content.clone() }
        };
        HostHttpResult {
            status: ResultStatus::Failure,
            status_code: Some(status_code),
            host: host.to_string(),
            content,
            err: Some(err),
        }
    }

    pub fn exception(host: &str, detail: String) -> Self {
        HostHttpResult {
            status: ResultStatus::Exception,
            status_code: None,
            host: host.to_string(),
            content: String::new(),
            err: Some(HostError::Transport { host: host.to_string(), detail }),
        }
    }

    pub fn is_passing(&self) -> bool {
        self.err.is_none()
    }

    pub fn is_failing(&self) -> bool {
        self.status == ResultStatus::Failure
    }

    pub fn is_exception(&self) -> bool {
        self.status == ResultStatus::Exception
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status_code == Some(401)
    }

    pub fn is_internal_error(&self) -> bool {
        matches!(self.status_code, Some(code) if code >= 500)
    }

    /// A 401 can mean a wrong password, a wrong certificate, or a node
    /// that has not yet joined the cluster. Only the first two are
    /// credential errors; they are recognized by the response text.
    pub fn is_password_and_certificate_error(&self) -> bool {
        self.is_unauthorized()
            && WRONG_CREDENTIAL_MESSAGES.iter().any(|msg| self.content.contains(msg))
    }

    /// Whether an engine HTTPS service answered at all. Used by the
    /// running-DB check, where even a 401 or a 5xx proves a server is
    /// listening.
    pub fn is_http_running(&self) -> bool {
        self.is_passing() || self.is_unauthorized() || self.is_internal_error()
    }
}

/// Issues one request per call. The dispatcher owns a pool of these.
#[derive(Clone)]
pub struct HttpAdapter {
    log: Logger,
}

impl HttpAdapter {
    pub fn new(log: &Logger) -> Self {
        HttpAdapter { log: log.new(o!("component" => "HttpAdapter")) }
    }

    /// Send `request` to `host` and classify the outcome. Transport
    /// errors are captured as EXCEPTION results, never propagated as
    /// `Err`: the caller aggregates per-host outcomes.
    pub async fn send_request(&self, host: &str, request: &HostHttpRequest) -> HostHttpResult {
        match self.issue(host, request).await {
            Ok(result) => result,
            Err(e) => HostHttpResult::exception(host, e.to_string()),
        }
    }

    async fn issue(
        &self,
        host: &str,
        request: &HostHttpRequest,
    ) -> Result<HostHttpResult, reqwest::Error> {
        let client = self.build_client(request)?;
        let url = request.url(host);

        let mut builder = client.request(request.method.clone(), &url);
        if !request.query_params.is_empty() {
            builder = builder.query(&request.query_params);
        }
        if let Some(username) = &request.username {
            builder = builder.basic_auth(username, request.password.as_deref());
        }
        if let Some(body) = &request.body {
            debug!(self.log, "sending request";
                "method" => %request.method,
                "url" => &url,
                "body" => %mask_sensitive_fields(body),
            );
            builder = builder.json(body);
        } else {
            debug!(self.log, "sending request"; "method" => %request.method, "url" => &url);
        }

        let response = builder.send().await?;
        let status_code = response.status().as_u16();
        let content = response.text().await.unwrap_or_default();

        if (200..300).contains(&status_code) {
            Ok(HostHttpResult::success(host, status_code, content))
        } else {
            Ok(HostHttpResult::failure(host, status_code, content))
        }
    }

    fn build_client(&self, request: &HostHttpRequest) -> Result<reqwest::Client, reqwest::Error> {
        let mut builder = reqwest::Client::builder();
        if request.timeout > Duration::ZERO {
            builder = builder.timeout(request.timeout).connect_timeout(request.timeout);
        }
        if request.scheme == Scheme::EngineHttps {
            if let Some(certs) = &request.certs {
                let pem = format!("{}\n{}", certs.key, certs.cert);
                builder = builder.identity(reqwest::Identity::from_pem(pem.as_bytes())?);
                if !certs.ca_cert.is_empty() {
                    builder = builder
                        .add_root_certificate(reqwest::Certificate::from_pem(
                            certs.ca_cert.as_bytes(),
                        )?)
                        .tls_built_in_root_certs(false);
                }
            }
        }
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_request::Method;
    use httptest::{matchers::*, responders::*, Expectation, Server};
    use slog::Logger;

    fn test_logger() -> Logger {
        Logger::root(slog::Discard, slog::o!())
    }

    fn host_of(server: &Server) -> String {
        server.addr().to_string()
    }

    #[tokio::test]
    async fn two_xx_classifies_as_success() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/v1/health"))
                .respond_with(json_encoded(serde_json::json!({"healthy": "true"}))),
        );
        let adapter = HttpAdapter::new(&test_logger());
        let request = HostHttpRequest::nma(Method::GET, "health");
        let result = adapter.send_request(&host_of(&server), &request).await;
        assert_eq!(result.status, ResultStatus::Success);
        assert!(result.is_passing());
        assert!(result.content.contains("healthy"));
    }

    #[tokio::test]
    async fn unauthorized_classifies_as_failure() {
        let server = Server::run();
        server.expect(
            Expectation::matching(any())
                .respond_with(status_code(401).body("Wrong password")),
        );
        let adapter = HttpAdapter::new(&test_logger());
        let request = HostHttpRequest::nma(Method::GET, "health");
        let result = adapter.send_request(&host_of(&server), &request).await;
        assert!(result.is_unauthorized());
        assert!(result.is_password_and_certificate_error());
        assert!(result.is_failing());
        assert!(!result.is_passing());
    }

    #[tokio::test]
    async fn five_xx_classifies_as_internal_error() {
        let server = Server::run();
        server.expect(Expectation::matching(any()).respond_with(status_code(503)));
        let adapter = HttpAdapter::new(&test_logger());
        let request = HostHttpRequest::nma(Method::GET, "health");
        let result = adapter.send_request(&host_of(&server), &request).await;
        assert!(result.is_internal_error());
        assert!(result.is_http_running());
    }

    #[tokio::test]
    async fn transport_error_classifies_as_exception() {
        let adapter = HttpAdapter::new(&test_logger());
        // TEST-NET address: nothing listens there.
        let request =
            HostHttpRequest::nma(Method::GET, "health").with_timeout(Duration::from_millis(200));
        let result = adapter.send_request("192.0.2.1:9", &request).await;
        assert!(result.is_exception());
        assert!(!result.is_http_running());
    }
}

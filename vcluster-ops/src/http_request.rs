// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-host request records and the request/result collections carried
//! by every operation.

use crate::certs::HttpsCerts;
use serde_json::Value;
use std::collections::BTreeMap;
use std::net::Ipv6Addr;
use std::time::Duration;

pub use reqwest::Method;

/// Endpoint version prefixes. Both agent families are currently at v1.
pub const NMA_CUR_VERSION: &str = "v1/";
pub const HTTPS_CUR_VERSION: &str = "v1/";

/// Default service ports, used when a host address carries no port.
pub const NMA_PORT: u16 = 5554;
pub const HTTPS_PORT: u16 = 8443;

/// Per-request timeout unless an operation overrides it.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Fields masked before any request body reaches a log line.
pub const SENSITIVE_FIELDS: [&str; 3] =
    ["db_password", "aws_access_key_id", "aws_secret_access_key"];
pub const MASKED_VALUE: &str = "******";

/// Which per-host agent a request targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scheme {
    /// Node Management Agent, plain HTTP.
    NmaHttp,
    /// The engine's embedded HTTPS service.
    EngineHttps,
}

/// One host's worth of an operation's fan-out.
#[derive(Clone, Debug)]
pub struct HostHttpRequest {
    pub method: Method,
    pub scheme: Scheme,
    /// Versioned relative endpoint, e.g. `v1/health`.
    pub endpoint: String,
    pub query_params: BTreeMap<String, String>,
    pub body: Option<Value>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub certs: Option<HttpsCerts>,
    /// `Duration::ZERO` means no timeout.
    pub timeout: Duration,
}

impl HostHttpRequest {
    pub fn nma(method: Method, endpoint: &str) -> Self {
        Self::new(method, Scheme::NmaHttp, format!("{NMA_CUR_VERSION}{endpoint}"))
    }

    pub fn https(method: Method, endpoint: &str) -> Self {
        Self::new(method, Scheme::EngineHttps, format!("{HTTPS_CUR_VERSION}{endpoint}"))
    }

    fn new(method: Method, scheme: Scheme, endpoint: String) -> Self {
        HostHttpRequest {
            method,
            scheme,
            endpoint,
            query_params: BTreeMap::new(),
            body: None,
            username: None,
            password: None,
            certs: None,
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_query(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query_params.insert(key.to_string(), value.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Attach basic auth. The password travels in the Authorization
    /// header only; it is never placed in the URL.
    pub fn with_basic_auth(mut self, username: &str, password: Option<&str>) -> Self {
        self.username = Some(username.to_string());
        self.password = password.map(str::to_string);
        self
    }

    /// Build the absolute URL for `host`. Hosts that already carry a
    /// port are used as the authority verbatim; bare addresses get the
    /// scheme's default port. IPv6 literals are bracketed.
    pub fn url(&self, host: &str) -> String {
        let (proto, default_port) = match self.scheme {
            Scheme::NmaHttp => ("http", NMA_PORT),
            Scheme::EngineHttps => ("https", HTTPS_PORT),
        };
        let authority = if host.parse::<Ipv6Addr>().is_ok() {
            format!("[{host}]:{default_port}")
        } else if host.contains(':') {
            host.to_string()
        } else {
            format!("{host}:{default_port}")
        };
        format!("{proto}://{authority}/{}", self.endpoint)
    }
}

/// The request/result pair an operation registers during `prepare` and
/// the dispatcher fills during `execute`, both keyed by host.
#[derive(Default)]
pub struct ClusterHttpRequest {
    pub request_collection: BTreeMap<String, HostHttpRequest>,
    pub result_collection: BTreeMap<String, crate::adapter::HostHttpResult>,
}

impl ClusterHttpRequest {
    pub fn clear(&mut self) {
        self.request_collection.clear();
        self.result_collection.clear();
    }
}

/// Return a copy of `body` with every sensitive field masked, at any
/// nesting depth. Called on every log path that renders a request body.
pub fn mask_sensitive_fields(body: &Value) -> Value {
    match body {
        Value::Object(map) => {
            let masked = map
                .iter()
                .map(|(key, value)| {
                    if SENSITIVE_FIELDS.contains(&key.as_str()) {
                        (key.clone(), Value::String(MASKED_VALUE.to_string()))
                    } else {
                        (key.clone(), mask_sensitive_fields(value))
                    }
                })
                .collect();
            Value::Object(masked)
        }
        Value::Array(items) => Value::Array(items.iter().map(mask_sensitive_fields).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nma_and_https_urls() {
        let request = HostHttpRequest::nma(Method::GET, "health");
        assert_eq!(request.url("192.0.2.1"), "http://192.0.2.1:5554/v1/health");
        let request = HostHttpRequest::https(Method::POST, "catalog/sync");
        assert_eq!(request.url("192.0.2.1"), "https://192.0.2.1:8443/v1/catalog/sync");
    }

    #[test]
    fn host_with_port_is_used_verbatim() {
        let request = HostHttpRequest::nma(Method::GET, "health");
        assert_eq!(request.url("127.0.0.1:39121"), "http://127.0.0.1:39121/v1/health");
    }

    #[test]
    fn ipv6_hosts_are_bracketed() {
        let request = HostHttpRequest::https(Method::GET, "nodes");
        assert_eq!(request.url("2001:db8::1"), "https://[2001:db8::1]:8443/v1/nodes");
    }

    #[test]
    fn sensitive_fields_are_masked_at_depth() {
        let body = json!({
            "db_name": "verticadb",
            "db_password": "secret1",
            "communal_storage": {
                "aws_access_key_id": "AKIA123",
                "aws_secret_access_key": "wJalr456",
            },
            "nodes": [{"db_password": "secret2"}],
        });
        let masked = mask_sensitive_fields(&body);
        let rendered = masked.to_string();
        assert!(!rendered.contains("secret1"));
        assert!(!rendered.contains("secret2"));
        assert!(!rendered.contains("AKIA123"));
        assert!(!rendered.contains("wJalr456"));
        assert_eq!(masked["db_password"], MASKED_VALUE);
        assert_eq!(masked["communal_storage"]["aws_access_key_id"], MASKED_VALUE);
        assert_eq!(masked["nodes"][0]["db_password"], MASKED_VALUE);
        // Non-sensitive content is untouched.
        assert_eq!(masked["db_name"], "verticadb");
    }
}

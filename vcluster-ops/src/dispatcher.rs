// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Fans an operation's request collection out over its target hosts
//! with bounded parallelism.
//!
//! The pool is resized by `setup` before every operation because
//! different operations target host sets of different sizes. A fan-out
//! always drains: even when the plan is about to fail, in-flight
//! requests are joined, never abandoned.

use crate::adapter::{HostHttpResult, HttpAdapter};
use crate::http_request::ClusterHttpRequest;
use slog::{debug, o, Logger};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Upper bound on worker slots regardless of host-set size.
pub const DEFAULT_MAX_PARALLELISM: usize = 16;

pub struct HttpRequestDispatcher {
    log: Logger,
    max_parallelism: usize,
    /// Worker slots for the current operation, set by `setup`.
    pool_size: usize,
}

impl HttpRequestDispatcher {
    pub fn new(log: &Logger) -> Self {
        Self::new_with_parallelism(log, DEFAULT_MAX_PARALLELISM)
    }

    pub fn new_with_parallelism(log: &Logger, max_parallelism: usize) -> Self {
        HttpRequestDispatcher {
            log: log.new(o!("component" => "HttpRequestDispatcher")),
            max_parallelism: max_parallelism.max(1),
            pool_size: 1,
        }
    }

    /// Resize the worker pool for the next fan-out.
    pub fn setup(&mut self, hosts: &[String]) {
        self.pool_size = hosts.len().clamp(1, self.max_parallelism);
        debug!(self.log, "dispatcher pool resized";
            "hosts" => hosts.len(), "pool_size" => self.pool_size);
    }

    /// Run the request collection, one adapter call per host, and fill
    /// the result collection. Exactly one result is recorded per
    /// registered host. Ordering across hosts is not guaranteed.
    pub async fn send_request(&self, cluster_request: &mut ClusterHttpRequest) {
        cluster_request.result_collection.clear();

        let semaphore = Arc::new(Semaphore::new(self.pool_size));
        let mut workers: JoinSet<HostHttpResult> = JoinSet::new();

        for (host, request) in &cluster_request.request_collection {
            let semaphore = Arc::clone(&semaphore);
            let adapter = HttpAdapter::new(&self.log);
            let host = host.clone();
            let request = request.clone();
            workers.spawn(async move {
                // Hold the slot for the full duration of the call.
                let _permit =
                    semaphore.acquire_owned().await.expect("semaphore is never closed");
                adapter.send_request(&host, &request).await
            });
        }

        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(result) => {
                    cluster_request.result_collection.insert(result.host.clone(), result);
                }
                Err(e) => {
                    // A panicked worker would leave a host without a
                    // result; surface it loudly rather than hang the
                    // result-count invariant.
                    panic!("dispatcher worker task failed: {e}");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_request::{HostHttpRequest, Method};
    use httptest::{matchers::*, responders::*, Expectation, Server};
    use slog::Logger;

    fn test_logger() -> Logger {
        Logger::root(slog::Discard, slog::o!())
    }

    #[tokio::test]
    async fn one_result_per_host() {
        let servers: Vec<Server> = (0..3).map(|_| Server::run()).collect();
        for server in &servers {
            server.expect(
                Expectation::matching(request::method_path("GET", "/v1/health"))
                    .respond_with(json_encoded(serde_json::json!({"healthy": "true"}))),
            );
        }

        let mut cluster_request = ClusterHttpRequest::default();
        let hosts: Vec<String> = servers.iter().map(|s| s.addr().to_string()).collect();
        for host in &hosts {
            cluster_request
                .request_collection
                .insert(host.clone(), HostHttpRequest::nma(Method::GET, "health"));
        }

        let mut dispatcher = HttpRequestDispatcher::new(&test_logger());
        dispatcher.setup(&hosts);
        dispatcher.send_request(&mut cluster_request).await;

        assert_eq!(cluster_request.result_collection.len(), hosts.len());
        for host in &hosts {
            assert!(cluster_request.result_collection[host].is_passing());
        }
    }

    #[tokio::test]
    async fn mixed_outcomes_are_all_recorded() {
        let ok = Server::run();
        ok.expect(Expectation::matching(any()).respond_with(status_code(200)));
        let failing = Server::run();
        failing.expect(Expectation::matching(any()).respond_with(status_code(500)));

        let hosts = vec![
            ok.addr().to_string(),
            failing.addr().to_string(),
            // TEST-NET: transport error.
            "192.0.2.1:9".to_string(),
        ];
        let mut cluster_request = ClusterHttpRequest::default();
        for host in &hosts {
            cluster_request.request_collection.insert(
                host.clone(),
                HostHttpRequest::nma(Method::GET, "health")
                    .with_timeout(std::time::Duration::from_millis(500)),
            );
        }

        let mut dispatcher = HttpRequestDispatcher::new(&test_logger());
        dispatcher.setup(&hosts);
        dispatcher.send_request(&mut cluster_request).await;

        assert_eq!(cluster_request.result_collection.len(), 3);
        assert!(cluster_request.result_collection[&hosts[0]].is_passing());
        assert!(cluster_request.result_collection[&hosts[1]].is_internal_error());
        assert!(cluster_request.result_collection[&hosts[2]].is_exception());
    }
}

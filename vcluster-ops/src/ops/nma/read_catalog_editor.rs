// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Catalog-editor read: every host reports its locally-visible catalog
//! image and version counter. Finalize publishes the host set holding
//! the maximum version (the config-transfer source) and the parsed
//! catalog snapshot.

use crate::error::{HostErrors, OpsError};
use crate::exec_context::OpEngineExecContext;
use crate::http_request::{HostHttpRequest, Method};
use crate::op::{parse_and_check_response, ClusterOp, OpBase};
use crate::ops::effective_vdb;
use crate::vdb::{catalog_root, CoordinationDatabase, NmaDatabase};
use async_trait::async_trait;
use slog::{info, Logger};
use std::collections::BTreeMap;

pub struct NmaReadCatalogEditorOp {
    base: OpBase,
    vdb: CoordinationDatabase,
    /// Per-host parsed catalog images, collected in `process_result`.
    host_catalogs: BTreeMap<String, NmaDatabase>,
}

impl NmaReadCatalogEditorOp {
    /// `vdb` should normally hold primary nodes only; those are the
    /// hosts whose catalogs are candidates for the transfer source.
    pub fn new(log: &Logger, vdb: CoordinationDatabase) -> Self {
        NmaReadCatalogEditorOp {
            base: OpBase::new("NMAReadCatalogEditorOp", log, vec![]),
            vdb,
            host_catalogs: BTreeMap::new(),
        }
    }
}

#[async_trait]
impl ClusterOp for NmaReadCatalogEditorOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    async fn prepare(&mut self, ctx: &mut OpEngineExecContext) -> Result<(), OpsError> {
        let vdb = effective_vdb(&self.vdb, ctx);
        if vdb.is_empty() {
            return Err(OpsError::internal(
                self.name(),
                "no node information available to read the catalog editor",
            ));
        }
        let mut requests = Vec::new();
        for host in vdb.hosts() {
            let node = vdb.node(host).expect("host list and node map are consistent");
            let request = HostHttpRequest::nma(Method::GET, "catalog/database")
                .with_query("catalog_path", catalog_root(node.catalog_path.as_str()));
            requests.push((host.clone(), request));
        }
        self.base.hosts = requests.iter().map(|(host, _)| host.clone()).collect();
        ctx.dispatcher.setup(&self.base.hosts);
        for (host, request) in requests {
            self.base.register_request(&host, request);
        }
        Ok(())
    }

    fn process_result(&mut self, _ctx: &mut OpEngineExecContext) -> Result<(), OpsError> {
        let name = self.name();
        let mut errors = HostErrors::new();
        let mut catalogs = BTreeMap::new();
        for result in self.base.results().values() {
            self.log_response(result);
            if !result.is_passing() {
                if let Some(err) = &result.err {
                    errors.push(err.clone());
                }
                continue;
            }
            match parse_and_check_response::<NmaDatabase>(name, &result.host, &result.content) {
                Ok(catalog) => {
                    catalogs.insert(result.host.clone(), catalog);
                }
                Err(e) => errors.push(e),
            }
        }
        // One readable catalog is enough to determine the transfer
        // source; only a full miss fails the step.
        if catalogs.is_empty() {
            errors.into_result(name)?;
            return Err(OpsError::semantic(name, "no host returned a valid catalog image"));
        }
        self.host_catalogs = catalogs;
        Ok(())
    }

    async fn finalize(&mut self, ctx: &mut OpEngineExecContext) -> Result<(), OpsError> {
        let max_version = self
            .host_catalogs
            .values()
            .map(|catalog| catalog.version)
            .max()
            .expect("process_result guarantees at least one catalog");
        // BTreeMap iteration gives lexicographic host order, so ties on
        // the maximum version resolve to the smallest host set.
        let latest: Vec<String> = self
            .host_catalogs
            .iter()
            .filter(|(_, catalog)| catalog.version == max_version)
            .map(|(host, _)| host.clone())
            .collect();
        info!(self.base.log, "hosts with latest catalog selected";
            "catalog_version" => max_version, "hosts" => ?latest);

        ctx.nma_database = self.host_catalogs.get(&latest[0]).cloned();
        ctx.hosts_with_latest_catalog = latest;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::certs::HttpsCerts;
    use crate::engine::ClusterOpEngine;
    use httptest::{matchers::*, responders::*, Expectation, Server};
    use serde_json::json;

    fn test_logger() -> Logger {
        Logger::root(slog::Discard, slog::o!())
    }

    fn catalog_server(version: u64, host: &str) -> Server {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/v1/catalog/database"))
                .respond_with(json_encoded(json!({
                    "name": "testdb",
                    "version": version,
                    "nodes": [{
                        "name": "v_testdb_node0001",
                        "address": host,
                        "catalog_path": "/data/testdb/v_testdb_node0001_catalog/Catalog",
                        "is_primary": true,
                    }],
                }))),
        );
        server
    }

    fn vdb_for(hosts: &[String]) -> CoordinationDatabase {
        let mut vdb = CoordinationDatabase {
            name: "testdb".to_string(),
            catalog_prefix: "/data".into(),
            data_prefix: "/data".into(),
            ..Default::default()
        };
        vdb.add_hosts(hosts, "sc").unwrap();
        vdb
    }

    #[tokio::test]
    async fn latest_catalog_hosts_break_ties_lexicographically() {
        let s1 = catalog_server(7, "h1");
        let s2 = catalog_server(7, "h2");
        let s3 = catalog_server(6, "h3");
        let hosts: Vec<String> =
            [&s1, &s2, &s3].iter().map(|s| s.addr().to_string()).collect();

        let vdb = vdb_for(&hosts);
        let ops: Vec<Box<dyn ClusterOp>> =
            vec![Box::new(NmaReadCatalogEditorOp::new(&test_logger(), vdb))];
        let mut engine = ClusterOpEngine::new(ops, HttpsCerts::default());
        engine.run(&test_logger()).await.unwrap();

        let ctx = engine.exec_context().unwrap();
        let mut expected: Vec<String> = vec![hosts[0].clone(), hosts[1].clone()];
        expected.sort();
        assert_eq!(ctx.hosts_with_latest_catalog, expected);
        assert!(ctx.nma_database.is_some());
    }

    #[tokio::test]
    async fn one_valid_catalog_is_sufficient() {
        let good = catalog_server(4, "h1");
        let bad = Server::run();
        bad.expect(Expectation::matching(any()).respond_with(status_code(500)));
        let hosts = vec![good.addr().to_string(), bad.addr().to_string()];

        let vdb = vdb_for(&hosts);
        let ops: Vec<Box<dyn ClusterOp>> =
            vec![Box::new(NmaReadCatalogEditorOp::new(&test_logger(), vdb))];
        let mut engine = ClusterOpEngine::new(ops, HttpsCerts::default());
        engine.run(&test_logger()).await.unwrap();
        let ctx = engine.exec_context().unwrap();
        assert_eq!(ctx.hosts_with_latest_catalog, vec![hosts[0].clone()]);
    }

    #[tokio::test]
    async fn all_invalid_catalogs_fail_the_step() {
        let bad = Server::run();
        bad.expect(Expectation::matching(any()).respond_with(status_code(500)));
        let hosts = vec![bad.addr().to_string()];
        let vdb = vdb_for(&hosts);
        let ops: Vec<Box<dyn ClusterOp>> =
            vec![Box::new(NmaReadCatalogEditorOp::new(&test_logger(), vdb))];
        let mut engine = ClusterOpEngine::new(ops, HttpsCerts::default());
        assert!(engine.run(&test_logger()).await.is_err());
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! End-to-end config transfer against fake node management agents:
//! the catalog-editor read selects the freshest hosts, the download
//! pulls from one of them, and the upload reaches exactly the hosts
//! lacking the latest catalog.

use httptest::{matchers::*, responders::*, Expectation, Server};
use serde_json::json;
use slog::Logger;
use vcluster_ops::certs::HttpsCerts;
use vcluster_ops::engine::ClusterOpEngine;
use vcluster_ops::op::ClusterOp;
use vcluster_ops::ops::nma::{
    ConfigType, NmaDownloadConfigOp, NmaReadCatalogEditorOp, NmaUploadConfigOp,
};
use vcluster_ops::vdb::CoordinationDatabase;

fn test_logger() -> Logger {
    Logger::root(slog::Discard, slog::o!())
}

/// A catalog image naming all hosts, as every agent reports the same
/// topology but its own version counter.
fn catalog_body(version: u64, hosts: &[String]) -> serde_json::Value {
    let nodes: Vec<serde_json::Value> = hosts
        .iter()
        .enumerate()
        .map(|(index, host)| {
            json!({
                "name": format!("v_testdb_node{:04}", index + 1),
                "address": host,
                "catalog_path": format!(
                    "/data/testdb/v_testdb_node{:04}_catalog/Catalog", index + 1),
                "is_primary": true,
            })
        })
        .collect();
    json!({"name": "testdb", "version": version, "nodes": nodes})
}

fn vdb_for(hosts: &[String]) -> CoordinationDatabase {
    let mut vdb = CoordinationDatabase::new();
    vdb.name = "testdb".to_string();
    vdb.catalog_prefix = "/data".into();
    vdb.data_prefix = "/data".into();
    vdb.add_hosts(hosts, "default_subcluster").unwrap();
    vdb
}

#[tokio::test]
async fn upload_targets_are_exactly_the_stale_hosts() {
    let servers: Vec<Server> = (0..3).map(|_| Server::run()).collect();
    let hosts: Vec<String> = servers.iter().map(|s| s.addr().to_string()).collect();

    // Two hosts at version 7, one stale host at version 6.
    for (server, version) in servers.iter().zip([7u64, 7, 6]) {
        server.expect(
            Expectation::matching(request::method_path("GET", "/v1/catalog/database"))
                .respond_with(json_encoded(catalog_body(version, &hosts))),
        );
    }
    // The download is served by a host with the latest catalog.
    for server in &servers[0..2] {
        server.expect(
            Expectation::matching(request::method_path("GET", "/v1/config/download"))
                .times(0..)
                .respond_with(status_code(200).body("config file payload")),
        );
    }
    // Only the stale host receives an upload; the expectation fails the
    // test if it is not hit exactly once.
    servers[2].expect(
        Expectation::matching(request::method_path("POST", "/v1/config/upload"))
            .times(1)
            .respond_with(json_encoded(json!({
                "destination": "/data/testdb/v_testdb_node0003_catalog/vertica.conf",
            }))),
    );

    let instructions: Vec<Box<dyn ClusterOp>> = vec![
        Box::new(NmaReadCatalogEditorOp::new(&test_logger(), vdb_for(&hosts))),
        Box::new(NmaDownloadConfigOp::new(&test_logger(), ConfigType::Vertica, None, None)),
        Box::new(NmaUploadConfigOp::new(
            &test_logger(),
            ConfigType::Vertica,
            None,
            hosts.clone(),
            None,
            false,
        )),
    ];
    let mut engine = ClusterOpEngine::new(instructions, HttpsCerts::default());
    engine.run(&test_logger()).await.unwrap();

    let ctx = engine.exec_context().unwrap();
    let mut latest: Vec<String> = hosts[0..2].to_vec();
    latest.sort();
    assert_eq!(ctx.hosts_with_latest_catalog, latest);
    assert_eq!(ctx.conf_file_content.as_deref(), Some("config file payload"));
}

#[tokio::test]
async fn upload_skips_itself_when_every_host_is_current() {
    let servers: Vec<Server> = (0..2).map(|_| Server::run()).collect();
    let hosts: Vec<String> = servers.iter().map(|s| s.addr().to_string()).collect();

    for server in &servers {
        server.expect(
            Expectation::matching(request::method_path("GET", "/v1/catalog/database"))
                .respond_with(json_encoded(catalog_body(9, &hosts))),
        );
        // No upload may reach any host.
        server.expect(
            Expectation::matching(request::method_path("POST", "/v1/config/upload"))
                .times(0)
                .respond_with(status_code(500)),
        );
    }

    let instructions: Vec<Box<dyn ClusterOp>> = vec![
        Box::new(NmaReadCatalogEditorOp::new(&test_logger(), vdb_for(&hosts))),
        Box::new(NmaUploadConfigOp::new(
            &test_logger(),
            ConfigType::Vertica,
            None,
            hosts.clone(),
            None,
            false,
        )),
    ];
    let mut engine = ClusterOpEngine::new(instructions, HttpsCerts::default());
    engine.run(&test_logger()).await.unwrap();
}

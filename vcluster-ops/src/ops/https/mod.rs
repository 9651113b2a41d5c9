// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Operations against the engine's embedded HTTPS service (TLS,
//! optional basic auth).

mod check_running_db;
mod check_subcluster;
mod check_subcluster_sandbox;
mod create_depot;
mod create_node;
mod create_subcluster;
mod drain_subcluster;
mod drop_node;
mod drop_subcluster;
mod find_subcluster;
mod get_nodes_info;
mod get_up_nodes;
mod install_packages;
mod mark_ksafe;
mod poll_node_state;
mod poll_subscription_state;
mod re_ip;
mod rebalance_shards;
mod reload_spread;
mod restore_points;
mod sandbox_subcluster;
mod shutdown_db;
mod startup_command;
mod sync_catalog;

pub use check_running_db::{CheckDbRunningReason, HttpsCheckRunningDbOp};
pub use check_subcluster::HttpsCheckSubclusterOp;
pub use check_subcluster_sandbox::HttpsCheckSubclusterSandboxOp;
pub use create_depot::HttpsCreateNodesDepotOp;
pub use create_node::HttpsCreateNodeOp;
pub use create_subcluster::HttpsCreateSubclusterOp;
pub use drain_subcluster::HttpsDrainSubclusterOp;
pub use drop_node::HttpsDropNodeOp;
pub use drop_subcluster::HttpsDropSubclusterOp;
pub use find_subcluster::{HttpsFindSubclusterOp, SubclusterExpectation};
pub use get_nodes_info::HttpsGetNodesInfoOp;
pub use get_up_nodes::HttpsGetUpNodesOp;
pub use install_packages::HttpsInstallPackagesOp;
pub use mark_ksafe::HttpsMarkDesignKSafeOp;
pub use poll_node_state::{HttpsPollNodeStateOp, NodeStateTarget};
pub use poll_subscription_state::HttpsPollSubscriptionStateOp;
pub use re_ip::HttpsReIpOp;
pub use rebalance_shards::HttpsRebalanceSubclusterShardsOp;
pub use reload_spread::HttpsReloadSpreadOp;
pub use restore_points::{HttpsShowRestorePointsOp, RestorePoint};
pub use sandbox_subcluster::{HttpsSandboxSubclusterOp, SandboxDirection};
pub use shutdown_db::HttpsShutdownDbOp;
pub use startup_command::HttpsStartUpCommandOp;
pub use sync_catalog::HttpsSyncCatalogOp;

use serde::Deserialize;

/// The `GET /v1/nodes` response shared by discovery and polling ops.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct NodesResponse {
    #[serde(default)]
    pub node_list: Vec<NodeDetails>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct NodeDetails {
    pub name: String,
    pub address: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub is_primary: bool,
    #[serde(default)]
    pub catalog_path: String,
    #[serde(default)]
    pub subcluster_name: String,
    /// Empty for nodes in the main cluster.
    #[serde(default)]
    pub sandbox: String,
}

/// The `GET /v1/subclusters/<name>` (and list) entry.
#[derive(Clone, Debug, Deserialize)]
pub struct SubclusterInfo {
    pub subcluster_name: String,
    #[serde(default)]
    pub is_secondary: bool,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub control_set_size: i64,
    #[serde(default)]
    pub sandbox: String,
}

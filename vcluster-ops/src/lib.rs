// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! vcluster-ops administers a distributed analytic database cluster
//! over the HTTP interfaces of two per-host agents: the Node
//! Management Agent (filesystem and process control, plain HTTP) and
//! the HTTPS service embedded in the database engine.
//!
//! Every administrative command produces an ordered plan of
//! operations. The [`engine::ClusterOpEngine`] drives each operation
//! through `prepare -> execute -> finalize`, fanning per-host requests
//! out with bounded parallelism and stopping at the first failing
//! step. Data flows forward between operations through the
//! [`exec_context::OpEngineExecContext`] only.
//!
//! Library users start from [`ClusterCommands`]: one method per
//! command (create, start, stop, drop, revive, node and subcluster
//! management, sandboxing, package installation, restore points).

pub mod adapter;
pub mod certs;
pub mod cluster_config;
pub mod commands;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod exec_context;
pub mod http_request;
pub mod op;
pub mod ops;
pub mod vdb;

pub use commands::{
    AddNodeOptions, AddSubclusterOptions, ClusterCommands, CreateDbOptions, DatabaseOptions,
    DropDbOptions, InstallPackagesOptions, ReIpOptions, RemoveNodeOptions,
    RemoveSubclusterOptions, RestartNodeOptions, ReviveDbOptions, ReviveDbResult,
    SandboxOptions, ShowRestorePointsOptions, StartDbOptions, StopDbOptions, UnsandboxOptions,
};
pub use error::OpsError;
pub use vdb::{CoordinationDatabase, CoordinationNode, NodeState};

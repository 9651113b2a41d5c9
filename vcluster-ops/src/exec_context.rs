// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The execution context shared across one plan.
//!
//! This is the only sanctioned mutable state between operations: an
//! operation publishes data in `finalize` and a later operation consumes
//! it in `prepare`. The engine creates the context at plan start and the
//! command may inspect it after the plan completes.

use crate::dispatcher::HttpRequestDispatcher;
use crate::vdb::{CoordinationDatabase, NmaDatabase};
use serde::Deserialize;
use slog::{o, Logger};
use std::collections::BTreeMap;

/// One host's network profile, reported by the NMA.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct NetworkProfile {
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub subnet: String,
    #[serde(default)]
    pub netmask: String,
    #[serde(default)]
    pub broadcast: String,
}

pub struct OpEngineExecContext {
    pub dispatcher: HttpRequestDispatcher,

    /// UP hosts discovered by an up-node probe, sorted.
    pub up_hosts: Vec<String>,
    /// Sandbox name per discovered host; empty string for hosts in the
    /// main cluster.
    pub node_sandboxes: BTreeMap<String, String>,
    /// Hosts belonging to the subcluster a sandbox command targets.
    pub sc_hosts: Vec<String>,
    /// Eligible initiators for a sandbox operation: up hosts outside
    /// the target subcluster and outside any sandbox.
    pub sandboxing_hosts: Vec<String>,

    /// The default subcluster name discovered by find-subcluster, for
    /// node creation when the caller named no subcluster.
    pub default_sc_name: Option<String>,

    /// Hosts whose catalog version equals the maximum seen by the
    /// catalog-editor read; sorted, so ties resolve to the
    /// lexicographically smallest set.
    pub hosts_with_latest_catalog: Vec<String>,
    /// The catalog snapshot parsed from a host with the latest catalog.
    pub nma_database: Option<NmaDatabase>,

    /// Node info refreshed from a running database mid-plan (for
    /// example after re-IP); downstream operations prefer this over the
    /// vdb they were constructed with.
    pub nodes_info: Option<CoordinationDatabase>,

    /// Config file content bound by download-config for the following
    /// upload-config.
    pub conf_file_content: Option<String>,
    /// Per-node start commands fetched from a running node
    /// (`node name -> argv`).
    pub startup_commands: BTreeMap<String, Vec<String>>,
    /// Network profiles keyed by host.
    pub network_profiles: BTreeMap<String, NetworkProfile>,
    /// Restore points listed by show-restore-points.
    pub restore_points: Vec<crate::ops::https::RestorePoint>,

    log: Logger,
}

impl OpEngineExecContext {
    pub fn new(log: &Logger) -> Self {
        let log = log.new(o!("component" => "OpEngine"));
        OpEngineExecContext {
            dispatcher: HttpRequestDispatcher::new(&log),
            up_hosts: Vec::new(),
            node_sandboxes: BTreeMap::new(),
            sc_hosts: Vec::new(),
            sandboxing_hosts: Vec::new(),
            default_sc_name: None,
            hosts_with_latest_catalog: Vec::new(),
            nma_database: None,
            nodes_info: None,
            conf_file_content: None,
            startup_commands: BTreeMap::new(),
            network_profiles: BTreeMap::new(),
            restore_points: Vec::new(),
            log,
        }
    }

    pub fn log(&self) -> &Logger {
        &self.log
    }
}

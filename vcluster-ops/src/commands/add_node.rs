// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! add_node: grow an existing database by one or more hosts.

use crate::commands::{ClusterCommands, DatabaseOptions};
use crate::engine::ClusterOpEngine;
use crate::error::OpsError;
use crate::op::ClusterOp;
use crate::ops::https::{
    HttpsCreateNodeOp, HttpsCreateNodesDepotOp, HttpsDropNodeOp, HttpsFindSubclusterOp,
    HttpsMarkDesignKSafeOp, HttpsPollNodeStateOp, HttpsRebalanceSubclusterShardsOp,
    HttpsReloadSpreadOp, HttpsStartUpCommandOp, HttpsSyncCatalogOp, NodeStateTarget,
    SubclusterExpectation,
};
use crate::ops::nma::{
    ConfigType, NmaDownloadConfigOp, NmaHealthOp, NmaNetworkProfileOp, NmaPrepareDirectoriesOp,
    NmaStartNodeOp, NmaUploadConfigOp, NmaVerticaVersionOp,
};
use crate::ops::{
    initiator_host, DEFAULT_STATE_POLLING_TIMEOUT, KSAFETY_THRESHOLD, KSAFE_VALUE_ZERO,
};
use crate::vdb::{CoordinationDatabase, NodeState};
use slog::info;
use std::collections::BTreeMap;
use std::time::Duration;
use vcluster_common::{collections, net};

pub struct AddNodeOptions {
    pub db: DatabaseOptions,
    /// Hosts to add, as the caller wrote them.
    pub new_raw_hosts: Vec<String>,
    /// Eon: the subcluster the new nodes join; empty means the default
    /// subcluster.
    pub sc_name: String,
    pub depot_size: Option<String>,
    pub skip_rebalance_shards: bool,
    /// Clean non-empty directories on the new hosts instead of failing.
    pub force_removal: bool,
    pub startup_conf: String,
    /// The node names expected to be in the catalog; anything else is
    /// a leftover of a failed add and is trimmed first.
    pub expected_node_names: Vec<String>,
    pub state_polling_timeout: Option<Duration>,

    new_hosts: Vec<String>,
}

impl Default for AddNodeOptions {
    fn default() -> Self {
        AddNodeOptions {
            db: DatabaseOptions::default(),
            new_raw_hosts: Vec::new(),
            sc_name: String::new(),
            depot_size: None,
            skip_rebalance_shards: false,
            force_removal: false,
            startup_conf: String::new(),
            expected_node_names: Vec::new(),
            state_polling_timeout: None,
            new_hosts: Vec::new(),
        }
    }
}

impl AddNodeOptions {
    fn validate_analyze(&mut self) -> Result<(), OpsError> {
        self.db.validate_base("add_node")?;
        if self.new_raw_hosts.is_empty() {
            return Err(OpsError::validation("add_node requires at least one new host"));
        }
        self.new_hosts = net::resolve_raw_hosts(&self.new_raw_hosts, self.db.ipv6)
            .map_err(|e| OpsError::validation(e.to_string()))?;
        self.db.analyze()?;
        self.db.set_use_password()
    }
}

impl ClusterCommands {
    pub async fn add_node(
        &self,
        options: &mut AddNodeOptions,
    ) -> Result<CoordinationDatabase, OpsError> {
        options.validate_analyze()?;

        let mut vdb = self.vdb_from_running_db(&options.db).await?;
        complete_vdb_from_options(&mut vdb, options);

        if vdb.is_eon && options.db.depot_prefix.is_none() && vdb.use_depot() {
            return Err(OpsError::validation(
                "the database uses a depot; add_node requires the depot path",
            ));
        }

        let initiator = initiator_host(&vdb.primary_up_nodes, &[])?;

        self.trim_nodes_in_catalog(&mut vdb, options, &initiator).await?;

        // The hosts being added must not already be part of the
        // database.
        let (already_in_db, _) = vdb.contain_nodes(&options.new_hosts);
        if !already_in_db.is_empty() {
            return Err(OpsError::precondition(format!(
                "{} already exist in the database",
                already_in_db.join(", ")
            )));
        }

        vdb.add_hosts(&options.new_hosts, &options.sc_name)?;

        let instructions = self.produce_add_node_instructions(&vdb, options, &initiator)?;
        let mut engine = ClusterOpEngine::new(instructions, options.db.certs());
        engine.run(&self.log).await?;

        vdb.write_cluster_config(options.db.config_directory.as_deref())?;
        Ok(vdb)
    }

    /// Remove partially-added DOWN nodes whose names the caller did not
    /// expect, lowering k-safety first when the survivors are too few.
    async fn trim_nodes_in_catalog(
        &self,
        vdb: &mut CoordinationDatabase,
        options: &AddNodeOptions,
        initiator: &str,
    ) -> Result<(), OpsError> {
        if options.expected_node_names.is_empty() {
            return Ok(());
        }
        let expected: std::collections::BTreeSet<&str> =
            options.expected_node_names.iter().map(String::as_str).collect();

        let mut alive_hosts = Vec::new();
        let mut nodes_to_trim = Vec::new();
        let mut names_in_catalog = std::collections::BTreeSet::new();
        for host in vdb.hosts() {
            let node = vdb.node(host).expect("vdb owns its hosts");
            names_in_catalog.insert(node.name.clone());
            if expected.contains(node.name.as_str()) {
                alive_hosts.push(host.clone());
            } else {
                if node.state == NodeState::Up {
                    return Err(OpsError::precondition(format!(
                        "cannot trim the UP node {} (address {})",
                        node.name, host
                    )));
                }
                nodes_to_trim.push(node.name.clone());
            }
        }
        let unknown: Vec<&str> = expected
            .iter()
            .copied()
            .filter(|name| !names_in_catalog.contains(*name))
            .collect();
        if !unknown.is_empty() {
            return Err(OpsError::validation(format!(
                "expected node names {unknown:?} are not in database {}",
                vdb.name
            )));
        }
        if nodes_to_trim.is_empty() {
            return Ok(());
        }
        info!(self.log, "trimming leftover nodes from the catalog";
            "nodes" => ?nodes_to_trim);

        let mut instructions: Vec<Box<dyn ClusterOp>> = Vec::new();
        if alive_hosts.len() < KSAFETY_THRESHOLD {
            instructions.push(Box::new(HttpsMarkDesignKSafeOp::new(
                &self.log,
                vec![initiator.to_string()],
                options.db.use_password,
                options.db.username_str(),
                options.db.password.as_ref(),
                KSAFE_VALUE_ZERO,
            )?));
        }
        for node_name in &nodes_to_trim {
            instructions.push(Box::new(HttpsDropNodeOp::new(
                &self.log,
                node_name,
                initiator,
                options.db.use_password,
                options.db.username_str(),
                options.db.password.as_ref(),
                vdb.is_eon,
            )?));
        }
        let mut engine = ClusterOpEngine::new(instructions, options.db.certs());
        engine.run(&self.log).await?;

        vdb.retain_hosts(&alive_hosts);
        Ok(())
    }

    fn produce_add_node_instructions(
        &self,
        vdb: &CoordinationDatabase,
        options: &AddNodeOptions,
        initiator: &str,
    ) -> Result<Vec<Box<dyn ClusterOp>>, OpsError> {
        let all_hosts = vdb.hosts().to_vec();
        let new_hosts = options.new_hosts.clone();
        let existing_hosts = collections::slice_diff(&all_hosts, &new_hosts);

        let mut instructions: Vec<Box<dyn ClusterOp>> =
            vec![Box::new(NmaHealthOp::new(&self.log, all_hosts.clone()))];

        if vdb.is_eon {
            instructions.push(Box::new(HttpsFindSubclusterOp::new(
                &self.log,
                existing_hosts,
                options.db.use_password,
                options.db.username_str(),
                options.db.password.as_ref(),
                &options.sc_name,
                SubclusterExpectation::IgnoreNotFound,
            )?));
        }

        instructions.push(Box::new(NmaVerticaVersionOp::new(&self.log, all_hosts.clone(), true)));

        let new_host_nodes: BTreeMap<_, _> = new_hosts
            .iter()
            .map(|host| (host.clone(), vdb.node(host).expect("vdb owns its hosts").clone()))
            .collect();
        instructions.push(Box::new(NmaPrepareDirectoriesOp::new(
            &self.log,
            new_host_nodes,
            options.force_removal,
            false,
        )));
        instructions.push(Box::new(NmaNetworkProfileOp::new(&self.log, all_hosts.clone())));
        instructions.push(Box::new(HttpsCreateNodeOp::new(
            &self.log,
            new_hosts.clone(),
            initiator,
            options.db.use_password,
            options.db.username_str(),
            options.db.password.as_ref(),
            vdb.clone(),
            &options.sc_name,
        )?));
        instructions.push(Box::new(HttpsReloadSpreadOp::new(
            &self.log,
            vec![initiator.to_string()],
            options.db.use_password,
            options.db.username_str(),
            options.db.password.as_ref(),
        )?));
        instructions.push(Box::new(HttpsStartUpCommandOp::new(
            &self.log,
            vec![initiator.to_string()],
            options.db.use_password,
            options.db.username_str(),
            options.db.password.as_ref(),
        )?));

        // The new nodes need the cluster's configuration files before
        // they can start.
        for config_type in [ConfigType::Vertica, ConfigType::Spread] {
            instructions.push(Box::new(NmaDownloadConfigOp::new(
                &self.log,
                config_type,
                Some(vec![initiator.to_string()]),
                Some(vdb.clone()),
            )));
            instructions.push(Box::new(NmaUploadConfigOp::new(
                &self.log,
                config_type,
                Some(vec![initiator.to_string()]),
                new_hosts.clone(),
                Some(vdb.copy(&new_hosts)),
                false,
            )));
        }

        instructions.push(Box::new(NmaStartNodeOp::with_vdb(
            &self.log,
            new_hosts.clone(),
            &options.startup_conf,
            vdb.clone(),
        )));
        instructions.push(Box::new(HttpsPollNodeStateOp::new(
            &self.log,
            new_hosts.clone(),
            options.db.use_password,
            options.db.username_str(),
            options.db.password.as_ref(),
            Some(options.state_polling_timeout.unwrap_or(DEFAULT_STATE_POLLING_TIMEOUT)),
            NodeStateTarget::Up,
        )?));

        if vdb.use_depot() {
            instructions.push(Box::new(HttpsCreateNodesDepotOp::new(
                &self.log,
                vdb,
                new_hosts.clone(),
                options.db.use_password,
                options.db.username_str(),
                options.db.password.as_ref(),
            )?));
        }
        if vdb.is_eon {
            instructions.push(Box::new(HttpsSyncCatalogOp::new(
                &self.log,
                vec![initiator.to_string()],
                options.db.use_password,
                options.db.username_str(),
                options.db.password.as_ref(),
                "add_node",
            )?));
            if !options.skip_rebalance_shards {
                instructions.push(Box::new(HttpsRebalanceSubclusterShardsOp::new(
                    &self.log,
                    vec![initiator.to_string()],
                    options.db.use_password,
                    options.db.username_str(),
                    options.db.password.as_ref(),
                    &options.sc_name,
                )?));
            }
        }
        Ok(instructions)
    }
}

/// The `/nodes` endpoint does not report path prefixes; fill them in
/// from the options and regenerate per-node paths so directory
/// operations know what to touch.
fn complete_vdb_from_options(vdb: &mut CoordinationDatabase, options: &AddNodeOptions) {
    if let Some(data_prefix) = &options.db.data_prefix {
        vdb.data_prefix = data_prefix.clone();
    }
    if let Some(catalog_prefix) = &options.db.catalog_prefix {
        vdb.catalog_prefix = catalog_prefix.clone();
    }
    vdb.depot_prefix = options.db.depot_prefix.clone();
    vdb.depot_size = options.depot_size.clone();
    if options.db.communal_storage_location.is_some() {
        vdb.communal_storage_location = options.db.communal_storage_location.clone();
        vdb.is_eon = true;
    }

    let hosts: Vec<String> = vdb.hosts().to_vec();
    for host in hosts {
        let data_path = vdb.gen_data_path(&vdb.node(&host).expect("host exists").name.clone());
        let depot_path = vdb
            .depot_prefix
            .as_ref()
            .map(|_| vdb.gen_depot_path(&vdb.node(&host).expect("host exists").name.clone()));
        let node = vdb.node_mut(&host).expect("host exists");
        if node.storage_locations.is_empty() {
            node.storage_locations.push(data_path);
        }
        if node.depot_path.is_none() {
            node.depot_path = depot_path;
        }
    }
}

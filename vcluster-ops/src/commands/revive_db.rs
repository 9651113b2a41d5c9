// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! revive_db: bring a database back from communal storage onto a fresh
//! set of hosts.
//!
//! The cluster description fetched from communal storage names the
//! nodes and their paths; the provided hosts take those identities in
//! order. With `display_only` the command stops after the fetch and
//! returns the description.

use crate::cluster_config::ClusterConfig;
use crate::commands::{ClusterCommands, DatabaseOptions};
use crate::engine::ClusterOpEngine;
use crate::error::OpsError;
use crate::op::ClusterOp;
use crate::ops::https::{HttpsPollNodeStateOp, NodeStateTarget};
use crate::ops::nma::{
    ConfigType, NmaDownloadConfigOp, NmaHealthOp, NmaPrepareDirectoriesOp, NmaStartNodeOp,
    NmaUploadConfigOp,
};
use crate::ops::DEFAULT_LOAD_CATALOG_TIMEOUT;
use crate::vdb::CoordinationDatabase;
use slog::info;
use std::collections::BTreeMap;
use std::time::Duration;
use vcluster_common::collections;

pub struct ReviveDbOptions {
    pub db: DatabaseOptions,
    /// Clean leftover directories on the new hosts.
    pub force_removal: bool,
    /// Fetch and return the cluster description without reviving.
    pub display_only: bool,
    /// Loading a large catalog from communal storage can take a while.
    pub load_catalog_timeout: Option<Duration>,
}

impl Default for ReviveDbOptions {
    fn default() -> Self {
        ReviveDbOptions {
            db: DatabaseOptions::default(),
            force_removal: false,
            display_only: false,
            load_catalog_timeout: None,
        }
    }
}

/// What a revive produced: the description is always present, the vdb
/// only when the database was actually revived.
pub struct ReviveDbResult {
    pub description: String,
    pub vdb: Option<CoordinationDatabase>,
}

impl ReviveDbOptions {
    fn validate_analyze(&mut self) -> Result<(), OpsError> {
        self.db.validate_base("revive_db")?;
        if self.db.communal_storage_location.is_none() {
            return Err(OpsError::validation(
                "revive_db requires a communal storage location",
            ));
        }
        // Even display-only needs an agent to fetch the description
        // through.
        if self.db.raw_hosts.is_empty() && self.db.hosts.is_empty() {
            return Err(OpsError::validation("revive_db requires at least one host"));
        }
        self.db.analyze()?;
        self.db.set_use_password()
    }
}

impl ClusterCommands {
    pub async fn revive_db(
        &self,
        options: &mut ReviveDbOptions,
    ) -> Result<ReviveDbResult, OpsError> {
        options.validate_analyze()?;
        let communal_location = options
            .db
            .communal_storage_location
            .clone()
            .expect("validated above");

        // Phase one: fetch the cluster description through one agent.
        let fetch_hosts = vec![options.db.hosts[0].clone()];
        let instructions: Vec<Box<dyn ClusterOp>> = vec![
            Box::new(NmaHealthOp::new(&self.log, options.db.hosts.clone())),
            Box::new(NmaDownloadConfigOp::from_communal(
                &self.log,
                &communal_location,
                fetch_hosts,
            )),
        ];
        let mut engine = ClusterOpEngine::new(instructions, options.db.certs());
        engine.run(&self.log).await?;
        let description = engine
            .exec_context()
            .and_then(|ctx| ctx.conf_file_content.clone())
            .ok_or_else(|| {
                OpsError::precondition(format!(
                    "no cluster description found at {communal_location}"
                ))
            })?;

        if options.display_only {
            return Ok(ReviveDbResult { description, vdb: None });
        }

        let vdb = self.vdb_from_description(options, &description)?;

        let instructions = self.produce_revive_db_instructions(options, &vdb, &communal_location)?;
        let mut engine = ClusterOpEngine::new(instructions, options.db.certs());
        engine.run(&self.log).await?;

        vdb.write_cluster_config(options.db.config_directory.as_deref())?;
        info!(self.log, "database revived"; "db" => &vdb.name);
        Ok(ReviveDbResult { description, vdb: Some(vdb) })
    }

    /// Rebuild the vdb from the description, assigning the provided
    /// hosts to the described nodes in order.
    fn vdb_from_description(
        &self,
        options: &ReviveDbOptions,
        description: &str,
    ) -> Result<CoordinationDatabase, OpsError> {
        let db_name = options.db.db_name()?;
        let config: ClusterConfig = serde_yaml::from_str(description).map_err(|e| {
            OpsError::precondition(format!("cannot parse the cluster description: {e}"))
        })?;
        let described = CoordinationDatabase::set_from_cluster_config(db_name, &config)?;
        if described.len() != options.db.hosts.len() {
            return Err(OpsError::precondition(format!(
                "the database was described with {} nodes but {} hosts were provided",
                described.len(),
                options.db.hosts.len()
            )));
        }

        let mut vdb = described.clone();
        vdb.retain_hosts(&[]);
        for (described_host, new_host) in described.hosts().iter().zip(&options.db.hosts) {
            let mut node = described.node(described_host).expect("vdb owns its hosts").clone();
            node.address = new_host.clone();
            vdb.add_node(node)?;
        }
        Ok(vdb)
    }

    fn produce_revive_db_instructions(
        &self,
        options: &ReviveDbOptions,
        vdb: &CoordinationDatabase,
        communal_location: &str,
    ) -> Result<Vec<Box<dyn ClusterOp>>, OpsError> {
        let hosts = vdb.hosts().to_vec();
        let bootstrap_host = hosts[0].clone();
        let rest_hosts = collections::slice_diff(&hosts, &[bootstrap_host.clone()]);

        let host_nodes: BTreeMap<_, _> = hosts
            .iter()
            .map(|host| (host.clone(), vdb.node(host).expect("vdb owns its hosts").clone()))
            .collect();

        let mut instructions: Vec<Box<dyn ClusterOp>> = vec![
            Box::new(NmaPrepareDirectoriesOp::new(
                &self.log,
                host_nodes,
                options.force_removal,
                true,
            )),
            Box::new(NmaDownloadConfigOp::from_communal(
                &self.log,
                communal_location,
                vec![bootstrap_host.clone()],
            )),
            Box::new(NmaUploadConfigOp::new(
                &self.log,
                ConfigType::Vertica,
                None,
                hosts.clone(),
                Some(vdb.clone()),
                false,
            )),
            // The bootstrap node loads the catalog from communal
            // storage first; the rest join it.
            Box::new(NmaStartNodeOp::with_vdb(
                &self.log,
                vec![bootstrap_host],
                "",
                vdb.clone(),
            )),
        ];
        if !rest_hosts.is_empty() {
            instructions.push(Box::new(NmaStartNodeOp::with_vdb(
                &self.log,
                rest_hosts,
                "",
                vdb.clone(),
            )));
        }
        instructions.push(Box::new(HttpsPollNodeStateOp::new(
            &self.log,
            hosts,
            options.db.use_password,
            options.db.username_str(),
            options.db.password.as_ref(),
            Some(options.load_catalog_timeout.unwrap_or(DEFAULT_LOAD_CATALOG_TIMEOUT)),
            NodeStateTarget::Up,
        )?));
        Ok(instructions)
    }
}

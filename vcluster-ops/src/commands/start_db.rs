// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! start_db: bring a stopped database back up.
//!
//! A pre-check plan verifies agent connectivity, confirms nothing is
//! already running, and gathers topology when the config file cannot
//! supply it. The main plan finds the freshest catalog, synchronizes
//! configuration onto stale hosts, starts every node, and polls until
//! the cluster reports UP.

use crate::cluster_config::{config_file_path, ClusterConfig};
use crate::commands::{ClusterCommands, DatabaseOptions};
use crate::engine::ClusterOpEngine;
use crate::error::OpsError;
use crate::op::ClusterOp;
use crate::ops::https::{
    CheckDbRunningReason, HttpsCheckRunningDbOp, HttpsPollNodeStateOp, HttpsSyncCatalogOp,
    NodeStateTarget,
};
use crate::ops::nma::{
    NmaGetNodesInfoOp, NmaHealthOp, NmaReadCatalogEditorOp, NmaSpreadSecurityOp,
    NmaStartNodeOp, NmaVerticaVersionOp,
};
use crate::ops::{produce_transfer_config_ops, DEFAULT_STATE_POLLING_TIMEOUT};
use crate::vdb::CoordinationDatabase;
use slog::{info, warn};
use std::time::Duration;

pub struct StartDbOptions {
    pub db: DatabaseOptions,
    /// Overall budget for waiting on node startup; `None` takes the
    /// default.
    pub state_polling_timeout: Option<Duration>,
    /// Remove input hosts that are not in the catalog instead of
    /// failing on them.
    pub trim_host_list: bool,
    /// When set, the NMA stores the start command at this path instead
    /// of executing it.
    pub startup_conf: String,
    /// The provided hosts live in a sandbox; the config file cannot
    /// describe them accurately.
    pub hosts_in_sandbox: bool,
    /// Rotate the spread encryption key before startup; only the
    /// `vertica` key type is supported.
    pub spread_encryption_key_type: Option<String>,
}

impl Default for StartDbOptions {
    fn default() -> Self {
        StartDbOptions {
            db: DatabaseOptions::default(),
            state_polling_timeout: None,
            trim_host_list: false,
            startup_conf: String::new(),
            hosts_in_sandbox: false,
            spread_encryption_key_type: None,
        }
    }
}

impl StartDbOptions {
    fn validate_analyze(&mut self) -> Result<(), OpsError> {
        self.db.validate_base("start_db")?;
        if self.db.raw_hosts.is_empty() && self.db.hosts.is_empty() {
            return Err(OpsError::validation("start_db requires at least one host"));
        }
        self.db.analyze()?;
        self.db.set_use_password()
    }
}

impl ClusterCommands {
    pub async fn start_db(
        &self,
        options: &mut StartDbOptions,
    ) -> Result<CoordinationDatabase, OpsError> {
        options.validate_analyze()?;

        // For an Eon database the config file knows which nodes are
        // primary; read the catalog from primaries only. A sandbox is
        // not described accurately there, so skip the file for one.
        let mut vdb = CoordinationDatabase::new();
        if !options.hosts_in_sandbox && options.db.communal_storage_location.is_some() {
            match self.vdb_from_config_file(&options.db) {
                Ok(mut from_config) => {
                    from_config.filter_primary_nodes();
                    vdb = from_config;
                }
                Err(e) => {
                    warn!(self.log, "could not read the cluster config file; \
                        falling back to the node management agents"; "error" => %e);
                }
            }
        }

        self.run_start_db_precheck(options, &mut vdb).await?;

        let instructions = self.produce_start_db_instructions(options, &vdb)?;
        let mut engine = ClusterOpEngine::new(instructions, options.db.certs());
        engine.run(&self.log).await?;

        // Report the topology the running database now sees.
        self.vdb_from_running_db(&options.db).await
    }

    fn vdb_from_config_file(
        &self,
        options: &DatabaseOptions,
    ) -> Result<CoordinationDatabase, OpsError> {
        let path = config_file_path(options.db_name()?, options.config_directory.as_deref())?;
        let config = ClusterConfig::read(&path)?;
        CoordinationDatabase::set_from_cluster_config(options.db_name()?, &config)
    }

    /// The pre-check plan: agent health, no running engine, topology
    /// and catalog info when needed. Its findings adjust `vdb` and the
    /// host list before the main plan is produced.
    async fn run_start_db_precheck(
        &self,
        options: &mut StartDbOptions,
        vdb: &mut CoordinationDatabase,
    ) -> Result<(), OpsError> {
        let mut instructions: Vec<Box<dyn ClusterOp>> = vec![
            Box::new(NmaHealthOp::new(&self.log, options.db.hosts.clone())),
            Box::new(HttpsCheckRunningDbOp::new(
                &self.log,
                options.db.hosts.clone(),
                options.db.use_password,
                options.db.username_str(),
                options.db.password.as_ref(),
                CheckDbRunningReason::StartDb,
            )?),
        ];
        if vdb.is_empty() {
            let catalog_prefix = options.db.catalog_prefix.clone().unwrap_or_default();
            instructions.push(Box::new(NmaGetNodesInfoOp::new(
                &self.log,
                options.db.hosts.clone(),
                options.db.db_name()?,
                &catalog_prefix,
                true,
            )));
        }
        if options.trim_host_list {
            instructions.push(Box::new(NmaReadCatalogEditorOp::new(&self.log, vdb.clone())));
        }

        let mut engine = ClusterOpEngine::new(instructions, options.db.certs());
        engine.run(&self.log).await?;
        let ctx = engine.exec_context().expect("engine stored its context");

        if vdb.is_empty() {
            if let Some(nodes_info) = &ctx.nodes_info {
                *vdb = nodes_info.clone();
            }
        }
        if options.trim_host_list {
            if let Some(nma_database) = &ctx.nma_database {
                let in_catalog = nma_database.host_node_map();
                let (kept, trimmed): (Vec<String>, Vec<String>) = options
                    .db
                    .hosts
                    .iter()
                    .cloned()
                    .partition(|host| in_catalog.contains_key(host));
                if !trimmed.is_empty() {
                    info!(self.log, "trimming hosts not found in the catalog";
                        "trimmed" => ?trimmed);
                    options.db.hosts = kept;
                }
            }
        }
        Ok(())
    }

    fn produce_start_db_instructions(
        &self,
        options: &StartDbOptions,
        vdb: &CoordinationDatabase,
    ) -> Result<Vec<Box<dyn ClusterOp>>, OpsError> {
        let mut instructions: Vec<Box<dyn ClusterOp>> = vec![
            Box::new(NmaReadCatalogEditorOp::new(&self.log, vdb.clone())),
            Box::new(NmaVerticaVersionOp::new(&self.log, options.db.hosts.clone(), true)),
        ];

        if let Some(key_type) = &options.spread_encryption_key_type {
            instructions.push(Box::new(NmaSpreadSecurityOp::new(&self.log, key_type)));
        }

        // Source and target sets resolve at prepare time from the
        // catalog-editor results.
        produce_transfer_config_ops(
            &mut instructions,
            &self.log,
            None,
            options.db.hosts.clone(),
            None,
        );

        instructions.push(Box::new(NmaStartNodeOp::with_vdb(
            &self.log,
            options.db.hosts.clone(),
            &options.startup_conf,
            vdb.clone(),
        )));
        instructions.push(Box::new(HttpsPollNodeStateOp::new(
            &self.log,
            options.db.hosts.clone(),
            options.db.use_password,
            options.db.username_str(),
            options.db.password.as_ref(),
            Some(options.state_polling_timeout.unwrap_or(DEFAULT_STATE_POLLING_TIMEOUT)),
            NodeStateTarget::Up,
        )?));

        if options.db.communal_storage_location.is_some() {
            instructions.push(Box::new(HttpsSyncCatalogOp::new(
                &self.log,
                options.db.hosts.clone(),
                options.db.use_password,
                options.db.username_str(),
                options.db.password.as_ref(),
                "start_db",
            )?));
        }
        Ok(instructions)
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! re_ip: update node addresses in the catalog and the config file
//! without restarting anything.

use crate::cluster_config::{backup_config_file, config_file_path, ClusterConfig};
use crate::commands::{ClusterCommands, DatabaseOptions};
use crate::engine::ClusterOpEngine;
use crate::error::OpsError;
use crate::op::ClusterOp;
use crate::ops::https::{HttpsGetUpNodesOp, HttpsReIpOp, HttpsReloadSpreadOp};
use crate::ops::nma::NmaHealthOp;
use slog::info;
use vcluster_common::net;

pub struct ReIpOptions {
    pub db: DatabaseOptions,
    /// `node name -> new address` pairs.
    pub re_ip_list: Vec<(String, String)>,
}

impl Default for ReIpOptions {
    fn default() -> Self {
        ReIpOptions { db: DatabaseOptions::default(), re_ip_list: Vec::new() }
    }
}

impl ReIpOptions {
    /// Parse the `NODENAME=HOST,...` re-ip input.
    pub fn parse_re_ip_list(&mut self, list: &str) -> Result<(), OpsError> {
        self.re_ip_list = net::parse_node_address_pairs(list, "re-ip", self.db.ipv6)
            .map_err(|e| OpsError::validation(e.to_string()))?;
        Ok(())
    }

    fn validate_analyze(&mut self) -> Result<(), OpsError> {
        self.db.validate_base("re_ip")?;
        if self.re_ip_list.is_empty() {
            return Err(OpsError::validation("re_ip requires a list of NODENAME=HOST pairs"));
        }
        self.db.analyze()?;
        self.db.set_use_password()
    }
}

impl ClusterCommands {
    pub async fn re_ip(&self, options: &mut ReIpOptions) -> Result<(), OpsError> {
        options.validate_analyze()?;

        let vdb = self.vdb_from_running_db(&options.db).await?;
        let name_to_host = vdb.node_name_to_host_map();

        // Only addresses that actually differ from the catalog move.
        let mut node_names = Vec::new();
        let mut new_addresses = Vec::new();
        for (node_name, new_address) in &options.re_ip_list {
            let old_address = name_to_host.get(node_name).ok_or_else(|| {
                OpsError::validation(format!(
                    "node name {node_name} does not exist in database {}",
                    vdb.name
                ))
            })?;
            if old_address != new_address {
                node_names.push(node_name.clone());
                new_addresses.push(new_address.clone());
            }
        }
        if node_names.is_empty() {
            info!(self.log, "all requested addresses already match the catalog");
            return Ok(());
        }

        let instructions: Vec<Box<dyn ClusterOp>> = vec![
            Box::new(NmaHealthOp::new(&self.log, options.db.hosts.clone())),
            Box::new(HttpsGetUpNodesOp::new(
                &self.log,
                &vdb.name,
                options.db.hosts.clone(),
                options.db.use_password,
                options.db.username_str(),
                options.db.password.as_ref(),
                None,
            )?),
            Box::new(HttpsReIpOp::new(
                &self.log,
                node_names.clone(),
                new_addresses.clone(),
                options.db.use_password,
                options.db.username_str(),
                options.db.password.as_ref(),
            )?),
            Box::new(HttpsReloadSpreadOp::new(
                &self.log,
                vec![],
                options.db.use_password,
                options.db.username_str(),
                options.db.password.as_ref(),
            )?),
        ];
        let mut engine = ClusterOpEngine::new(instructions, options.db.certs());
        engine.run(&self.log).await?;

        self.persist_new_addresses(options, &node_names, &new_addresses)
    }

    /// Rewrite the moved addresses in the cluster config file, backing
    /// the previous version up first.
    fn persist_new_addresses(
        &self,
        options: &ReIpOptions,
        node_names: &[String],
        new_addresses: &[String],
    ) -> Result<(), OpsError> {
        let db_name = options.db.db_name()?;
        let path = config_file_path(db_name, options.db.config_directory.as_deref())?;
        if !path.exists() {
            return Ok(());
        }
        let mut config = ClusterConfig::read(&path)?;
        let Some(db_config) = config.0.get_mut(db_name) else {
            return Ok(());
        };
        for node_config in &mut db_config.nodes {
            if let Some(index) = node_names.iter().position(|name| name == &node_config.name) {
                node_config.address = new_addresses[index].clone();
            }
        }
        backup_config_file(&path)?;
        config.write(&path)
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! restart_node: restart individual nodes of a cluster that still has
//! quorum, re-IPing them first when their addresses changed in the
//! meantime.

use crate::commands::{ClusterCommands, DatabaseOptions};
use crate::engine::ClusterOpEngine;
use crate::error::OpsError;
use crate::op::ClusterOp;
use crate::ops::https::{
    HttpsGetNodesInfoOp, HttpsGetUpNodesOp, HttpsPollNodeStateOp, HttpsReIpOp,
    HttpsReloadSpreadOp, HttpsStartUpCommandOp, HttpsSyncCatalogOp, NodeStateTarget,
};
use crate::ops::nma::{
    ConfigType, NmaDownloadConfigOp, NmaHealthOp, NmaNetworkProfileOp, NmaStartNodeOp,
    NmaUploadConfigOp, NmaVerticaVersionOp,
};
use crate::ops::DEFAULT_STATE_POLLING_TIMEOUT;
use crate::vdb::CoordinationDatabase;
use slog::info;
use std::time::Duration;
use vcluster_common::net;

pub struct RestartNodeOptions {
    pub db: DatabaseOptions,
    /// `node name -> address` pairs to restart; an address differing
    /// from the catalog triggers a re-IP.
    pub nodes: Vec<(String, String)>,
    pub startup_conf: String,
    pub state_polling_timeout: Option<Duration>,
}

impl Default for RestartNodeOptions {
    fn default() -> Self {
        RestartNodeOptions {
            db: DatabaseOptions::default(),
            nodes: Vec::new(),
            startup_conf: String::new(),
            state_polling_timeout: None,
        }
    }
}

impl RestartNodeOptions {
    /// Parse a `NODENAME=HOST,...` list into the nodes field.
    pub fn parse_nodes_list(&mut self, list: &str) -> Result<(), OpsError> {
        self.nodes = net::parse_node_address_pairs(list, "restart", self.db.ipv6)
            .map_err(|e| OpsError::validation(e.to_string()))?;
        Ok(())
    }

    fn validate_analyze(&mut self) -> Result<(), OpsError> {
        self.db.validate_base("restart_node")?;
        if self.nodes.is_empty() {
            return Err(OpsError::validation(
                "restart_node requires a list of NODENAME=HOST pairs",
            ));
        }
        self.db.analyze()?;
        self.db.set_use_password()
    }
}

/// What has to happen to bring the requested nodes back: the ones whose
/// catalog address changed get re-IPed and restarted; if none changed,
/// the requested hosts are restarted as-is.
#[derive(Debug)]
struct RestartNodeInfo {
    re_ip_node_names: Vec<String>,
    re_ip_addresses: Vec<String>,
    hosts_to_restart: Vec<String>,
}

impl ClusterCommands {
    pub async fn restart_node(&self, options: &mut RestartNodeOptions) -> Result<(), OpsError> {
        options.validate_analyze()?;

        let vdb = self.vdb_from_running_db(&options.db).await?;
        let restart_info = plan_restart(&vdb, &options.nodes)?;
        if !restart_info.re_ip_node_names.is_empty() {
            info!(self.log, "nodes whose catalog address changed will be re-IPed";
                "nodes" => ?restart_info.re_ip_node_names);
        }

        let instructions =
            self.produce_restart_node_instructions(&vdb, options, &restart_info)?;
        let mut engine = ClusterOpEngine::new(instructions, options.db.certs());
        engine.run(&self.log).await
    }

    fn produce_restart_node_instructions(
        &self,
        vdb: &CoordinationDatabase,
        options: &RestartNodeOptions,
        restart_info: &RestartNodeInfo,
    ) -> Result<Vec<Box<dyn ClusterOp>>, OpsError> {
        let hosts = options.db.hosts.clone();
        let restart_hosts = restart_info.hosts_to_restart.clone();

        let mut instructions: Vec<Box<dyn ClusterOp>> = vec![
            Box::new(NmaHealthOp::new(&self.log, hosts.clone())),
            Box::new(NmaVerticaVersionOp::new(&self.log, hosts.clone(), true)),
            Box::new(HttpsGetUpNodesOp::new(
                &self.log,
                &vdb.name,
                hosts.clone(),
                options.db.use_password,
                options.db.username_str(),
                options.db.password.as_ref(),
                None,
            )?),
        ];

        if !restart_info.re_ip_node_names.is_empty() {
            instructions.push(Box::new(NmaNetworkProfileOp::new(
                &self.log,
                restart_hosts.clone(),
            )));
            instructions.push(Box::new(HttpsReIpOp::new(
                &self.log,
                restart_info.re_ip_node_names.clone(),
                restart_info.re_ip_addresses.clone(),
                options.db.use_password,
                options.db.username_str(),
                options.db.password.as_ref(),
            )?));
            instructions.push(Box::new(HttpsReloadSpreadOp::new(
                &self.log,
                vec![],
                options.db.use_password,
                options.db.username_str(),
                options.db.password.as_ref(),
            )?));
            // Refresh node info so the following operations see the new
            // addresses.
            instructions.push(Box::new(HttpsGetNodesInfoOp::new(
                &self.log,
                &vdb.name,
                hosts.clone(),
                options.db.use_password,
                options.db.username_str(),
                options.db.password.as_ref(),
            )?));
        }

        for config_type in [ConfigType::Vertica, ConfigType::Spread] {
            instructions.push(Box::new(NmaDownloadConfigOp::new(
                &self.log,
                config_type,
                // Resolved at prepare time to an up host.
                None,
                Some(vdb.clone()),
            )));
            instructions.push(Box::new(NmaUploadConfigOp::new(
                &self.log,
                config_type,
                None,
                restart_hosts.clone(),
                Some(vdb.copy(&restart_hosts)),
                false,
            )));
        }

        instructions.push(Box::new(HttpsStartUpCommandOp::new(
            &self.log,
            vec![],
            options.db.use_password,
            options.db.username_str(),
            options.db.password.as_ref(),
        )?));
        instructions.push(Box::new(NmaStartNodeOp::with_vdb(
            &self.log,
            restart_hosts.clone(),
            &options.startup_conf,
            vdb.clone(),
        )));
        instructions.push(Box::new(HttpsPollNodeStateOp::new(
            &self.log,
            restart_hosts,
            options.db.use_password,
            options.db.username_str(),
            options.db.password.as_ref(),
            Some(options.state_polling_timeout.unwrap_or(DEFAULT_STATE_POLLING_TIMEOUT)),
            NodeStateTarget::Up,
        )?));

        if vdb.is_eon {
            instructions.push(Box::new(HttpsSyncCatalogOp::new(
                &self.log,
                hosts,
                options.db.use_password,
                options.db.username_str(),
                options.db.password.as_ref(),
                "restart_node",
            )?));
        }
        Ok(instructions)
    }
}

fn plan_restart(
    vdb: &CoordinationDatabase,
    nodes: &[(String, String)],
) -> Result<RestartNodeInfo, OpsError> {
    let name_to_host = vdb.node_name_to_host_map();
    let mut re_ip_node_names = Vec::new();
    let mut re_ip_addresses = Vec::new();
    let mut unchanged_hosts = Vec::new();
    for (node_name, new_address) in nodes {
        let old_address = name_to_host.get(node_name).ok_or_else(|| {
            OpsError::validation(format!("node name {node_name} does not exist in the database"))
        })?;
        if old_address != new_address {
            re_ip_node_names.push(node_name.clone());
            re_ip_addresses.push(new_address.clone());
        } else {
            unchanged_hosts.push(new_address.clone());
        }
    }

    // When any address changed, only those nodes restart; otherwise the
    // requested nodes restart with their catalog addresses.
    let hosts_to_restart = if re_ip_node_names.is_empty() {
        unchanged_hosts
    } else {
        re_ip_addresses.clone()
    };
    Ok(RestartNodeInfo { re_ip_node_names, re_ip_addresses, hosts_to_restart })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vdb_with_addresses() -> CoordinationDatabase {
        let mut vdb = CoordinationDatabase {
            name: "db".to_string(),
            catalog_prefix: "/data".into(),
            data_prefix: "/data".into(),
            ..Default::default()
        };
        vdb.add_hosts(
            &["10.0.0.1".to_string(), "10.0.0.2".to_string(), "10.0.0.13".to_string()],
            "sc",
        )
        .unwrap();
        vdb
    }

    #[test]
    fn only_changed_addresses_are_re_iped() {
        let vdb = vdb_with_addresses();
        // v_db_node0002 moves to .22, v_db_node0003 stays on .13.
        let nodes = vec![
            ("v_db_node0002".to_string(), "10.0.0.22".to_string()),
            ("v_db_node0003".to_string(), "10.0.0.13".to_string()),
        ];
        let info = plan_restart(&vdb, &nodes).unwrap();
        assert_eq!(info.re_ip_node_names, vec!["v_db_node0002".to_string()]);
        assert_eq!(info.re_ip_addresses, vec!["10.0.0.22".to_string()]);
        assert_eq!(info.hosts_to_restart, vec!["10.0.0.22".to_string()]);
    }

    #[test]
    fn unchanged_addresses_restart_in_place() {
        let vdb = vdb_with_addresses();
        let nodes = vec![("v_db_node0001".to_string(), "10.0.0.1".to_string())];
        let info = plan_restart(&vdb, &nodes).unwrap();
        assert!(info.re_ip_node_names.is_empty());
        assert_eq!(info.hosts_to_restart, vec!["10.0.0.1".to_string()]);
    }

    #[test]
    fn unknown_node_name_is_a_validation_error() {
        let vdb = vdb_with_addresses();
        let nodes = vec![("v_db_node0099".to_string(), "10.0.0.9".to_string())];
        assert!(matches!(
            plan_restart(&vdb, &nodes).unwrap_err(),
            OpsError::Validation { .. }
        ));
    }
}

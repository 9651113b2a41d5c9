// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! remove_node: shrink the database. Directory deletion runs last so a
//! failure earlier in the plan never leaves the catalog pointing at
//! deleted files.

use crate::commands::{ClusterCommands, DatabaseOptions};
use crate::engine::ClusterOpEngine;
use crate::error::OpsError;
use crate::op::ClusterOp;
use crate::ops::https::{
    HttpsDrainSubclusterOp, HttpsDropNodeOp, HttpsGetUpNodesOp, HttpsMarkDesignKSafeOp,
    HttpsRebalanceSubclusterShardsOp, HttpsReloadSpreadOp,
};
use crate::ops::nma::NmaDeleteDirectoriesOp;
use crate::ops::{initiator_host, KSAFETY_THRESHOLD, KSAFE_VALUE_ZERO};
use crate::vdb::{CoordinationDatabase, NodeState};
use vcluster_common::{collections, net};

pub struct RemoveNodeOptions {
    pub db: DatabaseOptions,
    /// Hosts to remove, as the caller wrote them.
    pub remove_raw_hosts: Vec<String>,
    pub force_delete: bool,
    /// Eon: seconds to drain connections from the leaving nodes.
    pub drain_seconds: Option<u64>,

    remove_hosts: Vec<String>,
}

impl Default for RemoveNodeOptions {
    fn default() -> Self {
        RemoveNodeOptions {
            db: DatabaseOptions::default(),
            remove_raw_hosts: Vec::new(),
            force_delete: false,
            drain_seconds: None,
            remove_hosts: Vec::new(),
        }
    }
}

impl RemoveNodeOptions {
    fn validate_analyze(&mut self) -> Result<(), OpsError> {
        self.db.validate_base("remove_node")?;
        if self.remove_raw_hosts.is_empty() {
            return Err(OpsError::validation("remove_node requires at least one host to remove"));
        }
        self.remove_hosts = net::resolve_raw_hosts(&self.remove_raw_hosts, self.db.ipv6)
            .map_err(|e| OpsError::validation(e.to_string()))?;
        self.db.analyze()?;
        self.db.set_use_password()
    }
}

impl ClusterCommands {
    pub async fn remove_node(
        &self,
        options: &mut RemoveNodeOptions,
    ) -> Result<CoordinationDatabase, OpsError> {
        options.validate_analyze()?;

        let mut vdb = self.vdb_from_running_db(&options.db).await?;
        if let Some(data_prefix) = &options.db.data_prefix {
            vdb.data_prefix = data_prefix.clone();
        }
        if let Some(catalog_prefix) = &options.db.catalog_prefix {
            vdb.catalog_prefix = catalog_prefix.clone();
        }
        vdb.depot_prefix = options.db.depot_prefix.clone();

        let (in_db, not_in_db) = vdb.contain_nodes(&options.remove_hosts);
        if !not_in_db.is_empty() {
            return Err(OpsError::precondition(format!(
                "{} are not part of database {}",
                not_in_db.join(", "),
                vdb.name
            )));
        }
        let remaining = collections::slice_diff(&vdb.hosts().to_vec(), &in_db);
        if remaining.is_empty() {
            return Err(OpsError::validation(
                "cannot remove every node; drop the database instead",
            ));
        }

        let initiator = initiator_host(&vdb.primary_up_nodes, &in_db)?;
        let instructions =
            self.produce_remove_node_instructions(&vdb, options, &initiator, &in_db)?;
        let mut engine = ClusterOpEngine::new(instructions, options.db.certs());
        engine.run(&self.log).await?;

        vdb.retain_hosts(&remaining);
        vdb.write_cluster_config(options.db.config_directory.as_deref())?;
        Ok(vdb)
    }

    fn produce_remove_node_instructions(
        &self,
        vdb: &CoordinationDatabase,
        options: &RemoveNodeOptions,
        initiator: &str,
        remove_hosts: &[String],
    ) -> Result<Vec<Box<dyn ClusterOp>>, OpsError> {
        let mut instructions: Vec<Box<dyn ClusterOp>> = vec![Box::new(HttpsGetUpNodesOp::new(
            &self.log,
            &vdb.name,
            vdb.hosts().to_vec(),
            options.db.use_password,
            options.db.username_str(),
            options.db.password.as_ref(),
            None,
        )?)];

        // Removing nodes can leave too few primaries for k=1.
        let remaining_primaries = vdb
            .nodes()
            .filter(|node| node.is_primary && !remove_hosts.contains(&node.address))
            .count();
        if remaining_primaries > 0 && remaining_primaries < KSAFETY_THRESHOLD {
            instructions.push(Box::new(HttpsMarkDesignKSafeOp::new(
                &self.log,
                vec![initiator.to_string()],
                options.db.use_password,
                options.db.username_str(),
                options.db.password.as_ref(),
                KSAFE_VALUE_ZERO,
            )?));
        }

        if vdb.is_eon {
            for sc_name in subclusters_of(vdb, remove_hosts) {
                instructions.push(Box::new(HttpsRebalanceSubclusterShardsOp::new(
                    &self.log,
                    vec![initiator.to_string()],
                    options.db.use_password,
                    options.db.username_str(),
                    options.db.password.as_ref(),
                    &sc_name,
                )?));
            }
            if let Some(drain_seconds) = options.drain_seconds {
                for sc_name in subclusters_of(vdb, remove_hosts) {
                    instructions.push(Box::new(HttpsDrainSubclusterOp::new(
                        &self.log,
                        options.db.use_password,
                        options.db.username_str(),
                        options.db.password.as_ref(),
                        &sc_name,
                        drain_seconds,
                    )?));
                }
            }
        }

        for host in remove_hosts {
            let node = vdb.node(host).expect("contain_nodes verified membership");
            if node.state == NodeState::Up && !vdb.is_eon {
                return Err(OpsError::precondition(format!(
                    "node {} is UP; stop it before removing it",
                    node.name
                )));
            }
            instructions.push(Box::new(HttpsDropNodeOp::new(
                &self.log,
                &node.name,
                initiator,
                options.db.use_password,
                options.db.username_str(),
                options.db.password.as_ref(),
                vdb.is_eon,
            )?));
        }

        instructions.push(Box::new(HttpsReloadSpreadOp::new(
            &self.log,
            vec![initiator.to_string()],
            options.db.use_password,
            options.db.username_str(),
            options.db.password.as_ref(),
        )?));
        instructions.push(Box::new(NmaDeleteDirectoriesOp::new(
            &self.log,
            vdb.copy(remove_hosts),
            options.force_delete,
        )));
        Ok(instructions)
    }
}

/// The subclusters the leaving hosts belong to, deduplicated.
fn subclusters_of(vdb: &CoordinationDatabase, hosts: &[String]) -> Vec<String> {
    let mut names = Vec::new();
    for host in hosts {
        if let Some(node) = vdb.node(host) {
            if !node.subcluster.is_empty() && !names.contains(&node.subcluster) {
                names.push(node.subcluster.clone());
            }
        }
    }
    names
}

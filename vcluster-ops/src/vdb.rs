// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The in-memory coordination model: a database-level catalog view
//! threaded through commands and persisted to the cluster-config file.
//!
//! [`CoordinationDatabase`] owns its nodes by host address; nodes copy
//! the path prefixes they need at construction so there are no back
//! references.

use crate::error::OpsError;
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use vcluster_common::{collections, env};

/// Default database client port.
pub const DEFAULT_CLIENT_PORT: u16 = 5433;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum NodeState {
    Up,
    Down,
    #[default]
    Unknown,
}

impl NodeState {
    /// Node states on the wire are upper-case strings; anything
    /// unrecognized maps to `Unknown`.
    pub fn from_wire(state: &str) -> Self {
        match state {
            "UP" => NodeState::Up,
            "DOWN" => NodeState::Down,
            _ => NodeState::Unknown,
        }
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeState::Up => "UP",
            NodeState::Down => "DOWN",
            NodeState::Unknown => "UNKNOWN",
        };
        write!(f, "{s}")
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AddressFamily {
    #[serde(rename = "ipv4")]
    #[default]
    Ipv4,
    #[serde(rename = "ipv6")]
    Ipv6,
}

impl AddressFamily {
    pub fn from_ipv6_flag(ipv6: bool) -> Self {
        if ipv6 { AddressFamily::Ipv6 } else { AddressFamily::Ipv4 }
    }
}

/// AWS credentials for communal storage. Debug output is redacted; the
/// values only ever appear in request bodies, where they are masked
/// before logging.
#[derive(Clone)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key_id", &"<redacted>")
            .field("secret_access_key", &"<redacted>")
            .finish()
    }
}

/// One node of the database as the coordination model sees it.
#[derive(Clone, Debug, PartialEq)]
pub struct CoordinationNode {
    /// Generated name, `v_<db>_node<nnnn>`.
    pub name: String,
    /// Resolved host address; the key under which the vdb holds this
    /// node.
    pub address: String,
    /// Absolute catalog path, `<catalogPrefix>/<db>/<name>_catalog`.
    pub catalog_path: Utf8PathBuf,
    /// Storage locations, data path first.
    pub storage_locations: Vec<Utf8PathBuf>,
    pub depot_path: Option<Utf8PathBuf>,
    pub port: u16,
    pub control_address_family: AddressFamily,
    pub is_primary: bool,
    pub state: NodeState,
    /// Empty on non-Eon databases.
    pub subcluster: String,
}

/// The in-memory view of a database.
#[derive(Clone, Debug, Default)]
pub struct CoordinationDatabase {
    pub name: String,
    pub catalog_prefix: Utf8PathBuf,
    pub data_prefix: Utf8PathBuf,
    /// Present exactly when the database uses a depot.
    pub depot_prefix: Option<Utf8PathBuf>,
    pub depot_size: Option<String>,
    pub is_eon: bool,
    pub communal_storage_location: Option<String>,
    pub num_shards: usize,
    pub ipv6: bool,
    pub aws_credentials: Option<AwsCredentials>,
    /// Host address -> node. Kept consistent with `host_list` by the
    /// mutators below.
    pub(crate) host_node_map: BTreeMap<String, CoordinationNode>,
    /// Host addresses in insertion order.
    pub(crate) host_list: Vec<String>,
    pub primary_up_nodes: Vec<String>,
}

impl CoordinationDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hosts(&self) -> &[String] {
        &self.host_list
    }

    pub fn node(&self, host: &str) -> Option<&CoordinationNode> {
        self.host_node_map.get(host)
    }

    pub fn node_mut(&mut self, host: &str) -> Option<&mut CoordinationNode> {
        self.host_node_map.get_mut(host)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &CoordinationNode> {
        self.host_node_map.values()
    }

    pub fn is_empty(&self) -> bool {
        self.host_list.is_empty()
    }

    pub fn len(&self) -> usize {
        self.host_list.len()
    }

    pub fn use_depot(&self) -> bool {
        self.depot_prefix.is_some()
    }

    /// Add a node, enforcing address and node-name uniqueness.
    pub fn add_node(&mut self, node: CoordinationNode) -> Result<(), OpsError> {
        if self.host_node_map.contains_key(&node.address) {
            return Err(OpsError::validation(format!(
                "host {} is already part of database {}",
                node.address, self.name
            )));
        }
        if self.host_node_map.values().any(|existing| existing.name == node.name) {
            return Err(OpsError::validation(format!(
                "node name {} is already in use in database {}",
                node.name, self.name
            )));
        }
        self.host_list.push(node.address.clone());
        self.host_node_map.insert(node.address.clone(), node);
        Ok(())
    }

    /// Add new hosts, generating node names and paths from the
    /// database's prefixes. Used by create_db and add_node.
    pub fn add_hosts(&mut self, hosts: &[String], subcluster: &str) -> Result<(), OpsError> {
        let total = self.host_list.len() + hosts.len();
        for host in hosts {
            let name = self.next_node_name(total)?;
            let node = self.build_node(&name, host, subcluster);
            self.add_node(node)?;
        }
        Ok(())
    }

    fn build_node(&self, name: &str, host: &str, subcluster: &str) -> CoordinationNode {
        CoordinationNode {
            name: name.to_string(),
            address: host.to_string(),
            catalog_path: self.gen_catalog_path(name),
            storage_locations: vec![self.gen_data_path(name)],
            depot_path: self.depot_prefix.as_ref().map(|_| self.gen_depot_path(name)),
            port: DEFAULT_CLIENT_PORT,
            control_address_family: AddressFamily::from_ipv6_flag(self.ipv6),
            is_primary: false,
            state: NodeState::Unknown,
            subcluster: subcluster.to_string(),
        }
    }

    /// First unused `v_<db>_node<nnnn>` name, probing indices up to the
    /// eventual host count.
    fn next_node_name(&self, total: usize) -> Result<String, OpsError> {
        let taken: std::collections::HashSet<&str> =
            self.host_node_map.values().map(|node| node.name.as_str()).collect();
        let db = self.name.to_lowercase();
        for index in 1..=total {
            let candidate = format!("v_{db}_node{index:04}");
            if !taken.contains(candidate.as_str()) {
                return Ok(candidate);
            }
        }
        Err(OpsError::validation(format!(
            "could not generate a node name for database {} with {total} hosts",
            self.name
        )))
    }

    pub fn gen_catalog_path(&self, node_name: &str) -> Utf8PathBuf {
        self.catalog_prefix.join(&self.name).join(format!("{node_name}_catalog"))
    }

    pub fn gen_data_path(&self, node_name: &str) -> Utf8PathBuf {
        self.data_prefix.join(&self.name).join(format!("{node_name}_data"))
    }

    pub fn gen_depot_path(&self, node_name: &str) -> Utf8PathBuf {
        let prefix = self.depot_prefix.as_deref().unwrap_or(Utf8Path::new(""));
        prefix.join(&self.name).join(format!("{node_name}_depot"))
    }

    /// Copy the database, optionally restricted to `target_hosts`.
    pub fn copy(&self, target_hosts: &[String]) -> CoordinationDatabase {
        let mut copy = self.clone();
        if !target_hosts.is_empty() {
            copy.host_node_map = collections::filter_map_by_key(&self.host_node_map, target_hosts);
            copy.host_list = target_hosts.to_vec();
        }
        copy
    }

    /// Restrict the database to a subset of hosts in place.
    pub fn retain_hosts(&mut self, keep: &[String]) {
        self.host_node_map = collections::filter_map_by_key(&self.host_node_map, keep);
        self.host_list.retain(|host| self.host_node_map.contains_key(host));
    }

    /// Drop secondary nodes, keeping the primary subset.
    pub fn filter_primary_nodes(&mut self) {
        let primaries: Vec<String> = self
            .host_list
            .iter()
            .filter(|host| self.host_node_map[*host].is_primary)
            .cloned()
            .collect();
        self.retain_hosts(&primaries);
    }

    /// Node name -> host address.
    pub fn node_name_to_host_map(&self) -> BTreeMap<String, String> {
        self.host_node_map
            .iter()
            .map(|(host, node)| (node.name.clone(), host.clone()))
            .collect()
    }

    /// Subcluster names represented in this database, deduplicated.
    pub fn subcluster_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        for node in self.host_node_map.values() {
            if !names.contains(&node.subcluster) {
                names.push(node.subcluster.clone());
            }
        }
        names
    }

    /// Split `hosts` into those present in the database and those not.
    pub fn contain_nodes(&self, hosts: &[String]) -> (Vec<String>, Vec<String>) {
        let in_db: Vec<String> =
            hosts.iter().filter(|host| self.host_node_map.contains_key(*host)).cloned().collect();
        let not_in_db = collections::slice_diff(hosts, &in_db);
        (in_db, not_in_db)
    }

    pub fn has_at_least_one_down_node(&self) -> bool {
        self.host_node_map.values().any(|node| node.state == NodeState::Down)
    }

    /// Read AWS credentials from the environment onto the vdb. Only
    /// commands that opt in call this.
    pub fn set_aws_credentials_from_env(&mut self) -> Result<(), OpsError> {
        let (access_key_id, secret_access_key) = env::aws_credentials()
            .map_err(|e| OpsError::validation(e.to_string()))?;
        self.aws_credentials = Some(AwsCredentials { access_key_id, secret_access_key });
        Ok(())
    }
}

/// The catalog snapshot returned by the NMA catalog-editor read,
/// published to the execution context for downstream operations.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct NmaDatabase {
    #[serde(default)]
    pub name: String,
    /// The responding host's catalog version counter.
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub nodes: Vec<NmaNode>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct NmaNode {
    pub name: String,
    pub address: String,
    pub catalog_path: String,
    #[serde(default)]
    pub is_primary: bool,
}

impl NmaDatabase {
    /// Host address -> node, for catalog-path lookups.
    pub fn host_node_map(&self) -> BTreeMap<String, &NmaNode> {
        self.nodes.iter().map(|node| (node.address.clone(), node)).collect()
    }
}

/// The catalog-path-keyed NMA endpoints want the node catalog directory,
/// not the `Catalog` subdirectory the editor reports.
pub fn catalog_root(catalog_path: &str) -> &str {
    catalog_path.strip_suffix("/Catalog").unwrap_or(catalog_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eon_db() -> CoordinationDatabase {
        CoordinationDatabase {
            name: "Verticadb".to_string(),
            catalog_prefix: "/data".into(),
            data_prefix: "/data".into(),
            depot_prefix: Some("/depot".into()),
            is_eon: true,
            communal_storage_location: Some("s3://bucket/db".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn add_hosts_generates_names_and_paths() {
        let mut vdb = eon_db();
        let hosts = vec!["192.0.2.1".to_string(), "192.0.2.2".to_string()];
        vdb.add_hosts(&hosts, "default_subcluster").unwrap();

        assert_eq!(vdb.hosts(), &hosts[..]);
        let n1 = vdb.node("192.0.2.1").unwrap();
        assert_eq!(n1.name, "v_verticadb_node0001");
        assert_eq!(n1.catalog_path, "/data/Verticadb/v_verticadb_node0001_catalog");
        assert_eq!(n1.storage_locations[0], "/data/Verticadb/v_verticadb_node0001_data");
        assert_eq!(
            n1.depot_path.as_deref().unwrap(),
            "/depot/Verticadb/v_verticadb_node0001_depot"
        );
        let n2 = vdb.node("192.0.2.2").unwrap();
        assert_eq!(n2.name, "v_verticadb_node0002");
    }

    #[test]
    fn duplicate_host_is_rejected() {
        let mut vdb = eon_db();
        vdb.add_hosts(&["192.0.2.1".to_string()], "sc").unwrap();
        let err = vdb.add_hosts(&["192.0.2.1".to_string()], "sc").unwrap_err();
        assert!(matches!(err, OpsError::Validation { .. }));
    }

    #[test]
    fn node_names_skip_taken_indices() {
        let mut vdb = eon_db();
        vdb.add_hosts(&["192.0.2.1".to_string(), "192.0.2.2".to_string()], "sc").unwrap();
        // Simulate a removed first node, then re-add a host: index 1 is
        // free again and gets reused.
        vdb.retain_hosts(&["192.0.2.2".to_string()]);
        vdb.add_hosts(&["192.0.2.3".to_string()], "sc").unwrap();
        assert_eq!(vdb.node("192.0.2.3").unwrap().name, "v_verticadb_node0001");
    }

    #[test]
    fn filter_primary_nodes_keeps_order() {
        let mut vdb = eon_db();
        vdb.add_hosts(
            &["192.0.2.3".to_string(), "192.0.2.1".to_string(), "192.0.2.2".to_string()],
            "sc",
        )
        .unwrap();
        vdb.node_mut("192.0.2.3").unwrap().is_primary = true;
        vdb.node_mut("192.0.2.2").unwrap().is_primary = true;
        vdb.filter_primary_nodes();
        assert_eq!(vdb.hosts(), &["192.0.2.3".to_string(), "192.0.2.2".to_string()][..]);
    }

    #[test]
    fn catalog_root_strips_editor_suffix() {
        assert_eq!(
            catalog_root("/data/db/v_db_node0001_catalog/Catalog"),
            "/data/db/v_db_node0001_catalog"
        );
        assert_eq!(catalog_root("/data/db/v_db_node0001_catalog"), "/data/db/v_db_node0001_catalog");
    }
}

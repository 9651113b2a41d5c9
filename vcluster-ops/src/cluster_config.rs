// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The YAML cluster-config file: persisted catalog topology per
//! database.
//!
//! The file is written atomically (temp file + rename) with restrictive
//! permissions, and the previous version is backed up before every
//! overwrite.

use crate::error::OpsError;
use crate::vdb::{AddressFamily, CoordinationDatabase, CoordinationNode, NodeState};
use crate::vdb::DEFAULT_CLIENT_PORT;
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const CONFIG_FILE_NAME: &str = "vertica_cluster.yaml";
pub const CONFIG_BACKUP_SUFFIX: &str = "backup";

#[cfg(unix)]
const CONFIG_FILE_PERM: u32 = 0o600;
#[cfg(unix)]
const CONFIG_DIR_PERM: u32 = 0o755;

/// The whole config file: database name -> database config.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClusterConfig(pub BTreeMap<String, DatabaseConfig>);

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(rename = "eon_mode")]
    pub is_eon: bool,
    #[serde(default)]
    pub communal_storage_location: String,
    #[serde(default)]
    pub ipv6: bool,
    #[serde(default)]
    pub nodes: Vec<NodeConfig>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NodeConfig {
    pub name: String,
    pub address: String,
    #[serde(default)]
    pub subcluster: String,
    /// Path prefixes, not complete node paths; complete paths are
    /// regenerated from name + prefix on load.
    #[serde(default)]
    pub catalog_path: String,
    #[serde(default)]
    pub data_path: String,
    #[serde(default)]
    pub depot_path: String,
}

impl ClusterConfig {
    pub fn read(path: &Utf8Path) -> Result<Self, OpsError> {
        let content = std::fs::read_to_string(path).map_err(|e| OpsError::Config {
            message: format!("cannot read {path}"),
            source: Some(e),
        })?;
        serde_yaml::from_str(&content).map_err(|e| OpsError::Config {
            message: format!("cannot parse {path}: {e}"),
            source: None,
        })
    }

    /// Atomically write the config: serialize to a sibling temp file,
    /// then rename over the target.
    pub fn write(&self, path: &Utf8Path) -> Result<(), OpsError> {
        let content = serde_yaml::to_string(self).map_err(|e| OpsError::Config {
            message: format!("cannot serialize cluster config: {e}"),
            source: None,
        })?;
        let tmp_path = path.with_extension("yaml.tmp");
        write_restricted(&tmp_path, &content)?;
        std::fs::rename(&tmp_path, path).map_err(|e| OpsError::Config {
            message: format!("cannot move {tmp_path} to {path}"),
            source: Some(e),
        })
    }
}

#[cfg(unix)]
fn write_restricted(path: &Utf8Path, content: &str) -> Result<(), OpsError> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(CONFIG_FILE_PERM)
        .open(path)
        .map_err(|e| OpsError::Config {
            message: format!("cannot create {path}"),
            source: Some(e),
        })?;
    file.write_all(content.as_bytes()).map_err(|e| OpsError::Config {
        message: format!("cannot write {path}"),
        source: Some(e),
    })
}

#[cfg(not(unix))]
fn write_restricted(path: &Utf8Path, content: &str) -> Result<(), OpsError> {
    std::fs::write(path, content).map_err(|e| OpsError::Config {
        message: format!("cannot write {path}"),
        source: Some(e),
    })
}

/// The config file path for a database: `<config_dir>/vertica_cluster.yaml`,
/// or `<cwd>/<db_name>/vertica_cluster.yaml` when no directory is given.
/// The directory is created if needed.
pub fn config_file_path(
    db_name: &str,
    config_dir: Option<&Utf8Path>,
) -> Result<Utf8PathBuf, OpsError> {
    let dir = match config_dir {
        Some(dir) => dir.to_path_buf(),
        None => {
            let cwd = std::env::current_dir().map_err(|e| OpsError::Config {
                message: "cannot determine current directory".to_string(),
                source: Some(e),
            })?;
            let cwd = Utf8PathBuf::try_from(cwd).map_err(|e| OpsError::Config {
                message: format!("current directory is not UTF-8: {e}"),
                source: None,
            })?;
            cwd.join(db_name)
        }
    };
    create_config_dir(&dir)?;
    Ok(dir.join(CONFIG_FILE_NAME))
}

#[cfg(unix)]
fn create_config_dir(dir: &Utf8Path) -> Result<(), OpsError> {
    use std::os::unix::fs::DirBuilderExt;
    let mut builder = std::fs::DirBuilder::new();
    builder.recursive(true).mode(CONFIG_DIR_PERM);
    builder.create(dir).map_err(|e| OpsError::Config {
        message: format!("cannot create config directory {dir}"),
        source: Some(e),
    })
}

#[cfg(not(unix))]
fn create_config_dir(dir: &Utf8Path) -> Result<(), OpsError> {
    std::fs::create_dir_all(dir).map_err(|e| OpsError::Config {
        message: format!("cannot create config directory {dir}"),
        source: Some(e),
    })
}

/// Copy an existing config file to `<file>.backup` before overwrite. A
/// missing file is fine: there is nothing to back up.
pub fn backup_config_file(path: &Utf8Path) -> Result<(), OpsError> {
    if !path.exists() {
        return Ok(());
    }
    let backup = path.with_extension(format!(
        "{}.{CONFIG_BACKUP_SUFFIX}",
        path.extension().unwrap_or_default()
    ));
    std::fs::copy(path, &backup).map_err(|e| OpsError::Config {
        message: format!("cannot back up {path} to {backup}"),
        source: Some(e),
    })?;
    Ok(())
}

impl CoordinationDatabase {
    /// Build the in-memory view from a config-file entry. The config
    /// file is trusted; no validation happens here.
    pub fn set_from_cluster_config(
        db_name: &str,
        config: &ClusterConfig,
    ) -> Result<CoordinationDatabase, OpsError> {
        let db_config = config.0.get(db_name).ok_or_else(|| {
            OpsError::validation(format!("database {db_name} is not in the cluster config file"))
        })?;

        let mut vdb = CoordinationDatabase::new();
        vdb.name = db_name.to_string();
        vdb.is_eon = db_config.is_eon;
        vdb.ipv6 = db_config.ipv6;
        if !db_config.communal_storage_location.is_empty() {
            vdb.communal_storage_location = Some(db_config.communal_storage_location.clone());
        }
        if let Some(first) = db_config.nodes.first() {
            vdb.catalog_prefix = first.catalog_path.clone().into();
            vdb.data_prefix = first.data_path.clone().into();
            if !first.depot_path.is_empty() {
                vdb.depot_prefix = Some(first.depot_path.clone().into());
            }
        }

        for node_config in &db_config.nodes {
            let name = &node_config.name;
            let node = CoordinationNode {
                name: name.clone(),
                address: node_config.address.clone(),
                catalog_path: vdb.gen_catalog_path(name),
                storage_locations: vec![vdb.gen_data_path(name)],
                depot_path: vdb.depot_prefix.as_ref().map(|_| vdb.gen_depot_path(name)),
                port: DEFAULT_CLIENT_PORT,
                control_address_family: AddressFamily::from_ipv6_flag(vdb.ipv6),
                is_primary: false,
                state: NodeState::Unknown,
                subcluster: node_config.subcluster.clone(),
            };
            vdb.add_node(node)?;
        }
        Ok(vdb)
    }

    /// Persist this database into the cluster config file, backing up
    /// any previous version first.
    pub fn write_cluster_config(
        &self,
        config_dir: Option<&Utf8Path>,
    ) -> Result<Utf8PathBuf, OpsError> {
        let mut nodes = Vec::with_capacity(self.hosts().len());
        for host in self.hosts() {
            let node = self.node(host).ok_or_else(|| OpsError::Config {
                message: format!("host {host} is missing from the host node map"),
                source: None,
            })?;
            nodes.push(NodeConfig {
                name: node.name.clone(),
                address: node.address.clone(),
                subcluster: node.subcluster.clone(),
                catalog_path: self.catalog_prefix.to_string(),
                data_path: self.data_prefix.to_string(),
                depot_path: self
                    .depot_prefix
                    .as_ref()
                    .map(|p| p.to_string())
                    .unwrap_or_default(),
            });
        }
        let db_config = DatabaseConfig {
            is_eon: self.is_eon,
            communal_storage_location: self
                .communal_storage_location
                .clone()
                .unwrap_or_default(),
            ipv6: self.ipv6,
            nodes,
        };

        let path = config_file_path(&self.name, config_dir)?;
        let mut config = if path.exists() {
            ClusterConfig::read(&path)?
        } else {
            ClusterConfig::default()
        };
        config.0.insert(self.name.clone(), db_config);

        backup_config_file(&path)?;
        config.write(&path)?;
        Ok(path)
    }
}

/// Remove a database entry from the config file (drop_db). Missing file
/// or entry is not an error: the observable state is already as
/// requested.
pub fn remove_db_from_config(
    db_name: &str,
    config_dir: Option<&Utf8Path>,
) -> Result<(), OpsError> {
    let path = config_file_path(db_name, config_dir)?;
    if !path.exists() {
        return Ok(());
    }
    let mut config = ClusterConfig::read(&path)?;
    if config.0.remove(db_name).is_some() {
        backup_config_file(&path)?;
        config.write(&path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino_tempfile::Utf8TempDir;

    fn sample_vdb() -> CoordinationDatabase {
        let mut vdb = CoordinationDatabase {
            name: "testdb".to_string(),
            catalog_prefix: "/data".into(),
            data_prefix: "/data".into(),
            depot_prefix: Some("/depot".into()),
            is_eon: true,
            communal_storage_location: Some("s3://bucket/testdb".to_string()),
            ..Default::default()
        };
        vdb.add_hosts(
            &["192.0.2.1".to_string(), "192.0.2.2".to_string()],
            "default_subcluster",
        )
        .unwrap();
        vdb
    }

    #[test]
    fn round_trip_through_config_file() {
        let dir = Utf8TempDir::new().unwrap();
        let vdb = sample_vdb();
        let path = vdb.write_cluster_config(Some(dir.path())).unwrap();
        assert_eq!(path.file_name(), Some(CONFIG_FILE_NAME));

        let config = ClusterConfig::read(&path).unwrap();
        let loaded = CoordinationDatabase::set_from_cluster_config("testdb", &config).unwrap();
        assert_eq!(loaded.hosts(), vdb.hosts());
        assert!(loaded.is_eon);
        assert_eq!(loaded.communal_storage_location.as_deref(), Some("s3://bucket/testdb"));
        let node = loaded.node("192.0.2.1").unwrap();
        assert_eq!(node.name, "v_testdb_node0001");
        assert_eq!(node.catalog_path, "/data/testdb/v_testdb_node0001_catalog");
    }

    #[test]
    fn overwrite_creates_backup() {
        let dir = Utf8TempDir::new().unwrap();
        let vdb = sample_vdb();
        let path = vdb.write_cluster_config(Some(dir.path())).unwrap();
        // Second write backs the first one up.
        vdb.write_cluster_config(Some(dir.path())).unwrap();
        let backup = path.with_extension("yaml.backup");
        assert!(backup.exists());
        let config = ClusterConfig::read(&backup).unwrap();
        assert!(config.0.contains_key("testdb"));
    }

    #[cfg(unix)]
    #[test]
    fn config_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = Utf8TempDir::new().unwrap();
        let path = sample_vdb().write_cluster_config(Some(dir.path())).unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn remove_db_is_idempotent() {
        let dir = Utf8TempDir::new().unwrap();
        let vdb = sample_vdb();
        let path = vdb.write_cluster_config(Some(dir.path())).unwrap();
        remove_db_from_config("testdb", Some(dir.path())).unwrap();
        let config = ClusterConfig::read(&path).unwrap();
        assert!(config.0.is_empty());
        // Removing again is fine.
        remove_db_from_config("testdb", Some(dir.path())).unwrap();
    }
}

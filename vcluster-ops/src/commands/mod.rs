// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Command producers: one per administrative command. Each validates
//! its options, seeds a vdb, emits an ordered plan, and hands it to the
//! engine.

mod add_node;
mod add_subcluster;
mod create_db;
mod drop_db;
mod install_packages;
mod re_ip;
mod remove_node;
mod remove_subcluster;
mod restart_node;
mod revive_db;
mod sandbox;
mod show_restore_points;
mod start_db;
mod stop_db;

pub use add_node::AddNodeOptions;
pub use add_subcluster::AddSubclusterOptions;
pub use create_db::CreateDbOptions;
pub use drop_db::DropDbOptions;
pub use install_packages::InstallPackagesOptions;
pub use re_ip::ReIpOptions;
pub use remove_node::RemoveNodeOptions;
pub use remove_subcluster::RemoveSubclusterOptions;
pub use restart_node::RestartNodeOptions;
pub use revive_db::{ReviveDbOptions, ReviveDbResult};
pub use sandbox::{SandboxOptions, UnsandboxOptions};
pub use show_restore_points::ShowRestorePointsOptions;
pub use start_db::StartDbOptions;
pub use stop_db::StopDbOptions;

use crate::certs::HttpsCerts;
use crate::engine::ClusterOpEngine;
use crate::error::OpsError;
use crate::op::ClusterOp;
use crate::ops::https::HttpsGetNodesInfoOp;
use crate::vdb::CoordinationDatabase;
use camino::Utf8PathBuf;
use slog::{o, Logger};
use vcluster_common::net;

/// Options shared by every command: database identity, target hosts,
/// credentials, TLS material, and the config-file location.
///
/// `Option` fields distinguish "not provided" from an explicit empty
/// value; validation decides which are required per command.
#[derive(Clone, Default)]
pub struct DatabaseOptions {
    pub db_name: Option<String>,
    /// Hosts as the caller wrote them; resolved into `hosts` during
    /// option analysis.
    pub raw_hosts: Vec<String>,
    pub ipv6: bool,
    pub catalog_prefix: Option<Utf8PathBuf>,
    pub data_prefix: Option<Utf8PathBuf>,
    pub depot_prefix: Option<Utf8PathBuf>,
    pub communal_storage_location: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub key: String,
    pub cert: String,
    pub ca_cert: String,
    pub config_directory: Option<Utf8PathBuf>,

    /// Resolved addresses, filled by `analyze`.
    pub(crate) hosts: Vec<String>,
    pub(crate) use_password: bool,
}

impl DatabaseOptions {
    pub(crate) fn db_name(&self) -> Result<&str, OpsError> {
        self.db_name
            .as_deref()
            .filter(|name| !name.is_empty())
            .ok_or_else(|| OpsError::validation("database name must be provided"))
    }

    /// Checks common to all commands; individual commands add their
    /// own on top.
    pub(crate) fn validate_base(&self, command: &str) -> Result<(), OpsError> {
        let name = self.db_name()?;
        let valid_name = name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
            && name.chars().next().is_some_and(|c| c.is_ascii_alphabetic());
        if !valid_name {
            return Err(OpsError::validation(format!(
                "invalid database name {name:?} for {command}: names contain only letters, \
                 digits, and underscores, and start with a letter"
            )));
        }
        for (label, path) in [
            ("catalog path", &self.catalog_prefix),
            ("data path", &self.data_prefix),
            ("depot path", &self.depot_prefix),
        ] {
            if let Some(path) = path {
                if !path.is_absolute() {
                    return Err(OpsError::validation(format!(
                        "{label} {path} must be an absolute path"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Resolve raw host names to addresses. Commands that can fall
    /// back to the config file skip this when no raw hosts were given.
    pub(crate) fn analyze(&mut self) -> Result<(), OpsError> {
        if !self.raw_hosts.is_empty() {
            self.hosts = net::resolve_raw_hosts(&self.raw_hosts, self.ipv6)
                .map_err(|e| OpsError::validation(e.to_string()))?;
        }
        Ok(())
    }

    /// Password auth requires a username; an empty password is valid.
    pub(crate) fn set_use_password(&mut self) -> Result<(), OpsError> {
        self.use_password = self.password.is_some();
        if self.use_password && self.username_str().is_empty() {
            return Err(OpsError::validation(
                "a username must be provided when a password is used",
            ));
        }
        Ok(())
    }

    pub(crate) fn username_str(&self) -> &str {
        self.username.as_deref().unwrap_or_default()
    }

    pub(crate) fn certs(&self) -> HttpsCerts {
        HttpsCerts {
            key: self.key.clone(),
            cert: self.cert.clone(),
            ca_cert: self.ca_cert.clone(),
        }
    }
}

/// The library's entry point: one method per administrative command.
/// Callers construct it with the logger the whole plan should use.
pub struct ClusterCommands {
    pub(crate) log: Logger,
}

impl ClusterCommands {
    pub fn new(log: &Logger) -> Self {
        ClusterCommands { log: log.new(o!("component" => "ClusterCommands")) }
    }

    pub fn log(&self) -> &Logger {
        &self.log
    }

    /// Fetch the current topology from a running database: a one-op
    /// plan around [`HttpsGetNodesInfoOp`].
    pub(crate) async fn vdb_from_running_db(
        &self,
        options: &DatabaseOptions,
    ) -> Result<CoordinationDatabase, OpsError> {
        let op = HttpsGetNodesInfoOp::new(
            &self.log,
            options.db_name()?,
            options.hosts.clone(),
            options.use_password,
            options.username_str(),
            options.password.as_ref(),
        )?;
        let instructions: Vec<Box<dyn ClusterOp>> = vec![Box::new(op)];
        let mut engine = ClusterOpEngine::new(instructions, options.certs());
        engine.run(&self.log).await?;
        engine
            .exec_context()
            .and_then(|ctx| ctx.nodes_info.clone())
            .ok_or_else(|| {
                OpsError::precondition("could not retrieve node information from the database")
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_validation_rejects_bad_names_and_paths() {
        let mut options = DatabaseOptions {
            db_name: Some("1db".to_string()),
            ..Default::default()
        };
        assert!(options.validate_base("start_db").is_err());

        options.db_name = Some("testdb".to_string());
        options.validate_base("start_db").unwrap();

        options.catalog_prefix = Some("relative/path".into());
        assert!(options.validate_base("start_db").is_err());
    }

    #[test]
    fn password_requires_username() {
        let mut options = DatabaseOptions {
            db_name: Some("testdb".to_string()),
            password: Some(String::new()),
            ..Default::default()
        };
        assert!(options.set_use_password().is_err());
        options.username = Some("dbadmin".to_string());
        options.set_use_password().unwrap();
        assert!(options.use_password);
    }
}

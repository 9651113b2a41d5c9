// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Download one configuration file from a source host. Exactly one
//! passing response is required; the first passing host wins and its
//! body is published to the context for the matching upload operation.

use crate::error::{HostErrors, OpsError};
use crate::exec_context::OpEngineExecContext;
use crate::http_request::{HostHttpRequest, Method};
use crate::op::{ClusterOp, OpBase};
use crate::ops::catalog_path_map_from_editor;
use crate::vdb::{catalog_root, CoordinationDatabase};
use async_trait::async_trait;
use slog::Logger;
use std::collections::BTreeMap;

/// Which engine configuration file a transfer moves.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigType {
    Vertica,
    Spread,
}

impl ConfigType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigType::Vertica => "vertica",
            ConfigType::Spread => "spread",
        }
    }

    fn download_op_name(&self) -> &'static str {
        match self {
            ConfigType::Vertica => "NMADownloadVerticaConfigOp",
            ConfigType::Spread => "NMADownloadSpreadConfigOp",
        }
    }
}

pub struct NmaDownloadConfigOp {
    base: OpBase,
    config_type: ConfigType,
    /// When `None`, the source is resolved at prepare time to the hosts
    /// holding the latest catalog.
    source_config_host: Option<Vec<String>>,
    vdb: Option<CoordinationDatabase>,
    /// Revive mode: fetch the cluster description from communal
    /// storage instead of a node catalog.
    communal_location: Option<String>,
    file_content: Option<String>,
}

impl NmaDownloadConfigOp {
    pub fn new(
        log: &Logger,
        config_type: ConfigType,
        source_config_host: Option<Vec<String>>,
        vdb: Option<CoordinationDatabase>,
    ) -> Self {
        NmaDownloadConfigOp {
            base: OpBase::new(config_type.download_op_name(), log, vec![]),
            config_type,
            source_config_host,
            vdb,
            communal_location: None,
            file_content: None,
        }
    }

    /// Download the cluster description a revive needs from communal
    /// storage, through the given agent hosts.
    pub fn from_communal(
        log: &Logger,
        communal_location: &str,
        source_hosts: Vec<String>,
    ) -> Self {
        NmaDownloadConfigOp {
            base: OpBase::new("NMADownloadClusterDescriptionOp", log, vec![]),
            config_type: ConfigType::Vertica,
            source_config_host: Some(source_hosts),
            vdb: None,
            communal_location: Some(communal_location.to_string()),
            file_content: None,
        }
    }

    fn catalog_paths(
        &self,
        hosts: &[String],
        ctx: &OpEngineExecContext,
    ) -> Result<BTreeMap<String, String>, OpsError> {
        if let Some(vdb) = self.vdb.as_ref().filter(|vdb| !vdb.is_empty()) {
            let mut paths = BTreeMap::new();
            for host in hosts {
                let node = vdb.node(host).ok_or_else(|| {
                    OpsError::internal(
                        self.name(),
                        format!("source host {host} is not part of the database"),
                    )
                })?;
                paths.insert(host.clone(), catalog_root(node.catalog_path.as_str()).to_string());
            }
            return Ok(paths);
        }
        let nma_database = ctx.nma_database.as_ref().ok_or_else(|| {
            OpsError::internal(self.name(), "no catalog snapshot available to locate config files")
        })?;
        catalog_path_map_from_editor(self.name(), hosts, nma_database)
    }
}

#[async_trait]
impl ClusterOp for NmaDownloadConfigOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    async fn prepare(&mut self, ctx: &mut OpEngineExecContext) -> Result<(), OpsError> {
        let hosts = match &self.source_config_host {
            Some(hosts) => hosts.clone(),
            // Prefer the hosts holding the latest catalog; a plan that
            // never read the catalog editor falls back to any up host.
            None if !ctx.hosts_with_latest_catalog.is_empty() => {
                ctx.hosts_with_latest_catalog.clone()
            }
            None if !ctx.up_hosts.is_empty() => ctx.up_hosts.clone(),
            None => {
                return Err(OpsError::internal(
                    self.name(),
                    "could not find a source host holding the configuration files",
                ));
            }
        };
        if let Some(communal_location) = self.communal_location.clone() {
            self.base.hosts = hosts.clone();
            ctx.dispatcher.setup(&self.base.hosts);
            for host in &hosts {
                let request = HostHttpRequest::nma(Method::GET, "config/download")
                    .with_query("config_type", "cluster_config")
                    .with_query("communal_storage_location", communal_location.clone());
                self.base.register_request(host, request);
            }
            return Ok(());
        }

        let catalog_paths = self.catalog_paths(&hosts, ctx)?;
        let config_type = self.config_type.as_str();

        self.base.hosts = hosts.clone();
        ctx.dispatcher.setup(&self.base.hosts);
        for host in &hosts {
            let request = HostHttpRequest::nma(Method::GET, "config/download")
                .with_query("config_type", config_type)
                .with_query("catalog_path", catalog_paths[host].clone());
            self.base.register_request(host, request);
        }
        Ok(())
    }

    fn process_result(&mut self, _ctx: &mut OpEngineExecContext) -> Result<(), OpsError> {
        let name = self.name();
        let mut errors = HostErrors::new();
        let mut content = None;
        for result in self.base.results().values() {
            self.log_response(result);
            if result.is_passing() {
                // First passing host wins.
                content = Some(result.content.clone());
                break;
            }
            if let Some(err) = &result.err {
                errors.push(err.clone());
            }
        }
        match content {
            Some(content) => {
                self.file_content = Some(content);
                Ok(())
            }
            None => {
                errors.into_result(name)?;
                Err(OpsError::semantic(name, "could not find a host with a passing result"))
            }
        }
    }

    async fn finalize(&mut self, ctx: &mut OpEngineExecContext) -> Result<(), OpsError> {
        ctx.conf_file_content = self.file_content.take();
        Ok(())
    }
}
